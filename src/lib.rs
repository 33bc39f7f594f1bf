//! Distributed dense integer matrix multiplication.
//!
//! Rows of the left-hand matrix are partitioned across a fixed set of ranks,
//! the right-hand matrix is replicated to every rank, each rank multiplies
//! its rows, and the coordinator (rank 0) gathers the product and the
//! slowest rank's elapsed time. Ranks only ever talk through a
//! [`comm::Communicator`].
//!
//! ```
//! use distmul::comm::Communicator;
//! use distmul::comm::local::LocalUniverse;
//! use distmul::protocol::{RunConfig, distributed_multiply};
//! use distmul::types::Matrix;
//!
//! let a = Matrix::from_rows(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
//! let b = Matrix::from_rows(vec![vec![7, 8], vec![9, 10], vec![11, 12]]).unwrap();
//!
//! let results = LocalUniverse::new(2).unwrap().run(|comm| {
//!     let inputs = comm.is_coordinator().then_some((&a, &b));
//!     distributed_multiply(&comm, inputs, &RunConfig::default())
//! });
//! let product = results[0].as_ref().unwrap().as_ref().unwrap();
//! assert_eq!(product.result.to_rows(), vec![vec![58, 64], vec![139, 154]]);
//! ```

pub mod cli;
pub mod comm;
pub mod error;
pub mod gather;
pub mod generator;
pub mod kernel;
pub mod launch;
pub mod logging;
pub mod matrix_io;
pub mod partition;
pub mod protocol;
pub mod reporter;
pub mod runner;
pub mod scatter;
pub mod timer;
pub mod types;
pub mod verify;
