//! Entry point tying partition, scatter, kernel, gather and timing together.

use crate::comm::{Communicator, Phase};
use crate::error::{DistError, Result};
use crate::gather::gather_rows;
use crate::kernel::multiply_block;
use crate::partition::Partition;
use crate::scatter::{Shape, broadcast_shape, scatter_operands};
use crate::timer::{RunDuration, SyncTimer};
use crate::types::Matrix;
use tracing::{debug, info, warn};

/// Per-run settings that are not implied by the communicator
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// Threads used by the multiply kernel inside each rank
    pub kernel_threads: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { kernel_threads: 1 }
    }
}

/// What the coordinator gets back from a run
#[derive(Debug, Clone)]
pub struct DistributedProduct {
    pub result: Matrix,
    pub duration: RunDuration,
    pub worker_count: usize,
}

/// Multiply `a * b` across every rank of `comm`.
///
/// Every rank must call this. `inputs` is read on the coordinator only;
/// dimensions are checked there before anything is sent. The coordinator
/// gets `Some(product)`, all other ranks get `None`.
pub fn distributed_multiply<C: Communicator>(
    comm: &C,
    inputs: Option<(&Matrix, &Matrix)>,
    config: &RunConfig,
) -> Result<Option<DistributedProduct>> {
    let rank = comm.rank();

    let inputs = if comm.is_coordinator() {
        let (a, b) = inputs.ok_or_else(|| {
            DistError::config("coordinator was started without input matrices")
        })?;
        Some((a, b, Shape::of(a, b)?))
    } else {
        if inputs.is_some() {
            warn!(rank, "ignoring inputs passed to a non-coordinator rank");
        }
        None
    };

    let shape = broadcast_shape(comm, inputs.map(|(_, _, shape)| shape))?;
    let partition = Partition::new(shape.a_rows, comm.size())?;
    debug!(rank, ?shape, sizes = ?partition.sizes(), "partitioned rows");

    let operand = scatter_operands(comm, &partition, shape, inputs.map(|(a, b, _)| (a, b)))?;

    let timer = SyncTimer::start(comm)?;
    let partial = multiply_block(&operand.a_local, &operand.b, config.kernel_threads)?;
    drop(operand);
    let gathered = gather_rows(comm, &partition, partial)?;
    let timing = timer.stop(comm)?;

    match (gathered, timing.run) {
        (Some(result), Some(duration)) => {
            info!(
                rows = result.rows(),
                cols = result.cols(),
                workers = comm.size(),
                seconds = duration.seconds,
                "distributed multiply complete"
            );
            Ok(Some(DistributedProduct {
                result,
                duration,
                worker_count: comm.size(),
            }))
        }
        (None, None) => Ok(None),
        _ => Err(DistError::protocol(
            rank,
            Phase::Reduce,
            "result and duration disagree on which rank is the coordinator",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::local::{LocalComm, LocalUniverse};
    use crate::comm::{Element, Tag};
    use std::cell::Cell;

    fn run(a: &Matrix, b: &Matrix, workers: usize) -> Vec<Result<Option<DistributedProduct>>> {
        LocalUniverse::new(workers).unwrap().run(|comm| {
            let inputs = comm.is_coordinator().then_some((a, b));
            distributed_multiply(&comm, inputs, &RunConfig::default())
        })
    }

    #[test]
    fn test_two_by_three_times_three_by_two() {
        let a = Matrix::from_rows(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
        let b = Matrix::from_rows(vec![vec![7, 8], vec![9, 10], vec![11, 12]]).unwrap();

        let mut results = run(&a, &b, 2);
        let product = results.remove(0).unwrap().unwrap();
        assert_eq!(product.result.to_rows(), vec![vec![58, 64], vec![139, 154]]);
        assert_eq!(product.worker_count, 2);
        assert!(results.remove(0).unwrap().is_none());
    }

    #[test]
    fn test_more_workers_than_rows() {
        let a = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap();
        let b = Matrix::from_rows(vec![vec![5, 6], vec![7, 8]]).unwrap();

        let results = run(&a, &b, 6);
        let product = results[0].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(product.result.to_rows(), vec![vec![19, 22], vec![43, 50]]);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_single_rank_runs_without_messages() {
        let a = Matrix::from_rows(vec![vec![2]]).unwrap();
        let b = Matrix::from_rows(vec![vec![21]]).unwrap();
        let results = run(&a, &b, 1);
        let product = results[0].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(product.result.to_rows(), vec![vec![42]]);
    }

    /// Counts sends so tests can prove nothing left the coordinator.
    struct CountingComm {
        inner: LocalComm,
        sends: Cell<usize>,
    }

    impl Communicator for CountingComm {
        fn rank(&self) -> usize {
            self.inner.rank()
        }

        fn size(&self) -> usize {
            self.inner.size()
        }

        fn send<T: Element>(&self, dest: usize, tag: Tag, data: &[T]) -> Result<()> {
            self.sends.set(self.sends.get() + 1);
            self.inner.send(dest, tag, data)
        }

        fn recv<T: Element>(&self, source: usize, tag: Tag) -> Result<Vec<T>> {
            self.inner.recv(source, tag)
        }
    }

    #[test]
    fn test_dimension_mismatch_fails_before_any_transfer() {
        let a = Matrix::zeros(2, 3).unwrap();
        let b = Matrix::zeros(4, 2).unwrap();

        let results = LocalUniverse::new(3).unwrap().run(|comm| -> Result<usize> {
            let comm = CountingComm {
                inner: comm,
                sends: Cell::new(0),
            };
            let inputs = comm.is_coordinator().then_some((&a, &b));
            match distributed_multiply(&comm, inputs, &RunConfig::default()) {
                Err(DistError::Configuration(_)) if comm.is_coordinator() => Ok(comm.sends.get()),
                Err(e) if !comm.is_coordinator() => Err(e),
                other => panic!(
                    "unexpected outcome on rank {}: {:?}",
                    comm.rank(),
                    other.map(|_| ())
                ),
            }
        });

        assert_eq!(*results[0].as_ref().unwrap(), 0);
        for result in &results[1..] {
            assert!(matches!(result, Err(DistError::Transport { .. })));
        }
    }
}
