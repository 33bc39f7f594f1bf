//! Coordinator-to-all distribution of the operands.
//!
//! Every rank first learns both shapes, then receives all of B and exactly
//! the rows of A its partition names. Each row travels under its own tag
//! `(phase, row index)`.

use crate::comm::{COORDINATOR, Communicator, Phase, Tag};
use crate::error::{DistError, Result};
use crate::partition::Partition;
use crate::types::{Matrix, RowBlock};
use serde::Serialize;
use tracing::debug;

/// Dimensions of both operands, known to every rank before scattering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Shape {
    pub a_rows: usize,
    pub a_cols: usize,
    pub b_rows: usize,
    pub b_cols: usize,
}

impl Shape {
    /// Shape of `a * b`, rejecting incompatible inner dimensions.
    pub fn of(a: &Matrix, b: &Matrix) -> Result<Self> {
        if a.cols() != b.rows() {
            return Err(DistError::config(format!(
                "cannot multiply {}x{} by {}x{}: inner dimensions differ",
                a.rows(),
                a.cols(),
                b.rows(),
                b.cols()
            )));
        }
        Ok(Self {
            a_rows: a.rows(),
            a_cols: a.cols(),
            b_rows: b.rows(),
            b_cols: b.cols(),
        })
    }

    fn to_wire(self, rank: usize) -> Result<[i32; 4]> {
        let dims = [self.a_rows, self.a_cols, self.b_rows, self.b_cols];
        let mut wire = [0i32; 4];
        for (slot, dim) in wire.iter_mut().zip(dims) {
            *slot = i32::try_from(dim).map_err(|_| {
                DistError::transport(
                    rank,
                    Phase::Shape,
                    format!("dimension {} does not fit the wire", dim),
                )
            })?;
        }
        Ok(wire)
    }

    fn from_wire(rank: usize, wire: &[i32]) -> Result<Self> {
        let dims: Vec<usize> = wire
            .iter()
            .map(|&d| usize::try_from(d).ok().filter(|&d| d > 0))
            .collect::<Option<_>>()
            .ok_or_else(|| {
                DistError::protocol(rank, Phase::Shape, format!("invalid dimensions {:?}", wire))
            })?;

        match dims.as_slice() {
            &[a_rows, a_cols, b_rows, b_cols] if a_cols == b_rows => Ok(Self {
                a_rows,
                a_cols,
                b_rows,
                b_cols,
            }),
            _ => Err(DistError::protocol(
                rank,
                Phase::Shape,
                format!("expected 4 compatible dimensions, got {:?}", wire),
            )),
        }
    }
}

/// What a rank holds once scattering is done
#[derive(Debug)]
pub struct DistributedOperand {
    /// This rank's rows of A
    pub a_local: RowBlock,
    /// Full replica of B
    pub b: Matrix,
}

/// Send the coordinator's shape to every other rank; every rank returns it.
pub fn broadcast_shape<C: Communicator>(comm: &C, shape: Option<Shape>) -> Result<Shape> {
    let tag = Tag::new(Phase::Shape, 0);
    let rank = comm.rank();

    if comm.is_coordinator() {
        let shape =
            shape.ok_or_else(|| DistError::config("coordinator has no inputs to distribute"))?;
        let wire = shape.to_wire(rank)?;
        for peer in 1..comm.size() {
            comm.send(peer, tag, &wire)?;
        }
        return Ok(shape);
    }

    let wire = comm.recv::<i32>(COORDINATOR, tag)?;
    Shape::from_wire(rank, &wire)
}

/// Distribute B to everyone and each rank's rows of A to that rank.
///
/// `inputs` is only read on the coordinator, which keeps its own rows
/// without a transfer.
pub fn scatter_operands<C: Communicator>(
    comm: &C,
    partition: &Partition,
    shape: Shape,
    inputs: Option<(&Matrix, &Matrix)>,
) -> Result<DistributedOperand> {
    let rank = comm.rank();

    if comm.is_coordinator() {
        let (a, b) =
            inputs.ok_or_else(|| DistError::config("coordinator has no inputs to distribute"))?;

        for peer in 1..comm.size() {
            for (i, row) in b.iter_rows().enumerate() {
                comm.send(peer, Tag::new(Phase::ScatterB, i), row)?;
            }
        }
        debug!(rank, peers = comm.size() - 1, rows = b.rows(), "replicated B");

        for peer in 1..comm.size() {
            let range = partition.range(peer);
            for i in range.iter() {
                comm.send(peer, Tag::new(Phase::ScatterA, i), a.row(i))?;
            }
            debug!(rank, peer, start = range.start, end = range.end, "sent rows of A");
        }

        return Ok(DistributedOperand {
            a_local: a.block(partition.range(rank)),
            b: b.clone(),
        });
    }

    let mut b_data = Vec::with_capacity(shape.b_rows * shape.b_cols);
    for i in 0..shape.b_rows {
        let row = recv_row(comm, Tag::new(Phase::ScatterB, i), shape.b_cols)?;
        b_data.extend_from_slice(&row);
    }
    let b = Matrix::new(shape.b_rows, shape.b_cols, b_data)?;

    let range = partition.range(rank);
    let mut a_data = Vec::with_capacity(range.len() * shape.a_cols);
    for i in range.iter() {
        let row = recv_row(comm, Tag::new(Phase::ScatterA, i), shape.a_cols)?;
        a_data.extend_from_slice(&row);
    }
    let a_local = RowBlock::new(range, shape.a_cols, a_data)?;
    debug!(rank, start = range.start, end = range.end, "received operands");

    Ok(DistributedOperand { a_local, b })
}

fn recv_row<C: Communicator>(comm: &C, tag: Tag, width: usize) -> Result<Vec<i32>> {
    let row = comm.recv::<i32>(COORDINATOR, tag)?;
    if row.len() != width {
        return Err(DistError::protocol(
            comm.rank(),
            tag.phase,
            format!("row {} has {} elements, expected {}", tag.index, row.len(), width),
        ));
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::local::LocalUniverse;
    use crate::types::RowRange;

    #[test]
    fn test_shape_rejects_incompatible_inputs() {
        let a = Matrix::zeros(2, 3).unwrap();
        let b = Matrix::zeros(4, 2).unwrap();
        assert!(matches!(Shape::of(&a, &b), Err(DistError::Configuration(_))));
    }

    #[test]
    fn test_shape_wire_validation() {
        assert!(Shape::from_wire(1, &[2, 3, 3, 2]).is_ok());
        assert!(Shape::from_wire(1, &[2, 3, 4, 2]).is_err());
        assert!(Shape::from_wire(1, &[2, -3, -3, 2]).is_err());
        assert!(Shape::from_wire(1, &[2, 3]).is_err());
    }

    #[test]
    fn test_each_rank_gets_b_and_its_rows() {
        let a = Matrix::from_rows((0..5).map(|i| vec![i, i * 10]).collect()).unwrap();
        let b = Matrix::from_rows(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
        let universe = LocalUniverse::new(3).unwrap();

        let results = universe.run(|comm| -> Result<(RowRange, Vec<Vec<i32>>, Matrix)> {
            let inputs = comm.is_coordinator().then_some((&a, &b));
            let shape = broadcast_shape(&comm, inputs.map(|(a, b)| Shape::of(a, b)).transpose()?)?;
            let partition = Partition::new(shape.a_rows, comm.size())?;
            let operand = scatter_operands(&comm, &partition, shape, inputs)?;
            let rows = operand.a_local.indexed_rows().map(|(_, r)| r.to_vec()).collect();
            Ok((operand.a_local.range(), rows, operand.b))
        });

        let expected = [(0, 2), (2, 4), (4, 5)];
        for (rank, result) in results.into_iter().enumerate() {
            let (range, rows, replica) = result.unwrap();
            assert_eq!(range, RowRange::new(expected[rank].0, expected[rank].1));
            let want: Vec<Vec<i32>> = range.iter().map(|i| a.row(i).to_vec()).collect();
            assert_eq!(rows, want);
            assert_eq!(replica, b);
        }
    }

    #[test]
    fn test_width_mismatch_is_a_protocol_violation() {
        let universe = LocalUniverse::new(2).unwrap();
        let shape = Shape {
            a_rows: 2,
            a_cols: 2,
            b_rows: 2,
            b_cols: 2,
        };

        let results = universe.run(|comm| -> Result<()> {
            let partition = Partition::new(2, 2)?;
            if comm.is_coordinator() {
                // B rows one element short
                comm.send(1, Tag::new(Phase::ScatterB, 0), &[1])?;
                Ok(())
            } else {
                scatter_operands(&comm, &partition, shape, None).map(|_| ())
            }
        });

        match &results[1] {
            Err(DistError::ProtocolViolation { rank, phase, .. }) => {
                assert_eq!(*rank, 1);
                assert_eq!(*phase, Phase::ScatterB);
            }
            other => panic!("expected protocol violation, got {:?}", other),
        }
    }
}
