//! All-to-coordinator collection of computed rows.

use crate::comm::{COORDINATOR, Communicator, Phase, Tag};
use crate::error::{DistError, Result};
use crate::partition::Partition;
use crate::types::{Matrix, RowBlock};
use tracing::debug;

/// Result rows placed so far; only ever handed out once complete
struct Assembly {
    cols: usize,
    data: Vec<i32>,
    placed: Vec<bool>,
    missing: usize,
}

impl Assembly {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            cols,
            data: vec![0; rows * cols],
            placed: vec![false; rows],
            missing: rows,
        }
    }

    fn place(&mut self, sender: usize, row: usize, values: &[i32]) -> Result<()> {
        if values.len() != self.cols {
            return Err(DistError::protocol(
                sender,
                Phase::Gather,
                format!("row {} has {} elements, expected {}", row, values.len(), self.cols),
            ));
        }
        match self.placed.get_mut(row) {
            Some(placed) if !*placed => *placed = true,
            Some(_) => {
                let detail = format!("row {} delivered twice", row);
                return Err(DistError::protocol(sender, Phase::Gather, detail));
            }
            None => {
                let detail = format!("row {} is out of range", row);
                return Err(DistError::protocol(sender, Phase::Gather, detail));
            }
        }
        self.data[row * self.cols..(row + 1) * self.cols].copy_from_slice(values);
        self.missing -= 1;
        Ok(())
    }

    fn finish(self) -> Result<Matrix> {
        if self.missing > 0 {
            let first = self.placed.iter().position(|p| !p).unwrap_or_default();
            return Err(DistError::protocol(
                COORDINATOR,
                Phase::Gather,
                format!("{} rows never arrived, first missing is {}", self.missing, first),
            ));
        }
        Matrix::new(self.placed.len(), self.cols, self.data)
    }
}

/// Send this rank's rows to the coordinator, or collect everyone's there.
///
/// Returns `Some(result)` on the coordinator only. Each peer announces the
/// first row and the number of rows it will send before sending them; a
/// header that disagrees with the partition aborts the gather.
pub fn gather_rows<C: Communicator>(
    comm: &C,
    partition: &Partition,
    local: RowBlock,
) -> Result<Option<Matrix>> {
    let rank = comm.rank();

    if !comm.is_coordinator() {
        let range = local.range();
        let header = [local.len(), range.start].map(i32::try_from);
        let [Ok(count), Ok(start)] = header else {
            return Err(DistError::transport(
                rank,
                Phase::GatherCount,
                "row header does not fit the wire",
            ));
        };
        comm.send(COORDINATOR, Tag::new(Phase::GatherCount, rank), &[count, start])?;
        for (i, row) in local.indexed_rows() {
            comm.send(COORDINATOR, Tag::new(Phase::Gather, i), row)?;
        }
        debug!(rank, rows = local.len(), "sent partial result");
        return Ok(None);
    }

    let mut assembly = Assembly::new(partition.rows(), local.cols());
    for (i, row) in local.indexed_rows() {
        assembly.place(rank, i, row)?;
    }

    for peer in 1..comm.size() {
        let range = partition.range(peer);
        let header = comm.recv::<i32>(peer, Tag::new(Phase::GatherCount, peer))?;
        let announced = match header.as_slice() {
            &[count, start] => usize::try_from(count).ok().zip(usize::try_from(start).ok()),
            _ => None,
        };
        let expected = (range.len(), range.start);
        // an empty range has no meaningful start
        let matches = match announced {
            Some((0, _)) => expected.0 == 0,
            Some(got) => got == expected,
            None => false,
        };
        if !matches {
            return Err(DistError::protocol(
                peer,
                Phase::GatherCount,
                format!(
                    "owns rows [{}, {}) but announced [count, start] = {:?}",
                    range.start, range.end, header
                ),
            ));
        }

        for i in range.iter() {
            let row = comm.recv::<i32>(peer, Tag::new(Phase::Gather, i))?;
            assembly.place(peer, i, &row)?;
        }
        debug!(rank, peer, rows = range.len(), "collected partial result");
    }

    assembly.finish().map(Some)
}
