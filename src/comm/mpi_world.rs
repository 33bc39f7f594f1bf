//! MPI transport: one rank per MPI process.
//!
//! MPI reports failures by aborting the job, so send and receive only fail
//! here for tags that cannot be encoded or payloads of the wrong type.

use super::{Communicator, Element, ElementKind, Payload, PayloadRef, Phase, ReduceOp, Tag, decode};
use crate::error::{DistError, Result};
use mpi::collective::SystemOperation;
use mpi::topology::SimpleCommunicator;
use mpi::traits::{
    Communicator as _, CommunicatorCollectives as _, Destination as _, Root as _, Source as _,
};

/// Wraps an MPI communicator (usually the world)
pub struct MpiComm {
    world: SimpleCommunicator,
}

impl MpiComm {
    pub fn new(world: SimpleCommunicator) -> Self {
        Self { world }
    }

    fn wire_tag(&self, tag: Tag) -> Result<i32> {
        tag.encode().ok_or_else(|| {
            DistError::transport(
                self.rank(),
                tag.phase,
                format!("message {} does not fit an MPI tag", tag),
            )
        })
    }

    fn peer(&self, rank: usize, phase: Phase) -> Result<i32> {
        i32::try_from(rank)
            .ok()
            .filter(|&r| r < self.world.size())
            .ok_or_else(|| {
                DistError::transport(
                    self.rank(),
                    phase,
                    format!("rank {} is not in the world", rank),
                )
            })
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn send<T: Element>(&self, dest: usize, tag: Tag, data: &[T]) -> Result<()> {
        let process = self.world.process_at_rank(self.peer(dest, tag.phase)?);
        let wire = self.wire_tag(tag)?;
        match T::view(data) {
            PayloadRef::Int(values) => process.send_with_tag(values, wire),
            PayloadRef::Float(values) => process.send_with_tag(values, wire),
        }
        Ok(())
    }

    fn recv<T: Element>(&self, source: usize, tag: Tag) -> Result<Vec<T>> {
        let process = self.world.process_at_rank(self.peer(source, tag.phase)?);
        let wire = self.wire_tag(tag)?;
        let payload = match T::KIND {
            ElementKind::Int => Payload::Int(process.receive_vec_with_tag::<i32>(wire).0),
            ElementKind::Float => Payload::Float(process.receive_vec_with_tag::<f64>(wire).0),
        };
        decode(self.rank(), tag, payload)
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }

    fn reduce<T: Element>(&self, root: usize, value: T, op: ReduceOp) -> Result<Option<T>> {
        let root_process = self.world.process_at_rank(self.peer(root, Phase::Reduce)?);
        let op = match op {
            ReduceOp::Max => SystemOperation::max(),
            ReduceOp::Min => SystemOperation::min(),
            ReduceOp::Sum => SystemOperation::sum(),
        };
        let is_root = self.rank() == root;
        let tag = Tag::new(Phase::Reduce, root);

        let reduced = match T::view(std::slice::from_ref(&value)) {
            PayloadRef::Int(&[v]) => {
                if is_root {
                    let mut out = 0i32;
                    root_process.reduce_into_root(&v, &mut out, op);
                    Some(Payload::Int(vec![out]))
                } else {
                    root_process.reduce_into(&v, op);
                    None
                }
            }
            PayloadRef::Float(&[v]) => {
                if is_root {
                    let mut out = 0f64;
                    root_process.reduce_into_root(&v, &mut out, op);
                    Some(Payload::Float(vec![out]))
                } else {
                    root_process.reduce_into(&v, op);
                    None
                }
            }
            _ => {
                return Err(DistError::protocol(
                    self.rank(),
                    Phase::Reduce,
                    "reduce takes exactly one value per rank",
                ));
            }
        };

        match reduced {
            Some(payload) => Ok(decode::<T>(self.rank(), tag, payload)?.first().copied()),
            None => Ok(None),
        }
    }
}
