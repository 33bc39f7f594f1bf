//! Message-passing transport between ranks.
//!
//! Ranks never share memory. Everything they exchange goes through a
//! [`Communicator`]: tagged point-to-point messages, a barrier, and a
//! collective reduce. Two transports are provided: [`local`] runs every rank
//! as a thread of the current process, and `mpi_world` (cargo feature `mpi`)
//! runs each rank as an MPI process.

use crate::error::{DistError, Result};
use std::fmt;

pub mod local;
#[cfg(feature = "mpi")]
pub mod mpi_world;

/// Rank that owns the inputs and assembles the result
pub const COORDINATOR: usize = 0;

/// Protocol step a message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Shape,
    ScatterB,
    ScatterA,
    Barrier,
    GatherCount,
    Gather,
    Reduce,
}

impl Phase {
    const COUNT: usize = 7;

    fn code(self) -> usize {
        match self {
            Phase::Shape => 0,
            Phase::ScatterB => 1,
            Phase::ScatterA => 2,
            Phase::Barrier => 3,
            Phase::GatherCount => 4,
            Phase::Gather => 5,
            Phase::Reduce => 6,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Shape => "shape broadcast",
            Phase::ScatterB => "scatter of B",
            Phase::ScatterA => "scatter of A rows",
            Phase::Barrier => "barrier",
            Phase::GatherCount => "gather header",
            Phase::Gather => "gather",
            Phase::Reduce => "reduce",
        };
        f.write_str(name)
    }
}

/// Identity of a message: the phase plus a logical index (usually a row)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pub phase: Phase,
    pub index: usize,
}

impl Tag {
    pub fn new(phase: Phase, index: usize) -> Self {
        Self { phase, index }
    }

    /// Pack the tag into a single non-negative integer, unique per (phase, index).
    pub fn encode(self) -> Option<i32> {
        self.index
            .checked_mul(Phase::COUNT)
            .and_then(|v| v.checked_add(self.phase.code()))
            .and_then(|v| i32::try_from(v).ok())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.phase, self.index)
    }
}

/// Associative, commutative operators for [`Communicator::reduce`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Max,
    Min,
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Int,
    Float,
}

/// Owned message body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Int(Vec<i32>),
    Float(Vec<f64>),
}

/// Borrowed message body
#[derive(Debug, Clone, Copy)]
pub enum PayloadRef<'a> {
    Int(&'a [i32]),
    Float(&'a [f64]),
}

impl PayloadRef<'_> {
    pub fn to_payload(self) -> Payload {
        match self {
            PayloadRef::Int(v) => Payload::Int(v.to_vec()),
            PayloadRef::Float(v) => Payload::Float(v.to_vec()),
        }
    }
}

/// Scalar types that can travel in a message
pub trait Element: Copy + Send + fmt::Debug + 'static {
    const KIND: ElementKind;

    fn view(data: &[Self]) -> PayloadRef<'_>;

    fn from_payload(payload: Payload) -> Option<Vec<Self>>;

    fn combine(op: ReduceOp, a: Self, b: Self) -> Self;
}

impl Element for i32 {
    const KIND: ElementKind = ElementKind::Int;

    fn view(data: &[Self]) -> PayloadRef<'_> {
        PayloadRef::Int(data)
    }

    fn from_payload(payload: Payload) -> Option<Vec<Self>> {
        match payload {
            Payload::Int(v) => Some(v),
            Payload::Float(_) => None,
        }
    }

    fn combine(op: ReduceOp, a: Self, b: Self) -> Self {
        match op {
            ReduceOp::Max => a.max(b),
            ReduceOp::Min => a.min(b),
            ReduceOp::Sum => a.wrapping_add(b),
        }
    }
}

impl Element for f64 {
    const KIND: ElementKind = ElementKind::Float;

    fn view(data: &[Self]) -> PayloadRef<'_> {
        PayloadRef::Float(data)
    }

    fn from_payload(payload: Payload) -> Option<Vec<Self>> {
        match payload {
            Payload::Float(v) => Some(v),
            Payload::Int(_) => None,
        }
    }

    fn combine(op: ReduceOp, a: Self, b: Self) -> Self {
        match op {
            ReduceOp::Max => a.max(b),
            ReduceOp::Min => a.min(b),
            ReduceOp::Sum => a + b,
        }
    }
}

/// Decode a received payload, flagging a type mismatch as a protocol violation.
pub(crate) fn decode<T: Element>(rank: usize, tag: Tag, payload: Payload) -> Result<Vec<T>> {
    T::from_payload(payload).ok_or_else(|| {
        DistError::protocol(
            rank,
            tag.phase,
            format!("message {} does not carry {:?} elements", tag, T::KIND),
        )
    })
}

/// A fixed group of ranks that talk only by message passing
///
/// `send` and `recv` are matched by (peer, tag). Messages with the same tag
/// between the same pair arrive exactly once and in order; messages with
/// different tags may be consumed in any order.
pub trait Communicator {
    /// Rank of this participant, `0..size()`
    fn rank(&self) -> usize;

    /// Number of participants, fixed for the lifetime of the communicator
    fn size(&self) -> usize;

    /// Send `data` to `dest`, blocking until it has been handed over.
    fn send<T: Element>(&self, dest: usize, tag: Tag, data: &[T]) -> Result<()>;

    /// Receive the next message from `source` carrying `tag`.
    fn recv<T: Element>(&self, source: usize, tag: Tag) -> Result<Vec<T>>;

    fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR
    }

    /// Block until every rank has entered the barrier.
    ///
    /// The default routes through the coordinator: every rank checks in, then
    /// the coordinator releases them all.
    fn barrier(&self) -> Result<()> {
        let tag = Tag::new(Phase::Barrier, 0);
        if self.is_coordinator() {
            for peer in (0..self.size()).filter(|&p| p != COORDINATOR) {
                self.recv::<i32>(peer, tag)?;
            }
            for peer in (0..self.size()).filter(|&p| p != COORDINATOR) {
                self.send::<i32>(peer, tag, &[])?;
            }
        } else {
            self.send::<i32>(COORDINATOR, tag, &[])?;
            self.recv::<i32>(COORDINATOR, tag)?;
        }
        Ok(())
    }

    /// Combine one value per rank with `op`; only `root` gets `Some(result)`.
    fn reduce<T: Element>(&self, root: usize, value: T, op: ReduceOp) -> Result<Option<T>> {
        let tag = Tag::new(Phase::Reduce, root);
        if self.rank() != root {
            self.send(root, tag, &[value])?;
            return Ok(None);
        }

        let mut acc = value;
        for peer in (0..self.size()).filter(|&p| p != root) {
            let received = self.recv::<T>(peer, tag)?;
            match received.as_slice() {
                [v] => acc = T::combine(op, acc, *v),
                other => {
                    return Err(DistError::protocol(
                        peer,
                        Phase::Reduce,
                        format!("expected 1 value, got {}", other.len()),
                    ));
                }
            }
        }
        Ok(Some(acc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_encoding_is_unique_per_phase_and_index() {
        let a = Tag::new(Phase::ScatterB, 3).encode();
        let b = Tag::new(Phase::ScatterA, 3).encode();
        let c = Tag::new(Phase::ScatterB, 4).encode();
        assert!(a.is_some());
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(Tag::new(Phase::Shape, 0).encode(), Some(0));
        assert_eq!(Tag::new(Phase::Gather, usize::MAX).encode(), None);
    }

    #[test]
    fn test_combine() {
        assert_eq!(i32::combine(ReduceOp::Max, 3, 9), 9);
        assert_eq!(i32::combine(ReduceOp::Min, 3, 9), 3);
        assert_eq!(i32::combine(ReduceOp::Sum, i32::MAX, 1), i32::MIN);
        assert_eq!(f64::combine(ReduceOp::Max, 0.5, 0.25), 0.5);
    }

    #[test]
    fn test_decode_rejects_wrong_element_type() {
        let tag = Tag::new(Phase::Reduce, 0);
        let err = decode::<i32>(1, tag, Payload::Float(vec![1.0])).unwrap_err();
        assert!(matches!(err, DistError::ProtocolViolation { rank: 1, .. }));
        assert_eq!(decode::<f64>(1, tag, Payload::Float(vec![1.0])).unwrap(), vec![1.0]);
    }
}
