//! In-process universe: every rank is a thread, every ordered pair of ranks
//! has its own rendezvous channel.
//!
//! Receives are selective. A message whose tag is not the one being waited
//! for is parked in a per-(source, tag) queue and handed out later, so tags
//! can be consumed in any order while each tag stays FIFO.

use super::{Communicator, Element, Payload, Phase, Tag, decode};
use crate::error::{DistError, Result};
use crossbeam_channel::{self as cb};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::thread;
use tracing::trace;

#[derive(Debug)]
struct Envelope {
    tag: Tag,
    payload: Payload,
}

/// One rank's endpoint in a [`LocalUniverse`]
pub struct LocalComm {
    rank: usize,
    size: usize,
    outboxes: Vec<cb::Sender<Envelope>>,
    inboxes: Vec<cb::Receiver<Envelope>>,
    parked: RefCell<HashMap<(usize, Tag), VecDeque<Payload>>>,
}

impl LocalComm {
    fn check_peer(&self, peer: usize, phase: Phase) -> Result<()> {
        if peer >= self.size {
            return Err(DistError::transport(
                self.rank,
                phase,
                format!("rank {} does not exist in a universe of {}", peer, self.size),
            ));
        }
        if peer == self.rank {
            return Err(DistError::protocol(
                self.rank,
                phase,
                "a rank cannot message itself",
            ));
        }
        Ok(())
    }

    fn take_parked(&self, source: usize, tag: Tag) -> Option<Payload> {
        self.parked
            .borrow_mut()
            .get_mut(&(source, tag))
            .and_then(VecDeque::pop_front)
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send<T: Element>(&self, dest: usize, tag: Tag, data: &[T]) -> Result<()> {
        self.check_peer(dest, tag.phase)?;
        let envelope = Envelope {
            tag,
            payload: T::view(data).to_payload(),
        };
        self.outboxes[dest].send(envelope).map_err(|_| {
            DistError::transport(
                self.rank,
                tag.phase,
                format!("rank {} hung up before taking message {}", dest, tag),
            )
        })
    }

    fn recv<T: Element>(&self, source: usize, tag: Tag) -> Result<Vec<T>> {
        self.check_peer(source, tag.phase)?;
        if let Some(payload) = self.take_parked(source, tag) {
            return decode(self.rank, tag, payload);
        }

        loop {
            let envelope = self.inboxes[source].recv().map_err(|_| {
                DistError::transport(
                    self.rank,
                    tag.phase,
                    format!("rank {} hung up while waiting for message {}", source, tag),
                )
            })?;

            if envelope.tag == tag {
                return decode(self.rank, tag, envelope.payload);
            }

            trace!(
                rank = self.rank,
                source,
                parked = %envelope.tag,
                waiting = %tag,
                "parking message"
            );
            self.parked
                .borrow_mut()
                .entry((source, envelope.tag))
                .or_default()
                .push_back(envelope.payload);
        }
    }
}

/// A fixed-size group of thread ranks
#[derive(Debug, Clone, Copy)]
pub struct LocalUniverse {
    size: usize,
}

impl LocalUniverse {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(DistError::config("a universe needs at least one rank"));
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Build one connected endpoint per rank, indexed by rank.
    pub fn communicators(&self) -> Vec<LocalComm> {
        let n = self.size;
        let mut senders: Vec<Vec<Option<cb::Sender<Envelope>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();
        let mut receivers: Vec<Vec<Option<cb::Receiver<Envelope>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();

        for src in 0..n {
            for dst in 0..n {
                let (tx, rx) = cb::bounded(0);
                senders[src][dst] = Some(tx);
                receivers[dst][src] = Some(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalComm {
                rank,
                size: n,
                outboxes: outboxes.into_iter().flatten().collect(),
                inboxes: inboxes.into_iter().flatten().collect(),
                parked: RefCell::new(HashMap::new()),
            })
            .collect()
    }

    /// Run `job` once per rank on its own thread and collect the results by rank.
    ///
    /// A rank that returns drops its channels, so peers still waiting on it
    /// fail with a transport error rather than blocking forever.
    pub fn run<T, E, F>(&self, job: F) -> Vec<std::result::Result<T, E>>
    where
        T: Send,
        E: Send + From<DistError>,
        F: Fn(LocalComm) -> std::result::Result<T, E> + Sync,
    {
        let job = &job;
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .communicators()
                .into_iter()
                .map(|comm| {
                    let rank = comm.rank;
                    let handle = thread::Builder::new()
                        .name(format!("rank-{}", rank))
                        .spawn_scoped(scope, move || job(comm));
                    (rank, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(rank, handle)| match handle {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or_else(|_| Err(DistError::RankPanicked { rank }.into())),
                    Err(e) => Err(DistError::config(format!(
                        "failed to spawn rank {}: {}",
                        rank, e
                    ))
                    .into()),
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{COORDINATOR, ReduceOp};

    #[test]
    fn test_rejects_empty_universe() {
        assert!(LocalUniverse::new(0).is_err());
    }

    #[test]
    fn test_out_of_order_tags_are_matched() {
        let universe = LocalUniverse::new(2).unwrap();
        let results = universe.run(|comm| -> Result<Vec<i32>> {
            let first = Tag::new(Phase::ScatterB, 0);
            let second = Tag::new(Phase::ScatterA, 0);
            if comm.rank() == 0 {
                comm.send(1, first, &[1, 2])?;
                comm.send(1, second, &[3, 4])?;
                comm.send(1, first, &[5, 6])?;
                Ok(Vec::new())
            } else {
                let mut seen = comm.recv::<i32>(0, second)?;
                seen.extend(comm.recv::<i32>(0, first)?);
                seen.extend(comm.recv::<i32>(0, first)?);
                Ok(seen)
            }
        });

        assert_eq!(results[1].as_ref().unwrap(), &vec![3, 4, 1, 2, 5, 6]);
    }

    #[test]
    fn test_peer_exit_is_a_transport_failure() {
        let universe = LocalUniverse::new(2).unwrap();
        let results = universe.run(|comm| -> Result<()> {
            if comm.rank() == 1 {
                comm.recv::<i32>(0, Tag::new(Phase::Shape, 0))?;
            }
            Ok(())
        });

        assert!(results[0].is_ok());
        match &results[1] {
            Err(DistError::Transport { rank, phase, .. }) => {
                assert_eq!(*rank, 1);
                assert_eq!(*phase, Phase::Shape);
            }
            other => panic!("expected transport failure, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_peer() {
        let comm = LocalUniverse::new(1).unwrap().communicators().remove(0);
        let err = comm.send(3, Tag::new(Phase::Gather, 0), &[1]).unwrap_err();
        assert!(matches!(err, DistError::Transport { rank: 0, .. }));
    }

    #[test]
    fn test_barrier_and_reduce() {
        let universe = LocalUniverse::new(5).unwrap();
        let results = universe.run(|comm| -> Result<Option<i32>> {
            comm.barrier()?;
            let value = comm.rank() as i32 * 10;
            let max = comm.reduce(COORDINATOR, value, ReduceOp::Max)?;
            let sum = comm.reduce(COORDINATOR, value, ReduceOp::Sum)?;
            comm.barrier()?;
            Ok(max.zip(sum).map(|(m, s)| m * 1000 + s))
        });

        assert_eq!(results[0].as_ref().unwrap(), &Some(40 * 1000 + 100));
        for result in &results[1..] {
            assert_eq!(result.as_ref().unwrap(), &None);
        }
    }

    #[test]
    fn test_panicking_rank_is_reported() {
        let universe = LocalUniverse::new(2).unwrap();
        let results = universe.run(|comm| -> Result<()> {
            if comm.rank() == 1 {
                panic!("boom");
            }
            Ok(())
        });
        assert!(matches!(results[1], Err(DistError::RankPanicked { rank: 1 })));
    }
}
