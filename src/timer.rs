//! Barrier-aligned timing reduced to the slowest rank.
//!
//! Ranks never compare raw timestamps. Each one measures its own elapsed
//! time from a shared barrier; only the elapsed seconds cross rank
//! boundaries, through a max-reduce to the coordinator.

use crate::comm::{COORDINATOR, Communicator, ReduceOp};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::trace;

/// Elapsed seconds measured by one rank
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingSample {
    pub rank: usize,
    pub seconds: f64,
}

/// Slowest rank's elapsed time: the wall-clock cost of the distributed step
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct RunDuration {
    pub seconds: f64,
}

impl RunDuration {
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs_f64(self.seconds.max(0.0))
    }
}

/// Outcome of [`SyncTimer::stop`] on one rank
#[derive(Debug, Clone, Copy)]
pub struct TimingOutcome {
    pub local: TimingSample,
    /// Set on the coordinator only
    pub run: Option<RunDuration>,
}

pub struct SyncTimer {
    rank: usize,
    started: Instant,
}

impl SyncTimer {
    /// Wait for every rank, then start the local clock.
    pub fn start<C: Communicator>(comm: &C) -> Result<Self> {
        comm.barrier()?;
        Ok(Self {
            rank: comm.rank(),
            started: Instant::now(),
        })
    }

    /// Stop the local clock and max-reduce elapsed time to the coordinator.
    pub fn stop<C: Communicator>(self, comm: &C) -> Result<TimingOutcome> {
        let seconds = self.started.elapsed().as_secs_f64();
        trace!(rank = self.rank, seconds, "local phase finished");

        let slowest = comm.reduce(COORDINATOR, seconds, ReduceOp::Max)?;
        Ok(TimingOutcome {
            local: TimingSample {
                rank: self.rank,
                seconds,
            },
            run: slowest.map(|seconds| RunDuration { seconds }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::local::LocalUniverse;
    use std::thread;

    #[test]
    fn test_run_duration_covers_the_slowest_rank() {
        let universe = LocalUniverse::new(4).unwrap();
        let results = universe.run(|comm| -> Result<TimingOutcome> {
            let timer = SyncTimer::start(&comm)?;
            thread::sleep(Duration::from_millis(10 * comm.rank() as u64));
            timer.stop(&comm)
        });

        let outcomes: Vec<TimingOutcome> = results.into_iter().map(|r| r.unwrap()).collect();
        let run = outcomes[0].run.expect("coordinator gets the reduced duration");
        for outcome in &outcomes {
            assert!(run.seconds >= outcome.local.seconds);
        }
        assert!(run.seconds >= 0.03);
        assert!(outcomes[1..].iter().all(|o| o.run.is_none()));
    }

    #[test]
    fn test_single_rank() {
        let universe = LocalUniverse::new(1).unwrap();
        let results = universe.run(|comm| -> Result<TimingOutcome> {
            let timer = SyncTimer::start(&comm)?;
            timer.stop(&comm)
        });
        let outcome = results[0].as_ref().unwrap();
        assert_eq!(outcome.run.unwrap().seconds, outcome.local.seconds);
    }
}
