use crate::comm::Communicator;
use crate::comm::local::LocalUniverse;
use crate::error::DistError;
use anyhow::{Context, Result};
use tracing::error;

/// Where the ranks of a run come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// `workers` threads of this process
    Local { workers: usize },
    /// One rank per process of the MPI world this process was started in
    Mpi,
}

/// Work every rank performs; only the coordinator produces output
pub trait RankJob: Sync {
    type Output: Send;

    fn run<C: Communicator>(&self, comm: &C) -> Result<Option<Self::Output>>;
}

/// Run `job` on every rank of `backend` and return the coordinator's output.
pub fn launch<J: RankJob>(backend: Backend, job: &J) -> Result<Option<J::Output>> {
    match backend {
        Backend::Local { workers } => launch_local(workers, job),
        Backend::Mpi => launch_mpi(job),
    }
}

fn launch_local<J: RankJob>(workers: usize, job: &J) -> Result<Option<J::Output>> {
    let universe = LocalUniverse::new(workers)?;
    let mut output = None;
    let mut failures = Vec::new();

    for (rank, result) in universe.run(|comm| job.run(&comm)).into_iter().enumerate() {
        match result {
            Ok(out) if rank == 0 => output = Some(out),
            Ok(_) => {}
            Err(e) => {
                error!(rank, "rank failed: {:#}", e);
                failures.push((rank, e));
            }
        }
    }

    match root_cause(failures) {
        Some((rank, e)) => Err(e.context(format!("Rank {} failed", rank))),
        None => output.context("Universe has no coordinator"),
    }
}

/// Pick the failure that caused the others.
///
/// A rank that fails on its own makes its peers see a hang-up, so transport
/// failures only win when nothing else went wrong.
fn root_cause(failures: Vec<(usize, anyhow::Error)>) -> Option<(usize, anyhow::Error)> {
    let is_transport = |e: &anyhow::Error| {
        e.chain()
            .any(|c| matches!(c.downcast_ref::<DistError>(), Some(DistError::Transport { .. })))
    };
    let mut failures = failures.into_iter();
    let first = failures.next()?;
    if !is_transport(&first.1) {
        return Some(first);
    }
    failures.find(|(_, e)| !is_transport(e)).or(Some(first))
}

#[cfg(feature = "mpi")]
fn launch_mpi<J: RankJob>(job: &J) -> Result<Option<J::Output>> {
    use crate::comm::mpi_world::MpiComm;
    use mpi::traits::Communicator as _;

    let universe = mpi::initialize().context("Failed to initialize MPI (already initialized?)")?;
    let world = universe.world();
    let rank = usize::try_from(world.rank()).unwrap_or_default();
    let comm = MpiComm::new(universe.world());
    abort_on_error(rank, job.run(&comm), |code| world.abort(code))
}

/// Log a failed rank and tear down every rank of the job with `abort`.
#[cfg(any(feature = "mpi", test))]
fn abort_on_error<T>(rank: usize, result: Result<T>, abort: impl FnOnce(i32)) -> Result<T> {
    if let Err(e) = &result {
        error!(rank, "rank failed, aborting the job: {:#}", e);
        abort(1);
    }
    result
}

#[cfg(not(feature = "mpi"))]
fn launch_mpi<J: RankJob>(_job: &J) -> Result<Option<J::Output>> {
    anyhow::bail!("This build has no MPI support; rebuild with `--features mpi`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{COORDINATOR, Phase, ReduceOp};

    struct RankSum;

    impl RankJob for RankSum {
        type Output = i32;

        fn run<C: Communicator>(&self, comm: &C) -> Result<Option<i32>> {
            Ok(comm.reduce(COORDINATOR, comm.rank() as i32, ReduceOp::Sum)?)
        }
    }

    struct FailOnRank(usize);

    impl RankJob for FailOnRank {
        type Output = ();

        fn run<C: Communicator>(&self, comm: &C) -> Result<Option<()>> {
            if comm.rank() == self.0 {
                anyhow::bail!("rank {} gave up", comm.rank());
            }
            Ok(comm.is_coordinator().then_some(()))
        }
    }

    #[test]
    fn test_local_launch_returns_coordinator_output() {
        let out = launch(Backend::Local { workers: 4 }, &RankSum).unwrap();
        assert_eq!(out, Some(6));
    }

    #[test]
    fn test_worker_failure_is_surfaced() {
        let err = launch(Backend::Local { workers: 3 }, &FailOnRank(2)).unwrap_err();
        assert!(format!("{:#}", err).contains("Rank 2 failed"));
    }

    /// Rank 1 rejects what it was sent; everyone else waits on it.
    struct RejectOnRank1;

    impl RankJob for RejectOnRank1 {
        type Output = ();

        fn run<C: Communicator>(&self, comm: &C) -> Result<Option<()>> {
            if comm.rank() == 1 {
                return Err(DistError::protocol(1, Phase::ScatterA, "row 3 has 2 elements").into());
            }
            comm.barrier()?;
            Ok(comm.is_coordinator().then_some(()))
        }
    }

    #[test]
    fn test_failing_rank_is_reported_over_hang_ups() {
        let err = launch(Backend::Local { workers: 3 }, &RejectOnRank1).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.starts_with("Rank 1 failed"), "{}", message);
        assert!(message.contains("protocol violation on rank 1"), "{}", message);
        assert!(matches!(
            err.downcast_ref::<DistError>(),
            Some(DistError::ProtocolViolation { rank: 1, .. })
        ));
    }

    #[test]
    fn test_root_cause_falls_back_to_first_failure() {
        let hang_up =
            |rank| anyhow::Error::from(DistError::transport(rank, Phase::Barrier, "gone"));
        let (rank, _) = root_cause(vec![(0, hang_up(0)), (2, hang_up(2))]).unwrap();
        assert_eq!(rank, 0);
        assert!(root_cause(Vec::new()).is_none());
    }

    #[test]
    fn test_failed_rank_aborts() {
        let aborted = std::cell::Cell::new(None);
        let result: Result<()> = abort_on_error(
            2,
            Err(DistError::config("bad shape").into()),
            |code| aborted.set(Some(code)),
        );
        assert!(result.is_err());
        assert_eq!(aborted.get(), Some(1));

        let ok = abort_on_error(0, Ok(5), |_| panic!("must not abort on success"));
        assert_eq!(ok.unwrap(), 5);
    }

    #[test]
    fn test_zero_workers() {
        assert!(launch(Backend::Local { workers: 0 }, &RankSum).is_err());
    }

    #[cfg(not(feature = "mpi"))]
    #[test]
    fn test_mpi_backend_needs_feature() {
        assert!(launch(Backend::Mpi, &RankSum).is_err());
    }
}
