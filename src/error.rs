use crate::comm::Phase;
use thiserror::Error;

/// Errors that abort a distributed multiply.
///
/// Every variant is fatal: nothing is retried and no partial result is
/// returned.
#[derive(Error, Debug)]
pub enum DistError {
    /// Inputs or launch parameters that cannot form a valid run
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A peer sent something the partition/scatter contract does not allow
    #[error("protocol violation on rank {rank} during {phase}: {detail}")]
    ProtocolViolation {
        rank: usize,
        phase: Phase,
        detail: String,
    },

    /// A send or receive could not complete
    #[error("transport failure on rank {rank} during {phase}: {detail}")]
    Transport {
        rank: usize,
        phase: Phase,
        detail: String,
    },

    /// A rank thread of a local universe panicked
    #[error("rank {rank} panicked")]
    RankPanicked { rank: usize },
}

pub type Result<T> = std::result::Result<T, DistError>;

impl DistError {
    pub fn config(detail: impl Into<String>) -> Self {
        DistError::Configuration(detail.into())
    }

    pub fn protocol(rank: usize, phase: Phase, detail: impl Into<String>) -> Self {
        DistError::ProtocolViolation {
            rank,
            phase,
            detail: detail.into(),
        }
    }

    pub fn transport(rank: usize, phase: Phase, detail: impl Into<String>) -> Self {
        DistError::Transport {
            rank,
            phase,
            detail: detail.into(),
        }
    }

    /// Rank the failure was observed on, when known
    pub fn rank(&self) -> Option<usize> {
        match self {
            DistError::Configuration(_) => None,
            DistError::ProtocolViolation { rank, .. }
            | DistError::Transport { rank, .. }
            | DistError::RankPanicked { rank } => Some(*rank),
        }
    }
}
