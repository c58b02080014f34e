use thiserror::Error;
use uuid::Uuid;

use crate::types::CategoryState;

pub type ContestResult<T> = Result<T, ContestError>;

#[derive(Error, Debug)]
pub enum ContestError {
    #[error("Category not found: {0}")]
    CategoryNotFound(Uuid),

    #[error("Category {id} does not accept ballots in state {state:?}")]
    CategoryNotEligible { id: Uuid, state: CategoryState },

    #[error("Too many entries in vote submission: {got} (max {max})")]
    TooManyEntries { got: usize, max: usize },

    #[error("Invalid ballot entry: {0}")]
    InvalidBallotEntry(String),

    #[error("Ballot entry already voted: {0}")]
    EntryAlreadyVoted(Uuid),

    #[error("Invalid rank {rank} for ballot entry {entry_id}")]
    InvalidRank { entry_id: Uuid, rank: u8 },

    #[error("Photo {0} has no round-two section assigned")]
    SectionUnassigned(Uuid),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Leaderboard unavailable: {0}")]
    LeaderboardUnavailable(String),

    #[error("Persistent store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
