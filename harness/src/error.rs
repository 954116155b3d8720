use shared::{FaultKind, ValidationError, VoteChoice, VoterId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Found {count} votes for voter {voter_id}, expected at most one")]
    MultipleMatch { voter_id: VoterId, count: usize },
    #[error("Vote API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Vote API did not issue a {cookie} cookie")]
    MissingSession { cookie: String },
    #[error("Queue error: {0}")]
    Queue(#[from] redis::RedisError),
    #[error("Queue not drained by worker: depth {depth} after push")]
    QueueNotDrained { depth: i64 },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Failed to encode queue payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {message}")]
    Config { key: String, message: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Vote for {voter_id} is {found:?}, expected {expected}")]
    UnexpectedVote {
        voter_id: VoterId,
        expected: VoteChoice,
        found: Option<VoteChoice>,
    },
}

impl HarnessError {
    pub fn kind(&self) -> FaultKind {
        match self {
            HarnessError::MultipleMatch { .. } => FaultKind::Integrity,
            HarnessError::Transport(_) | HarnessError::MissingSession { .. } => FaultKind::Transport,
            HarnessError::Queue(_) | HarnessError::QueueNotDrained { .. } | HarnessError::Encode(_) => FaultKind::Queue,
            HarnessError::Database(_) => FaultKind::Storage,
            HarnessError::Config { .. } => FaultKind::Configuration,
            HarnessError::Validation(_) => FaultKind::Validation,
            HarnessError::UnexpectedVote { .. } => FaultKind::Assertion,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
