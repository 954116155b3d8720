pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod queue;
pub mod scenarios;
pub mod waiter;
pub use shared::{models::*, FaultKind, ValidationError};
pub use error::{HarnessError, Result};
pub use waiter::{expect_vote_updated, Convergence, PendingChange, VoteReader, WaitPolicy};

#[cfg(test)]
mod tests;
