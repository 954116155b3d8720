use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Coarse classification of harness failures.
///
/// Integrity and transport faults fail a run loudly; non-convergence of the
/// waiter is not a fault at all and never shows up here.
#[derive(Debug, Clone, Copy, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FaultKind {
    #[error("Store holds more than one record for a voter")]
    Integrity,
    #[error("Vote API request failed")]
    Transport,
    #[error("Work queue operation failed")]
    Queue,
    #[error("Vote store query failed")]
    Storage,
    #[error("Invalid harness configuration")]
    Configuration,
    #[error("Validation failed")]
    Validation,
    #[error("Observed vote did not match expectation")]
    Assertion,
}

impl FaultKind {
    /// Whether the fault points at broken data rather than a broken connection.
    pub fn is_data_fault(self) -> bool {
        matches!(self, FaultKind::Integrity | FaultKind::Assertion)
    }
}
