use serde::{Serialize, Deserialize};
use std::fmt;
use uuid::Uuid;
use crate::validation::{validate_vote_choice, validate_voter_id, ValidationError};

/// Opaque identifier of one voter's latest vote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[cfg_attr(feature = "db", derive(sqlx::Type), sqlx(transparent))]
pub struct VoterId(String);

impl VoterId {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        validate_voter_id(&id)?;
        Ok(Self(id))
    }

    /// Fresh identifier that no existing record should carry.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VoterId {
    type Error = ValidationError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<VoterId> for String {
    fn from(id: VoterId) -> Self {
        id.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A ballot choice such as `"a"` or `"b"`.
///
/// Choices built through [`VoteChoice::new`] or deserialized are validated;
/// values decoded from the store are taken as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[cfg_attr(feature = "db", derive(sqlx::Type), sqlx(transparent))]
pub struct VoteChoice(String);

impl VoteChoice {
    pub fn new(choice: impl Into<String>) -> Result<Self, ValidationError> {
        let choice = choice.into();
        validate_vote_choice(&choice)?;
        Ok(Self(choice))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VoteChoice {
    type Error = ValidationError;

    fn try_from(choice: String) -> Result<Self, Self::Error> {
        Self::new(choice)
    }
}

impl From<VoteChoice> for String {
    fn from(choice: VoteChoice) -> Self {
        choice.0
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the votes table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct VoteRecord {
    #[cfg_attr(feature = "db", sqlx(rename = "id"))]
    pub voter_id: VoterId,
    pub vote: VoteChoice,
}

/// Payload the worker consumes from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    pub vote: VoteChoice,
    pub voter_id: VoterId,
}

/// Value of the session cookie issued by the vote API.
///
/// The API uses the voter id itself as the cookie value, so a token can be
/// turned back into the identifier it carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn for_voter(voter_id: &VoterId) -> Self {
        Self(voter_id.as_str().to_owned())
    }

    pub fn voter_id(&self) -> Result<VoterId, ValidationError> {
        VoterId::new(self.0.clone())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which end of the work queue a message is placed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueEnd {
    /// Normal submission, consumed after everything already queued.
    #[default]
    Tail,
    /// Priority injection, consumed next.
    Head,
}
