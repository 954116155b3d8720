pub const MAX_VOTER_ID_LENGTH: usize = 255;
pub const MAX_CHOICE_LENGTH: usize = 255;
pub const MAX_TABLE_NAME_LENGTH: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Empty voter id")]
    EmptyVoterId,
    #[error("Voter id exceeds maximum length of {MAX_VOTER_ID_LENGTH}")]
    VoterIdTooLong,
    #[error("Voter id contains invalid character: {0:?}")]
    InvalidVoterIdChar(char),
    #[error("Empty vote choice")]
    EmptyChoice,
    #[error("Vote choice exceeds maximum length of {MAX_CHOICE_LENGTH}")]
    ChoiceTooLong,
    #[error("Vote choice contains invalid character: {0:?}")]
    InvalidChoiceChar(char),
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),
}

/// Voter ids travel as cookie values, so separators and whitespace are rejected.
pub fn validate_voter_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() { return Err(ValidationError::EmptyVoterId); }
    if id.len() > MAX_VOTER_ID_LENGTH { return Err(ValidationError::VoterIdTooLong); }

    if let Some(c) = id.chars().find(|c| !c.is_ascii_graphic() || matches!(c, ';' | ',' | '"' | '\\')) {
        return Err(ValidationError::InvalidVoterIdChar(c));
    }

    Ok(())
}

pub fn validate_vote_choice(choice: &str) -> Result<(), ValidationError> {
    if choice.is_empty() { return Err(ValidationError::EmptyChoice); }
    if choice.len() > MAX_CHOICE_LENGTH { return Err(ValidationError::ChoiceTooLong); }

    if let Some(c) = choice.chars().find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_')) {
        return Err(ValidationError::InvalidChoiceChar(c));
    }

    Ok(())
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(name: &str) -> Result<(), ValidationError> {
    let starts_ok = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let body_ok = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !starts_ok || !body_ok || name.len() > MAX_TABLE_NAME_LENGTH {
        return Err(ValidationError::InvalidTableName(name.to_string()));
    }

    Ok(())
}
