use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Username
// ---------------------------------------------------------------------------

const MAX_USERNAME_LENGTH: usize = 50;

/// A validated username: 1-50 ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Create a new `Username` after validation.
    pub fn new(s: impl Into<String>) -> Result<Self, UsernameError> {
        let s = s.into();

        if s.is_empty() {
            return Err(UsernameError::Empty);
        }

        if s.len() > MAX_USERNAME_LENGTH {
            return Err(UsernameError::TooLong(s.len()));
        }

        if !s.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(UsernameError::InvalidCharacters);
        }

        Ok(Self(s))
    }
}

impl TryFrom<String> for Username {
    type Error = UsernameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Username> for String {
    fn from(username: Username) -> Self {
        username.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when validating a username.
#[derive(Debug, Clone, Error)]
pub enum UsernameError {
    #[error("username must not be empty")]
    Empty,

    #[error("username length {0} exceeds maximum of {MAX_USERNAME_LENGTH}")]
    TooLong(usize),

    #[error("username must contain only ASCII letters")]
    InvalidCharacters,
}

// ---------------------------------------------------------------------------
// BirthdayRecord
// ---------------------------------------------------------------------------

/// One stored record: a username and its date of birth.
///
/// Layout in the table: partition key `username`, payload `dateOfBirth` as an
/// ISO-8601 calendar date string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthdayRecord {
    pub username: Username,

    #[serde(rename = "dateOfBirth")]
    pub date_of_birth: NaiveDate,
}

impl BirthdayRecord {
    /// Build a record, rejecting a date of birth that is not strictly before `today`.
    pub fn new(
        username: Username,
        date_of_birth: NaiveDate,
        today: NaiveDate,
    ) -> Result<Self, RecordError> {
        if date_of_birth >= today {
            return Err(RecordError::NotInPast {
                date_of_birth,
                today,
            });
        }

        Ok(Self {
            username,
            date_of_birth,
        })
    }
}

/// Errors that can occur when building a record.
#[derive(Debug, Clone, Error)]
pub enum RecordError {
    #[error("dateOfBirth {date_of_birth} must be a date before today ({today})")]
    NotInPast {
        date_of_birth: NaiveDate,
        today: NaiveDate,
    },
}
