//! Run-unique token
//!
//! Every provider-side name (resource group, VM, database server) embeds the
//! run URI, so repeated or concurrent runs never collide and a crashed run's
//! leftovers can be found again from the URI alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest accepted run URI (provider name limits leave room for prefixes)
pub const MAX_RUN_URI_LEN: usize = 12;

/// Errors from parsing a user-supplied run URI
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunUriError {
    #[error("run URI cannot be empty")]
    Empty,

    #[error("run URI must be at most {MAX_RUN_URI_LEN} characters, got {0}")]
    TooLong(usize),

    #[error("run URI may only contain lowercase letters and digits, found {0:?}")]
    InvalidChar(char),
}

/// Run-unique identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunUri(String);

impl RunUri {
    /// Generate a fresh run URI from the random tail of a UUIDv7
    pub fn generate() -> Self {
        let simple = uuid::Uuid::now_v7().simple().to_string();
        Self(simple[simple.len() - 8..].to_string())
    }

    /// Validate a user-supplied run URI
    pub fn parse(value: &str) -> Result<Self, RunUriError> {
        if value.is_empty() {
            return Err(RunUriError::Empty);
        }
        if value.len() > MAX_RUN_URI_LEN {
            return Err(RunUriError::TooLong(value.len()));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        {
            return Err(RunUriError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunUri {
    type Err = RunUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RunUri {
    type Error = RunUriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RunUri> for String {
    fn from(uri: RunUri) -> Self {
        uri.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_uris_are_valid_and_distinct() {
        let a = RunUri::generate();
        let b = RunUri::generate();
        assert_eq!(a.as_str().len(), 8);
        assert!(RunUri::parse(a.as_str()).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(RunUri::parse(""), Err(RunUriError::Empty));
        assert_eq!(
            RunUri::parse("abcdefghijklm"),
            Err(RunUriError::TooLong(13))
        );
        assert_eq!(RunUri::parse("Abc"), Err(RunUriError::InvalidChar('A')));
        assert_eq!(RunUri::parse("a-b"), Err(RunUriError::InvalidChar('-')));
    }

    #[test]
    fn test_serde_validates() {
        let uri: RunUri = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(uri.to_string(), "abc123");
        assert!(serde_json::from_str::<RunUri>("\"ABC\"").is_err());
    }
}
