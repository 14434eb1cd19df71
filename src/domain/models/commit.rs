use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code version a coverage report is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitDescriptor {
    pub branch: String,
    /// Commit time in milliseconds since the epoch
    pub timestamp: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitParseError {
    #[error("Commit '{0}' is not of the form branch:timestamp")]
    MissingSeparator(String),

    #[error("Commit '{0}' has an empty branch")]
    EmptyBranch(String),

    #[error("Commit timestamp '{0}' is not a number")]
    InvalidTimestamp(String),
}

impl CommitDescriptor {
    pub fn new(branch: impl Into<String>, timestamp: i64) -> Self {
        Self {
            branch: branch.into(),
            timestamp,
        }
    }
}

impl fmt::Display for CommitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.branch, self.timestamp)
    }
}

impl FromStr for CommitDescriptor {
    type Err = CommitParseError;

    /// Parses `branch:timestamp`. Branch names may contain colons, so the
    /// last one separates the timestamp.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (branch, timestamp) = s
            .rsplit_once(':')
            .ok_or_else(|| CommitParseError::MissingSeparator(s.to_string()))?;
        if branch.trim().is_empty() {
            return Err(CommitParseError::EmptyBranch(s.to_string()));
        }
        let timestamp = timestamp
            .trim()
            .parse()
            .map_err(|_| CommitParseError::InvalidTimestamp(timestamp.to_string()))?;
        Ok(Self::new(branch.trim(), timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let commit: CommitDescriptor = "master:1234".parse().unwrap();
        assert_eq!(commit, CommitDescriptor::new("master", 1234));
        assert_eq!(commit.to_string(), "master:1234");
    }

    #[test]
    fn test_branch_with_colon() {
        let commit: CommitDescriptor = "feature:x:99".parse().unwrap();
        assert_eq!(commit.branch, "feature:x");
        assert_eq!(commit.timestamp, 99);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "master".parse::<CommitDescriptor>(),
            Err(CommitParseError::MissingSeparator(_))
        ));
        assert!(matches!(
            ":12".parse::<CommitDescriptor>(),
            Err(CommitParseError::EmptyBranch(_))
        ));
        assert!(matches!(
            "master:HEAD".parse::<CommitDescriptor>(),
            Err(CommitParseError::InvalidTimestamp(_))
        ));
    }
}
