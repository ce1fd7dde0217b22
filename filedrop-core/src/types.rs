//! Core data types for filedrop

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{ErrorClass, FileDropError};

/// How client supplied file names are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamePolicy {
    /// Take the name as sent, only rejecting an empty one.
    #[default]
    Permissive,
    /// Also reject anything that could leave the destination directory.
    Strict,
}

/// Destination file name as declared by the client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileName(Arc<str>);

impl FileName {
    /// Create a new file name, validated against `policy`
    pub fn new(name: &str, policy: NamePolicy) -> crate::Result<Self> {
        if name.is_empty() {
            return Err(FileDropError::MissingFileName);
        }

        if policy == NamePolicy::Strict {
            if name.chars().any(|c| c.is_control()) {
                return Err(FileDropError::InvalidFileName(
                    "control characters not allowed".to_string(),
                ));
            }
            if name.contains('/') || name.contains('\\') {
                return Err(FileDropError::InvalidFileName(format!(
                    "path separators not allowed in '{}'",
                    name
                )));
            }
            if name == "." || name == ".." {
                return Err(FileDropError::InvalidFileName(format!(
                    "'{}' is not a file name",
                    name
                )));
            }
        }

        Ok(FileName(Arc::from(name)))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one upload session in the progress registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        SessionId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One progress report: raw counts only.
///
/// `total` of `None` means the total is unknown, not zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressObservation {
    pub file_name: FileName,
    pub bytes_written: u64,
    pub total: Option<u64>,
}

/// Terminal result of one upload session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(u64),
    BadRequest(String),
    ServerError(String),
}

impl Outcome {
    /// HTTP status code reported for this outcome
    pub fn status_code(&self) -> u16 {
        match self {
            Outcome::Completed(_) => 200,
            Outcome::BadRequest(_) => 400,
            Outcome::ServerError(_) => 500,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }
}

impl From<FileDropError> for Outcome {
    fn from(err: FileDropError) -> Self {
        match err.class() {
            ErrorClass::Client => Outcome::BadRequest(err.to_string()),
            ErrorClass::Server => Outcome::ServerError(err.to_string()),
            // Never fatal on its own; seeing one here means the caller gave up.
            ErrorClass::ProgressParse => Outcome::BadRequest(err.to_string()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed(n) => write!(f, "completed ({} bytes)", n),
            Outcome::BadRequest(reason) => write!(f, "bad request: {}", reason),
            Outcome::ServerError(reason) => write!(f, "server error: {}", reason),
        }
    }
}
