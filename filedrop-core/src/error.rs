//! Error types for filedrop

use std::time::Duration;
use thiserror::Error;

/// How an error is surfaced to the uploading client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself is at fault; answered with 400.
    Client,
    /// The declared length could not be parsed. Never aborts a session.
    ProgressParse,
    /// Destination or transfer failure; answered with 500.
    Server,
}

#[derive(Error, Debug)]
pub enum FileDropError {
    #[error("malformed multipart body: {0}")]
    MalformedMultipart(String),

    #[error("missing file field")]
    MissingFileField,

    #[error("missing file name")]
    MissingFileName,

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("invalid length field: {0}")]
    InvalidLength(String),

    #[error("failed to create destination '{name}': {source}")]
    CreateDestination {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write destination: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("upload timed out after {0:?}")]
    Timeout(Duration),
}

impl FileDropError {
    /// Classify this error for status mapping.
    pub fn class(&self) -> ErrorClass {
        match self {
            FileDropError::MalformedMultipart(_)
            | FileDropError::MissingFileField
            | FileDropError::MissingFileName
            | FileDropError::InvalidFileName(_) => ErrorClass::Client,
            FileDropError::InvalidLength(_) => ErrorClass::ProgressParse,
            FileDropError::CreateDestination { .. }
            | FileDropError::Write(_)
            | FileDropError::BodyRead(_)
            | FileDropError::Timeout(_) => ErrorClass::Server,
        }
    }
}
