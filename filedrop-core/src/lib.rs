//! Core data models and types for filedrop

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;

/// Result type alias for filedrop operations
pub type Result<T> = std::result::Result<T, FileDropError>;
