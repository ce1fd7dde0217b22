//! filedrop Rust client SDK

pub mod client;
pub mod error;
pub mod multipart;
pub mod streaming;

pub use client::Client;
pub use error::ClientError;
pub use multipart::FormUpload;
pub use streaming::file_stream;

pub type Result<T> = std::result::Result<T, ClientError>;
