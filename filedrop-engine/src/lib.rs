//! Streaming upload ingestion: multipart dispatch, progress tracking, and
//! destination files

pub mod dispatcher;
pub mod length;
pub mod progress;
pub mod session;
pub mod sink;
pub mod writer;

pub use dispatcher::*;
pub use length::*;
pub use progress::*;
pub use session::*;
pub use sink::*;
pub use writer::*;
