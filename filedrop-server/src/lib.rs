//! filedrop HTTP server: upload endpoint, bundled frontend, progress rendering

pub mod assets;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod render;
pub mod server;

pub use config::{cli, ServerConfig};
pub use server::FileDropServer;
