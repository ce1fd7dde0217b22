//! Command-line configuration

use clap::{Arg, ArgAction, ArgMatches, Command};
use filedrop_core::NamePolicy;
use filedrop_engine::{IngestConfig, OverwritePolicy};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::logging::LogFormat;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid listen address '{0}'")]
    InvalidListen(String),

    #[error("invalid timeout '{0}', expected whole seconds")]
    InvalidTimeout(String),

    #[error("invalid log format '{0}', expected 'text' or 'json'")]
    InvalidLogFormat(String),
}

/// Settings for one server process
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub path: PathBuf,
    pub color: bool,
    pub progress: bool,
    pub strict_names: bool,
    pub overwrite: bool,
    pub remove_partial: bool,
    pub timeout: Option<Duration>,
    pub log_format: LogFormat,
    pub verbosity: u8,
}

/// Command line definition
pub fn cli() -> Command {
    Command::new("filedrop")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Receive file uploads over HTTP and save them to disk")
        .arg(
            Arg::new("listen")
                .long("listen")
                .value_name("ADDR")
                .help("The address to run the web service on")
                .default_value("0.0.0.0:8080"),
        )
        .arg(
            Arg::new("path")
                .long("path")
                .value_name("PATH")
                .help("The path files are saved to. The file name is provided by the client")
                .default_value("."),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .action(ArgAction::SetTrue)
                .help("Disable color output"),
        )
        .arg(
            Arg::new("no-progress")
                .long("no-progress")
                .action(ArgAction::SetTrue)
                .help("Disable progress bars"),
        )
        .arg(
            Arg::new("strict-names")
                .long("strict-names")
                .action(ArgAction::SetTrue)
                .help("Reject file names containing path separators or '..'"),
        )
        .arg(
            Arg::new("no-overwrite")
                .long("no-overwrite")
                .action(ArgAction::SetTrue)
                .help("Fail uploads whose destination already exists"),
        )
        .arg(
            Arg::new("remove-partial")
                .long("remove-partial")
                .action(ArgAction::SetTrue)
                .help("Delete partially written files when an upload fails"),
        )
        .arg(
            Arg::new("timeout-secs")
                .long("timeout-secs")
                .value_name("SECONDS")
                .help("Abort uploads that take longer than this (0 disables)")
                .default_value("0"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log output format: text or json")
                .default_value("text"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log verbosity"),
        )
}

impl ServerConfig {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let listen_raw = string_arg(matches, "listen");
        let listen = parse_listen(&listen_raw)?;

        let timeout_raw = string_arg(matches, "timeout-secs");
        let timeout = match timeout_raw.parse::<u64>() {
            Ok(0) => None,
            Ok(secs) => Some(Duration::from_secs(secs)),
            Err(_) => return Err(ConfigError::InvalidTimeout(timeout_raw)),
        };

        let log_format = match string_arg(matches, "log-format").as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        };

        Ok(ServerConfig {
            listen,
            path: PathBuf::from(string_arg(matches, "path")),
            color: !matches.get_flag("no-color"),
            progress: !matches.get_flag("no-progress"),
            strict_names: matches.get_flag("strict-names"),
            overwrite: !matches.get_flag("no-overwrite"),
            remove_partial: matches.get_flag("remove-partial"),
            timeout,
            log_format,
            // -v raises the level above info
            verbosity: 2 + matches.get_count("verbose"),
        })
    }

    /// Engine settings derived from this configuration
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            base_dir: self.path.clone(),
            name_policy: if self.strict_names {
                NamePolicy::Strict
            } else {
                NamePolicy::Permissive
            },
            overwrite: if self.overwrite {
                OverwritePolicy::Overwrite
            } else {
                OverwritePolicy::Reject
            },
            remove_partial: self.remove_partial,
            timeout: self.timeout,
        }
    }
}

fn string_arg(matches: &ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}

/// Accepts `host:port` as well as Go-style `:port`
fn parse_listen(raw: &str) -> Result<SocketAddr, ConfigError> {
    let candidate = if raw.starts_with(':') {
        format!("0.0.0.0{}", raw)
    } else {
        raw.to_string()
    };
    candidate
        .parse()
        .map_err(|_| ConfigError::InvalidListen(raw.to_string()))
}
