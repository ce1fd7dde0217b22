//! Tracing setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

/// Initialize the global subscriber.
///
/// * `verbosity` - 0=error, 1=warn, 2=info, 3=debug, 4+=trace
/// * `color` - ANSI colors for text output
///
/// `RUST_LOG` overrides the level when set.
pub fn init_logging(verbosity: u8, format: LogFormat, color: bool) -> anyhow::Result<()> {
    let level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "filedrop={},filedrop_server={},filedrop_engine={},filedrop_core={}",
            level, level, level, level
        ))
    });

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_ansi(color)
                    .with_target(verbosity >= 3)
                    .with_file(verbosity >= 4)
                    .with_line_number(verbosity >= 4),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()?,
    }

    Ok(())
}
