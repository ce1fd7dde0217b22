//! Command-line uploader for a filedrop server

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use filedrop_client::Client;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("filedrop-send")
        .about("Upload files to a filedrop server")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("url")
                .long("url")
                .short('u')
                .value_name("URL")
                .default_value("http://127.0.0.1:8080")
                .help("Server base URL"),
        )
        .arg(
            Arg::new("raw")
                .long("raw")
                .action(ArgAction::SetTrue)
                .help("Send each file as a raw body named by X-File-Name"),
        )
        .arg(
            Arg::new("files")
                .value_name("FILE")
                .required(true)
                .num_args(1..)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Files to upload"),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let matches = cli().get_matches();
    let url = matches
        .get_one::<String>("url")
        .map(String::as_str)
        .unwrap_or("http://127.0.0.1:8080");
    let raw = matches.get_flag("raw");

    let client = Client::new(url).with_context(|| format!("invalid server URL {}", url))?;

    let mut failures = 0usize;
    for path in matches.get_many::<PathBuf>("files").into_iter().flatten() {
        let result = if raw {
            client.send_raw_file(path).await
        } else {
            client.send_file(path).await
        };

        match result {
            Ok(bytes) => info!("Sent {} ({} bytes)", path.display(), bytes),
            Err(e) => {
                error!("Failed to send {}: {}", path.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} upload(s) failed", failures);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        cli().debug_assert();
        let matches = cli()
            .try_get_matches_from(["filedrop-send", "--raw", "a.bin", "b.bin"])
            .unwrap();
        assert!(matches.get_flag("raw"));
        assert_eq!(matches.get_many::<PathBuf>("files").unwrap().count(), 2);
        assert!(cli().try_get_matches_from(["filedrop-send"]).is_err());
    }
}
