//! docstore - CLI tool for document store inspection and querying.
//!
//! A thin wrapper over `docstore-core` and `docstore-mongo`: sketch
//! collection schemas for prompt context, validate and run query
//! descriptions, and manage memory records.

mod cli;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.json_logs);

    commands::handle(cli.command, &cli.globals).await
}

/// Default log directives for a `-v` count.
///
/// `-v` to `-vvv` raise only the docstore crates; the driver and its DNS
/// resolver are chatty at debug and stay at `warn` until `-vvvv`.
fn default_filter(verbosity: u8) -> String {
    let level = match verbosity {
        0 => return "warn".to_string(),
        1 => "info",
        2 => "debug",
        3 => "trace",
        _ => return "trace".to_string(),
    };
    format!(
        "warn,docstore={level},docstore_core={level},docstore_mongo={level}",
        level = level
    )
}

fn init_logging(verbosity: u8, json: bool) {
    // RUST_LOG wins over -v when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    // Logs go to stderr so stdout stays machine-readable.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_only_docstore_crates() {
        assert_eq!(default_filter(0), "warn");
        assert_eq!(
            default_filter(2),
            "warn,docstore=debug,docstore_core=debug,docstore_mongo=debug"
        );
        assert_eq!(default_filter(4), "trace");
    }

    #[test]
    fn default_filters_parse() {
        for verbosity in 0..5 {
            assert!(EnvFilter::try_new(default_filter(verbosity)).is_ok());
        }
    }
}
