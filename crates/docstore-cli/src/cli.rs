//! CLI argument definitions.

use clap::{Args, Parser};

use crate::commands::Commands;

/// Document store CLI for schema sketches, query descriptions and memories.
#[derive(Parser, Debug)]
#[command(name = "docstore")]
#[command(author, version = env!("DOCSTORE_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(flatten)]
    pub globals: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// MongoDB connection URL (overrides DOCSTORE_MONGODB_URL and the config file)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Database name (overrides DOCSTORE_DATABASE and the config file)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,
}
