//! Query command implementation.

use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use docstore_core::QueryDescription;

use crate::cli::GlobalArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Query description as JSON, or '-' to read it from stdin
    #[arg(conflicts_with = "file")]
    pub query: Option<String>,

    /// Read the query description from a file
    #[arg(long, short)]
    pub file: Option<PathBuf>,

    /// Validate and print the query without connecting
    #[arg(long)]
    pub dry_run: bool,
}

fn read_input(args: &QueryArgs, stdin_is_terminal: bool) -> Result<String> {
    match (&args.query, &args.file) {
        (Some(text), _) if text != "-" => Ok(text.clone()),
        (_, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        // An explicit '-' still reads a terminal; a bare `docstore query` does not.
        (None, None) if stdin_is_terminal => {
            bail!("No query description given. Pass JSON, --file, or pipe it to stdin")
        }
        _ => io::read_to_string(io::stdin()).context("Failed to read stdin"),
    }
}

pub async fn run(args: QueryArgs, globals: &GlobalArgs) -> Result<()> {
    let input = read_input(&args, io::stdin().is_terminal())?;
    if input.trim().is_empty() {
        bail!("No query description given");
    }

    let query = QueryDescription::parse(&input).context("Invalid query description")?;

    if args.dry_run {
        output::success(&format!(
            "Valid {} query on '{}'",
            query.kind(),
            query.collection()
        ));
        return output::emit(&query.to_json(), globals.pretty);
    }

    let client = super::connect(globals, query.collection()).await?;
    let result = client
        .execute(&query)
        .await
        .with_context(|| format!("Failed to run {} query", query.kind()))?;

    output::note(&format!("{} result(s)", result.len()));
    output::emit(&result.to_json(), globals.pretty)
}
