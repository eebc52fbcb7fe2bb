//! Describe command implementation.

use anyhow::{Context, Result};
use clap::Args;

use docstore_core::{DEFAULT_COLLECTION, DocumentBackend};

use crate::cli::GlobalArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Collections to describe (defaults to every collection in the database)
    pub collections: Vec<String>,

    /// Print the text to include in a query-generation prompt instead of JSON
    #[arg(long)]
    pub prompt: bool,
}

pub async fn run(args: DescribeArgs, globals: &GlobalArgs) -> Result<()> {
    let client = super::connect(globals, DEFAULT_COLLECTION).await?;

    let collections = if args.collections.is_empty() {
        let mut names = client
            .backend()
            .list_collection_names()
            .await
            .context("Failed to list collections")?;
        names.sort();
        names
    } else {
        args.collections
    };

    if collections.is_empty() {
        output::note("No collections found.");
    }

    let catalog = client
        .schema_inspector()
        .describe_collections(&collections)
        .await;

    for (name, sketch) in catalog.iter() {
        if sketch.is_empty() {
            output::note(&format!("'{}' is empty or unreadable; no fields sketched", name));
        }
    }

    if args.prompt {
        println!("{}", catalog.to_prompt_context());
        Ok(())
    } else {
        output::emit(&catalog, globals.pretty)
    }
}
