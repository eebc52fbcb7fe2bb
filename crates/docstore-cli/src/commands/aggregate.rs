//! Aggregate command implementation.

use anyhow::{Context, Result};
use clap::Args;

use docstore_core::QueryOutput;

use crate::cli::GlobalArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// Collection name
    pub collection: String,

    /// Pipeline as a JSON array of stage objects
    #[arg(long)]
    pub pipeline: String,

    /// Append a $limit stage
    #[arg(long)]
    pub limit: Option<u64>,
}

pub async fn run(args: AggregateArgs, globals: &GlobalArgs) -> Result<()> {
    let pipeline = super::parse_pipeline(&args.pipeline)?;

    let client = super::connect(globals, &args.collection).await?;
    let docs = client
        .aggregate(&args.collection, pipeline, args.limit)
        .await
        .context("Aggregation failed")?;

    output::note(&format!("{} result(s)", docs.len()));
    output::emit(&QueryOutput::Documents(docs).to_json(), globals.pretty)
}
