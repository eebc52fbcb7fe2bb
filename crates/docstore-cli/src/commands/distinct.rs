//! Distinct command implementation.

use anyhow::{Context, Result};
use clap::Args;

use docstore_core::QueryOutput;

use crate::cli::GlobalArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct DistinctArgs {
    /// Collection name
    pub collection: String,

    /// Field name (dotted paths allowed)
    pub field: String,
}

pub async fn run(args: DistinctArgs, globals: &GlobalArgs) -> Result<()> {
    let client = super::connect(globals, &args.collection).await?;
    let values = client
        .distinct_values(&args.collection, &args.field)
        .await
        .context("Distinct query failed")?;

    output::emit(&QueryOutput::Values(values).to_json(), globals.pretty)
}
