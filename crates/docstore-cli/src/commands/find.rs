//! Find command implementation.

use anyhow::Result;
use bson::Document;
use clap::Args;

use docstore_core::{QueryOutput, SortOrder};

use crate::cli::GlobalArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct FindArgs {
    /// Collection name
    pub collection: String,

    /// Filter as a JSON object
    #[arg(long)]
    pub filter: Option<String>,

    /// Maximum number of documents to return
    #[arg(long)]
    pub limit: Option<u64>,

    /// Sort by created_at (asc or desc)
    #[arg(long)]
    pub sort: Option<SortOrder>,
}

pub async fn run(args: FindArgs, globals: &GlobalArgs) -> Result<()> {
    let filter = match &args.filter {
        Some(text) => super::parse_document(text, "Filter")?,
        None => Document::new(),
    };

    let client = super::connect(globals, &args.collection).await?;
    let docs = client
        .find(&args.collection, filter, args.limit, args.sort)
        .await;

    if docs.is_empty() {
        output::note("No documents found.");
    }
    output::emit(&QueryOutput::Documents(docs).to_json(), globals.pretty)
}
