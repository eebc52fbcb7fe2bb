//! Subcommand implementations.

mod aggregate;
mod config;
mod describe;
mod distinct;
mod find;
mod memory;
mod query;

use anyhow::{Context, Result, anyhow};
use bson::{Bson, Document};
use clap::Subcommand;
use serde_json::Value;
use tracing::debug;

use docstore_core::{ConfigurationError, DocumentStoreClient, Error};
use docstore_mongo::MongoBackend;

use crate::cli::GlobalArgs;
use crate::config as settings;

const NO_URL_HINT: &str = "No connection URL. Pass --url, set DOCSTORE_MONGODB_URL, \
     or run 'docstore config set --url <URL>'";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sketch collection schemas for use as prompt context
    Describe(describe::DescribeArgs),

    /// Validate and run a query description
    Query(query::QueryArgs),

    /// Find documents in a collection
    Find(find::FindArgs),

    /// Run an aggregation pipeline
    Aggregate(aggregate::AggregateArgs),

    /// List the distinct values of a field
    Distinct(distinct::DistinctArgs),

    /// Memory record operations
    Memory(memory::MemoryCommand),

    /// Show or change stored connection defaults
    Config(config::ConfigCommand),
}

pub async fn handle(command: Commands, globals: &GlobalArgs) -> Result<()> {
    match command {
        Commands::Describe(args) => describe::run(args, globals).await,
        Commands::Query(args) => query::run(args, globals).await,
        Commands::Find(args) => find::run(args, globals).await,
        Commands::Aggregate(args) => aggregate::run(args, globals).await,
        Commands::Distinct(args) => distinct::run(args, globals).await,
        Commands::Memory(cmd) => memory::handle(cmd, globals).await,
        Commands::Config(cmd) => config::handle(cmd, globals),
    }
}

/// Connect using the resolved settings and bind a client to `collection`.
pub async fn connect(
    globals: &GlobalArgs,
    collection: &str,
) -> Result<DocumentStoreClient<MongoBackend>> {
    let settings = settings::resolve(globals)?;

    let backend = MongoBackend::connect(settings.connection_config())
        .await
        .map_err(|err| match err {
            Error::Configuration(ConfigurationError::MissingConnection) => {
                anyhow!(err).context(NO_URL_HINT)
            }
            other => anyhow!(other).context("Failed to connect"),
        })?;

    let client =
        DocumentStoreClient::new(backend, collection).context("Invalid collection name")?;
    debug!(collection = %client.collection(), "Connected");
    Ok(client)
}

/// Parse a JSON object (extended JSON allowed) into a document.
pub fn parse_document(text: &str, what: &str) -> Result<Document> {
    let value: Value =
        serde_json::from_str(text).with_context(|| format!("{} is not valid JSON", what))?;
    match Bson::try_from(value).with_context(|| format!("{} is not valid extended JSON", what))? {
        Bson::Document(doc) => Ok(doc),
        _ => Err(anyhow!("{} must be a JSON object", what)),
    }
}

/// Parse a JSON array of objects into an aggregation pipeline.
pub fn parse_pipeline(text: &str) -> Result<Vec<Document>> {
    let value: Value = serde_json::from_str(text).context("Pipeline is not valid JSON")?;
    let Value::Array(stages) = value else {
        return Err(anyhow!("Pipeline must be a JSON array of stages"));
    };

    stages
        .into_iter()
        .enumerate()
        .map(|(i, stage)| parse_document(&stage.to_string(), &format!("Pipeline stage {}", i)))
        .collect()
}
