//! Memory record subcommands.

use anyhow::{Context, Result, bail};
use bson::Bson;
use bson::oid::ObjectId;
use chrono::SecondsFormat;
use clap::{Args, Subcommand};
use serde_json::{Value, json};

use docstore_core::{DEFAULT_COLLECTION, MemoryRecord, RecordId, SortOrder};

use crate::cli::GlobalArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct MemoryCommand {
    /// Collection holding memory records
    #[arg(long, global = true, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    #[command(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand, Debug)]
pub enum MemorySubcommand {
    /// List memory records, newest first
    List {
        /// Only records owned by this user
        #[arg(long)]
        user: Option<String>,

        /// Maximum number of records to return
        #[arg(long)]
        limit: Option<u64>,

        /// Sort by created_at (asc or desc)
        #[arg(long)]
        sort: Option<SortOrder>,
    },

    /// Insert or replace a memory record
    Upsert {
        /// Memory payload as a JSON object
        memory: String,

        /// Record id (a random one is generated if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Owning user
        #[arg(long)]
        user: Option<String>,
    },

    /// Delete a memory record
    Delete {
        /// Record id
        id: String,

        /// Treat the id as a hex ObjectId
        #[arg(long)]
        object_id: bool,
    },

    /// Check whether a memory record exists
    Exists {
        /// Record id
        id: String,

        /// Treat the id as a hex ObjectId
        #[arg(long)]
        object_id: bool,
    },

    /// Delete every record in the collection
    Clear,

    /// Drop the collection
    Drop,

    /// Check whether the collection exists
    TableExists,
}

fn record_id(id: String, object_id: bool) -> Result<RecordId> {
    if !object_id {
        return Ok(RecordId::String(id));
    }
    let oid = ObjectId::parse_str(&id).with_context(|| format!("'{}' is not a hex ObjectId", id))?;
    Ok(RecordId::ObjectId(oid))
}

fn record_json(record: &MemoryRecord) -> Value {
    json!({
        "id": record.id.to_bson().into_relaxed_extjson(),
        "user_id": record.owner_id,
        "memory": Bson::Document(record.content.clone()).into_relaxed_extjson(),
        // Stored dates have millisecond precision
        "created_at": record.created_at.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        "updated_at": record.updated_at.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
    })
}

pub async fn handle(cmd: MemoryCommand, globals: &GlobalArgs) -> Result<()> {
    let client = super::connect(globals, &cmd.collection).await?;
    let collection = cmd.collection.as_str();

    match cmd.command {
        MemorySubcommand::List { user, limit, sort } => {
            let records = client.read_memories(user.as_deref(), limit, sort).await;
            if records.is_empty() {
                output::note("No memories found.");
            }
            let values: Vec<Value> = records.iter().map(record_json).collect();
            output::emit(&values, globals.pretty)
        }
        MemorySubcommand::Upsert { memory, id, user } => {
            let content = super::parse_document(&memory, "Memory")?;
            let record = match id {
                Some(id) => MemoryRecord::with_id(id, user, content),
                None => MemoryRecord::new(user, content),
            };
            client
                .upsert(&record)
                .await
                .context("Failed to upsert memory")?;
            output::success(&format!("Upserted memory {}", record.id));
            output::emit(
                &json!({ "id": record.id.to_bson().into_relaxed_extjson() }),
                globals.pretty,
            )
        }
        MemorySubcommand::Delete { id, object_id } => {
            let id = record_id(id, object_id)?;
            client.delete(&id).await;
            output::success(&format!("Deleted memory {}", id));
            Ok(())
        }
        MemorySubcommand::Exists { id, object_id } => {
            let id = record_id(id, object_id)?;
            let exists = client.memory_exists(&id).await;
            output::emit(&exists, globals.pretty)
        }
        MemorySubcommand::Clear => {
            if !client.clear_all(collection).await {
                bail!("Failed to clear collection '{}'", collection);
            }
            output::success(&format!("Cleared collection '{}'", collection));
            Ok(())
        }
        MemorySubcommand::Drop => {
            client.drop_collection(collection).await;
            output::success(&format!("Dropped collection '{}'", collection));
            Ok(())
        }
        MemorySubcommand::TableExists => {
            let exists = client.collection_exists(collection).await;
            output::emit(&exists, globals.pretty)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_parses_object_ids_on_request() {
        let hex = "65f1a2b3c4d5e6f708192a3b";
        assert_eq!(
            record_id(hex.to_string(), false).unwrap(),
            RecordId::String(hex.to_string())
        );
        assert_eq!(
            record_id(hex.to_string(), true).unwrap(),
            RecordId::ObjectId(ObjectId::parse_str(hex).unwrap())
        );
        assert!(record_id("m1".to_string(), true).is_err());
    }

    #[test]
    fn record_json_writes_object_ids_as_extended_json() {
        let oid = ObjectId::parse_str("65f1a2b3c4d5e6f708192a3b").unwrap();
        let record = MemoryRecord::with_id(oid, Some("alice"), bson::doc! {});
        let value = record_json(&record);
        assert_eq!(value["id"], json!({ "$oid": "65f1a2b3c4d5e6f708192a3b" }));
        assert_eq!(value["created_at"], Value::Null);
    }

    #[test]
    fn record_json_writes_millisecond_utc_timestamps() {
        use chrono::TimeZone;

        let mut record = MemoryRecord::with_id("m1", None::<String>, bson::doc! {});
        record.created_at = Some(chrono::Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap());
        let value = record_json(&record);
        assert_eq!(value["created_at"], json!("2024-09-01T08:00:00.000Z"));
    }
}
