//! Memory records stored by the memory-store path of the client.

use std::fmt;

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, InvalidInputError};
use crate::query::TIMESTAMP_FIELD;

pub const ID_FIELD: &str = "_id";
pub const OWNER_FIELD: &str = "user_id";
pub const CONTENT_FIELD: &str = "memory";
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Identity key of a memory record, kept as the value the store holds.
///
/// Records written by this crate use string keys; records written by other
/// tools commonly carry a driver-generated ObjectId. Filters built from a
/// `RecordId` match the stored `_id` exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordId {
    String(String),
    ObjectId(ObjectId),
}

impl RecordId {
    /// The `_id` value as stored.
    pub fn to_bson(&self) -> Bson {
        match self {
            RecordId::String(id) => Bson::String(id.clone()),
            RecordId::ObjectId(oid) => Bson::ObjectId(*oid),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::String(id) => f.write_str(id),
            RecordId::ObjectId(oid) => write!(f, "ObjectId({})", oid.to_hex()),
        }
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::String(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::String(id.to_string())
    }
}

impl From<&String> for RecordId {
    fn from(id: &String) -> Self {
        RecordId::String(id.clone())
    }
}

impl From<ObjectId> for RecordId {
    fn from(oid: ObjectId) -> Self {
        RecordId::ObjectId(oid)
    }
}

impl From<&RecordId> for RecordId {
    fn from(id: &RecordId) -> Self {
        id.clone()
    }
}

impl PartialEq<&str> for RecordId {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, RecordId::String(id) if id == other)
    }
}

/// A memory entry: an identity key plus an `{owner, content}` payload.
///
/// Stored as `{ _id, user_id, memory, created_at, updated_at }`. Timestamps
/// are maintained by [`DocumentStoreClient::upsert`](crate::DocumentStoreClient::upsert)
/// and are `None` on records that have not been read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    /// Identity key.
    pub id: RecordId,
    /// Owning user, if any.
    pub owner_id: Option<String>,
    /// Opaque payload.
    pub content: Document,
    /// When the record was first inserted.
    pub created_at: Option<DateTime<Utc>>,
    /// When the record was last written.
    pub updated_at: Option<DateTime<Utc>>,
}

impl MemoryRecord {
    /// Create a record with a fresh random identity.
    pub fn new(owner_id: Option<impl Into<String>>, content: Document) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), owner_id, content)
    }

    /// Create a record with an explicit identity.
    pub fn with_id(
        id: impl Into<RecordId>,
        owner_id: Option<impl Into<String>>,
        content: Document,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.map(Into::into),
            content,
            created_at: None,
            updated_at: None,
        }
    }

    /// Filter selecting this record by identity.
    pub fn identity_filter(&self) -> Document {
        identity_filter(&self.id)
    }

    /// Update document for an upsert written at `now`.
    ///
    /// The payload and `updated_at` are always set; `created_at` is set only
    /// when the upsert inserts.
    pub fn to_update(&self, now: DateTime<Utc>) -> Document {
        let now = bson::DateTime::from_chrono(now);
        let owner = match &self.owner_id {
            Some(owner) => Bson::String(owner.clone()),
            None => Bson::Null,
        };
        doc! {
            "$set": {
                OWNER_FIELD: owner,
                CONTENT_FIELD: self.content.clone(),
                UPDATED_AT_FIELD: now,
            },
            "$setOnInsert": {
                TIMESTAMP_FIELD: now,
            },
        }
    }

    /// Decode a stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if `_id` is missing or not a string/ObjectId, if
    /// `user_id` is neither a string nor null, or if `memory` is not a document.
    pub fn from_document(doc: &Document) -> Result<Self, Error> {
        let id = match doc.get(ID_FIELD) {
            Some(Bson::String(id)) => RecordId::String(id.clone()),
            Some(Bson::ObjectId(oid)) => RecordId::ObjectId(*oid),
            Some(_) => return Err(invalid("'_id' must be a string or ObjectId")),
            None => return Err(invalid("missing '_id'")),
        };

        let owner_id = match doc.get(OWNER_FIELD) {
            Some(Bson::String(owner)) => Some(owner.clone()),
            None | Some(Bson::Null) => None,
            Some(_) => return Err(invalid("'user_id' must be a string")),
        };

        let content = match doc.get(CONTENT_FIELD) {
            Some(Bson::Document(content)) => content.clone(),
            Some(_) => return Err(invalid("'memory' must be a document")),
            None => return Err(invalid("missing 'memory'")),
        };

        Ok(Self {
            id,
            owner_id,
            content,
            created_at: timestamp(doc, TIMESTAMP_FIELD),
            updated_at: timestamp(doc, UPDATED_AT_FIELD),
        })
    }
}

/// Filter selecting a record by identity.
pub fn identity_filter(id: &RecordId) -> Document {
    doc! { ID_FIELD: id.to_bson() }
}

fn timestamp(doc: &Document, key: &str) -> Option<DateTime<Utc>> {
    match doc.get(key) {
        Some(Bson::DateTime(dt)) => Some(dt.to_chrono()),
        _ => None,
    }
}

fn invalid(reason: &str) -> Error {
    InvalidInputError::Record {
        reason: reason.to_string(),
    }
    .into()
}
