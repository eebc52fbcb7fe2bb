//! docstore-core - Document store access layer.
//!
//! A minimal surface over a document database collection: bounded reads,
//! aggregation and distinct queries, keyed upserts with a bounded retry, and
//! best-effort schema sketches for use as prompt context by an external
//! natural-language-to-query translator.
//!
//! Backends implement [`DocumentBackend`]; the policy layer is
//! [`DocumentStoreClient`].

pub mod client;
pub mod error;
pub mod query;
pub mod record;
pub mod retry;
pub mod schema;
pub mod traits;
pub mod types;

pub use bson;

pub use client::DocumentStoreClient;
pub use error::{
    ConfigurationError, Error, InvalidInputError, Operation, StoreError, StoreErrorKind,
};
pub use query::{FindOptions, QueryDescription, QueryOutput, SortOrder, TIMESTAMP_FIELD};
pub use record::{MemoryRecord, RecordId};
pub use retry::{RecoveryAction, RetryPolicy};
pub use schema::{SchemaCatalog, SchemaInspector, SchemaSketch, TypeTag};
pub use traits::DocumentBackend;
pub use types::{CollectionRef, DbUrl, DEFAULT_COLLECTION, DEFAULT_DATABASE};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
