//! Error types for docstore.
//!
//! A single [`Error`] type with explicit variants for configuration, store
//! and input validation failures. Store failures carry the operation and
//! collection they happened on, so they can be logged and displayed without
//! exposing driver internals to end users.

use std::fmt;
use thiserror::Error;

/// The unified error type for docstore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid connection configuration. Fatal at construction.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A transport or driver failure while talking to the store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Input validation errors (bad URL, malformed query description).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),
}

impl Error {
    /// Returns the wrapped store error, if this is one.
    pub fn as_store(&self) -> Option<&StoreError> {
        match self {
            Error::Store(err) => Some(err),
            _ => None,
        }
    }
}

/// Connection configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Neither a client handle nor a connection URL was supplied.
    #[error("either a client handle or a connection URL must be provided")]
    MissingConnection,

    /// The connection URL was rejected by the driver.
    #[error("invalid connection URL '{value}': {reason}")]
    InvalidUrl { value: String, reason: String },

    /// A database or collection name is unusable.
    #[error("invalid name '{value}': {reason}")]
    InvalidName { value: String, reason: String },
}

/// Store operations, used to tag failures and in backend instrumentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    ListCollections,
    CreateCollection,
    DropCollection,
    Find,
    FindOne,
    Aggregate,
    Distinct,
    Upsert,
    DeleteOne,
    DeleteMany,
}

impl Operation {
    /// Stable name for logs and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::ListCollections => "list_collections",
            Operation::CreateCollection => "create_collection",
            Operation::DropCollection => "drop_collection",
            Operation::Find => "find",
            Operation::FindOne => "find_one",
            Operation::Aggregate => "aggregate",
            Operation::Distinct => "distinct",
            Operation::Upsert => "upsert",
            Operation::DeleteOne => "delete_one",
            Operation::DeleteMany => "delete_many",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Network, DNS, TLS, server selection or pool failures.
    Transport,
    /// The target collection does not exist.
    CollectionNotFound,
    /// Authentication or authorization was refused.
    Unauthorized,
    /// The server rejected the command (bad pipeline, bad operator, ...).
    Rejected,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreErrorKind::Transport => "transport failure",
            StoreErrorKind::CollectionNotFound => "collection not found",
            StoreErrorKind::Unauthorized => "not authorized",
            StoreErrorKind::Rejected => "command rejected",
        };
        f.write_str(s)
    }
}

/// A failure reported by a [`DocumentBackend`](crate::DocumentBackend).
///
/// `Display` names only the operation, collection and failure class.
/// The driver's own message is available through [`StoreError::detail`].
#[derive(Debug, Clone)]
pub struct StoreError {
    /// The operation that failed.
    pub operation: Operation,
    /// The collection the operation targeted (empty for database-level calls).
    pub collection: String,
    /// Failure class.
    pub kind: StoreErrorKind,
    detail: String,
}

impl StoreError {
    /// Create a new store error.
    pub fn new(
        operation: Operation,
        collection: impl Into<String>,
        kind: StoreErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            collection: collection.into(),
            kind,
            detail: detail.into(),
        }
    }

    /// Shorthand for a transport failure.
    pub fn transport(
        operation: Operation,
        collection: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(operation, collection, StoreErrorKind::Transport, detail)
    }

    /// The underlying driver message, for logs only.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Check if the failure was caused by a missing collection.
    pub fn is_collection_not_found(&self) -> bool {
        self.kind == StoreErrorKind::CollectionNotFound
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.operation)?;
        if !self.collection.is_empty() {
            write!(f, " on collection '{}'", self.collection)?;
        }
        write!(f, ": {}", self.kind)
    }
}

impl std::error::Error for StoreError {}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    /// Invalid database URL.
    #[error("invalid database URL '{value}': {reason}")]
    DbUrl { value: String, reason: String },

    /// Malformed query description.
    #[error("invalid query description: {reason}")]
    Query { reason: String },

    /// A document that cannot be decoded as a memory record.
    #[error("invalid memory record: {reason}")]
    Record { reason: String },

    /// An operator or stage the backend does not support.
    #[error("unsupported {kind} '{name}'")]
    Unsupported { kind: &'static str, name: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_hides_driver_detail() {
        let err = StoreError::transport(
            Operation::Aggregate,
            "orders",
            "Kind: I/O error: Connection refused (os error 111)",
        );
        let shown = Error::from(err.clone()).to_string();

        assert_eq!(
            shown,
            "store error: aggregate failed on collection 'orders': transport failure"
        );
        assert!(!shown.contains("os error"));
        assert!(err.detail().contains("Connection refused"));
    }

    #[test]
    fn store_error_without_collection() {
        let err = StoreError::transport(Operation::ListCollections, "", "timeout");
        assert_eq!(err.to_string(), "list_collections failed: transport failure");
    }

    #[test]
    fn collection_not_found_classification() {
        let err = StoreError::new(
            Operation::Upsert,
            "memory",
            StoreErrorKind::CollectionNotFound,
            "ns does not exist",
        );
        assert!(err.is_collection_not_found());
        assert!(Error::from(err).as_store().is_some());
    }
}
