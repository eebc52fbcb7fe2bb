//! Document backend trait.

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::Result;
use crate::query::FindOptions;

/// A document database backend.
///
/// Each method is a one-to-one passthrough onto a native driver call and
/// carries no failure policy of its own: every failure is returned as an
/// [`Error::Store`](crate::Error::Store) tagged with the operation and
/// collection. Policy (fail-soft, retry, propagate) lives in
/// [`DocumentStoreClient`](crate::DocumentStoreClient).
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Returns the name of the database this backend is bound to.
    fn database(&self) -> &str;

    /// List the names of all collections in the database.
    async fn list_collection_names(&self) -> Result<Vec<String>>;

    /// Create a collection. Creating an existing collection succeeds.
    async fn create_collection(&self, name: &str) -> Result<()>;

    /// Drop a collection. Dropping a missing collection succeeds.
    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Find all documents matching `filter`.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>>;

    /// Find the first document matching `filter`, in natural order.
    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>>;

    /// Run an aggregation pipeline. Stages execute in the given order.
    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>)
    -> Result<Vec<Document>>;

    /// Return the distinct values of `field` across documents matching `filter`.
    async fn distinct(&self, collection: &str, field: &str, filter: Document)
    -> Result<Vec<Bson>>;

    /// Apply `update` to the first document matching `filter`, inserting one
    /// if nothing matches.
    async fn upsert_one(&self, collection: &str, filter: Document, update: Document)
    -> Result<()>;

    /// Delete the first document matching `filter`. Returns the number deleted.
    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64>;

    /// Delete every document matching `filter`. Returns the number deleted.
    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64>;
}
