//! Store client with an explicit per-operation failure policy.

use bson::{Bson, Document, doc};
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Error;
use crate::query::{FindOptions, QueryDescription, QueryOutput, SortOrder};
use crate::record::{MemoryRecord, OWNER_FIELD, RecordId, identity_filter};
use crate::retry::{RecoveryAction, RetryPolicy};
use crate::schema::SchemaInspector;
use crate::traits::DocumentBackend;
use crate::types::CollectionRef;
use crate::Result;

/// Log a failed store call with enough context to diagnose it.
pub(crate) fn log_failure(operation: &str, collection: &str, err: &Error) {
    match err {
        Error::Store(store) => error!(
            operation,
            collection,
            kind = %store.kind,
            detail = store.detail(),
            "Store operation failed"
        ),
        other => error!(operation, collection, error = %other, "Store operation failed"),
    }
}

/// A client over one document database, bound to a default collection.
///
/// Failure handling is part of each method's signature:
///
/// | method | on failure |
/// |---|---|
/// | [`find`](Self::find), [`read_memories`](Self::read_memories) | logged, empty `Vec` |
/// | [`collection_exists`](Self::collection_exists), [`memory_exists`](Self::memory_exists), [`clear_all`](Self::clear_all) | logged, `false` |
/// | [`delete`](Self::delete), [`drop_collection`](Self::drop_collection) | logged, ignored |
/// | [`ensure_collection_exists`](Self::ensure_collection_exists), [`aggregate`](Self::aggregate), [`distinct_values`](Self::distinct_values) | logged, `Err` |
/// | [`upsert`](Self::upsert) | logged, retried per [`RetryPolicy`], then `Err` |
///
/// # Example
///
/// ```
/// use bson::doc;
/// use docstore_core::{DocumentStoreClient, MemoryRecord};
/// use docstore_memory::InMemoryBackend;
///
/// # async fn example() -> docstore_core::Result<()> {
/// let client = DocumentStoreClient::new(InMemoryBackend::new("memory_db"), "memory")?;
///
/// client.upsert(&MemoryRecord::with_id("m1", Some("alice"), doc! { "likes": "tea" })).await?;
///
/// let memories = client.read_memories(Some("alice"), Some(10), None).await;
/// assert_eq!(memories.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DocumentStoreClient<B> {
    backend: B,
    collection: CollectionRef,
    retry: RetryPolicy,
}

impl<B: DocumentBackend> DocumentStoreClient<B> {
    /// Create a client over `backend`, bound to `collection` in the
    /// backend's database.
    pub fn new(backend: B, collection: impl Into<String>) -> Result<Self> {
        let collection = CollectionRef::new(backend.database(), collection)?;
        Ok(Self {
            backend,
            collection,
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy used by [`upsert`](Self::upsert).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the bound (database, collection) pair.
    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// A schema inspector sharing this client's connection.
    pub fn schema_inspector(&self) -> SchemaInspector<'_, B> {
        SchemaInspector::new(&self.backend)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Create `name` if it does not exist yet.
    ///
    /// Failures are logged and returned: a silent failure here would only
    /// resurface as a confusing write failure later.
    #[instrument(skip(self), fields(database = %self.collection.database()))]
    pub async fn ensure_collection_exists(&self, name: &str) -> Result<()> {
        let result = async {
            let names = self.backend.list_collection_names().await?;
            if !names.iter().any(|n| n == name) {
                debug!("Creating collection");
                self.backend.create_collection(name).await?;
            }
            Ok::<_, Error>(())
        }
        .await;

        if let Err(ref err) = result {
            log_failure("ensure_collection_exists", name, err);
        }
        result
    }

    /// Check whether `name` exists. Returns `false` if the check fails.
    #[instrument(skip(self), fields(database = %self.collection.database()))]
    pub async fn collection_exists(&self, name: &str) -> bool {
        match self.backend.list_collection_names().await {
            Ok(names) => names.iter().any(|n| n == name),
            Err(err) => {
                log_failure("collection_exists", name, &err);
                false
            }
        }
    }

    /// Drop `name` if it exists. Missing collections and failures are not
    /// reported.
    #[instrument(skip(self), fields(database = %self.collection.database()))]
    pub async fn drop_collection(&self, name: &str) {
        let result = async {
            let names = self.backend.list_collection_names().await?;
            if names.iter().any(|n| n == name) {
                debug!("Dropping collection");
                self.backend.drop_collection(name).await?;
            }
            Ok::<_, Error>(())
        }
        .await;

        if let Err(err) = result {
            log_failure("drop_collection", name, &err);
        }
    }

    /// Delete every document in `name`. Returns `false` if the delete fails.
    #[instrument(skip(self), fields(database = %self.collection.database()))]
    pub async fn clear_all(&self, name: &str) -> bool {
        match self.backend.delete_many(name, Document::new()).await {
            Ok(deleted) => {
                debug!(deleted, "Cleared collection");
                true
            }
            Err(err) => {
                log_failure("clear_all", name, &err);
                false
            }
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Find documents in `collection` matching `filter`.
    ///
    /// No sort is applied unless `sort` is given, in which case documents are
    /// ordered by `created_at`. A `limit` of zero returns nothing. Failures are
    /// logged and produce an empty result.
    #[instrument(skip(self, filter))]
    pub async fn find(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<u64>,
        sort: Option<SortOrder>,
    ) -> Vec<Document> {
        if limit == Some(0) {
            return Vec::new();
        }

        let mut options = FindOptions::new();
        if let Some(sort) = sort {
            options = options.sort(sort.to_sort_document());
        }
        if let Some(limit) = limit {
            options = options.limit(limit);
        }

        match self.backend.find(collection, filter, options).await {
            Ok(docs) => {
                debug!(count = docs.len(), "Found documents");
                docs
            }
            Err(err) => {
                log_failure("find", collection, &err);
                Vec::new()
            }
        }
    }

    /// Read memory records from the bound collection, newest first unless
    /// `sort` says otherwise.
    ///
    /// Documents that do not decode as memory records are skipped.
    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn read_memories(
        &self,
        owner_id: Option<&str>,
        limit: Option<u64>,
        sort: Option<SortOrder>,
    ) -> Vec<MemoryRecord> {
        let filter = match owner_id {
            Some(owner) => doc! { OWNER_FIELD: owner },
            None => Document::new(),
        };
        let sort = sort.unwrap_or(SortOrder::Descending);

        self.find(self.collection.collection(), filter, limit, Some(sort))
            .await
            .iter()
            .filter_map(|doc| match MemoryRecord::from_document(doc) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(error = %err, "Skipping undecodable memory document");
                    None
                }
            })
            .collect()
    }

    /// Check whether a memory record with `id` exists. Returns `false` if the
    /// check fails.
    #[instrument(skip(self, id), fields(collection = %self.collection))]
    pub async fn memory_exists(&self, id: impl Into<RecordId>) -> bool {
        let name = self.collection.collection();
        match self.backend.find_one(name, identity_filter(&id.into())).await {
            Ok(found) => found.is_some(),
            Err(err) => {
                log_failure("memory_exists", name, &err);
                false
            }
        }
    }

    /// Run `pipeline` against `collection`.
    ///
    /// With a `limit`, a `$limit` stage is appended; the given stages are
    /// never reordered. A `limit` of zero returns nothing. Failures are
    /// returned, since an empty result must stay distinguishable from a
    /// failed query.
    #[instrument(skip(self, pipeline), fields(stages = pipeline.len()))]
    pub async fn aggregate(
        &self,
        collection: &str,
        mut pipeline: Vec<Document>,
        limit: Option<u64>,
    ) -> Result<Vec<Document>> {
        if let Some(limit) = limit {
            if limit == 0 {
                return Ok(Vec::new());
            }
            pipeline.push(doc! { "$limit": i64::try_from(limit).unwrap_or(i64::MAX) });
        }

        match self.backend.aggregate(collection, pipeline).await {
            Ok(docs) => {
                debug!(count = docs.len(), "Aggregated documents");
                Ok(docs)
            }
            Err(err) => {
                log_failure("aggregate", collection, &err);
                Err(err)
            }
        }
    }

    /// Distinct values of `field` across `collection`. Failures are returned.
    #[instrument(skip(self))]
    pub async fn distinct_values(&self, collection: &str, field: &str) -> Result<Vec<Bson>> {
        match self.backend.distinct(collection, field, Document::new()).await {
            Ok(values) => {
                debug!(count = values.len(), "Fetched distinct values");
                Ok(values)
            }
            Err(err) => {
                log_failure("distinct", collection, &err);
                Err(err)
            }
        }
    }

    /// Execute a query description by dispatching to [`find`](Self::find),
    /// [`aggregate`](Self::aggregate) or [`distinct_values`](Self::distinct_values).
    #[instrument(skip(self, query), fields(kind = query.kind(), collection = query.collection()))]
    pub async fn execute(&self, query: &QueryDescription) -> Result<QueryOutput> {
        match query {
            QueryDescription::Find {
                collection,
                filter,
                limit,
            } => Ok(QueryOutput::Documents(
                self.find(collection, filter.clone(), *limit, None).await,
            )),
            QueryDescription::Aggregate {
                collection,
                pipeline,
                limit,
            } => self
                .aggregate(collection, pipeline.clone(), *limit)
                .await
                .map(QueryOutput::Documents),
            QueryDescription::Distinct { collection, field } => self
                .distinct_values(collection, field)
                .await
                .map(QueryOutput::Values),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert or replace a memory record, keyed on its identity.
    ///
    /// On a store failure the retry policy's recovery action runs (by default
    /// creating the collection) and the upsert is attempted again, up to
    /// `max_attempts` in total. The last failure is returned.
    #[instrument(skip(self, record), fields(collection = %self.collection, id = %record.id))]
    pub async fn upsert(&self, record: &MemoryRecord) -> Result<()> {
        let name = self.collection.collection();
        let mut attempt = 1;

        loop {
            let update = record.to_update(Utc::now());
            let result = self
                .backend
                .upsert_one(name, record.identity_filter(), update)
                .await;

            let err = match result {
                Ok(()) => {
                    debug!(attempt, "Upserted memory");
                    return Ok(());
                }
                Err(err) => err,
            };

            log_failure("upsert", name, &err);
            if !self.retry.should_retry(attempt, &err) {
                return Err(err);
            }

            if self.retry.recovery == RecoveryAction::EnsureCollectionExists {
                info!("Creating collection for future transactions");
                self.ensure_collection_exists(name).await?;
            }
            attempt += 1;
        }
    }

    /// Delete the memory record with `id`. Failures are logged only.
    #[instrument(skip(self, id), fields(collection = %self.collection))]
    pub async fn delete(&self, id: impl Into<RecordId>) {
        let name = self.collection.collection();
        let id = id.into();
        match self.backend.delete_one(name, identity_filter(&id)).await {
            Ok(deleted) => debug!(deleted, id = %id, "Deleted memory"),
            Err(err) => log_failure("delete", name, &err),
        }
    }
}
