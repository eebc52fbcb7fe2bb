//! In-process document store with fault injection.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bson::{Bson, Document};
use tracing::{debug, instrument};

use docstore_core::error::{Operation, StoreError, StoreErrorKind};
use docstore_core::{DEFAULT_DATABASE, DocumentBackend, FindOptions, Result};

use crate::evaluator::{matches, resolve, sort_documents, values_equal};
use crate::pipeline::{apply_update, run, seed_from_filter};

type Collections = BTreeMap<String, Vec<Document>>;

#[derive(Debug, Default)]
struct Faults {
    pending: HashMap<Operation, VecDeque<StoreErrorKind>>,
    calls: HashMap<Operation, u32>,
}

#[derive(Debug)]
struct Inner {
    database: String,
    collections: RwLock<Collections>,
    faults: Mutex<Faults>,
    offline: AtomicBool,
    strict: AtomicBool,
}

/// A document store held in memory.
///
/// Clones share the same data. Besides implementing [`DocumentBackend`],
/// it can be told to fail: [`fail_next`](Self::fail_next) queues failures
/// for a given operation, [`set_offline`](Self::set_offline) fails every
/// call, and [`require_existing_collections`](Self::require_existing_collections)
/// makes writes to a missing collection fail the way a server with implicit
/// creation disabled would.
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE)
    }
}

impl InMemoryBackend {
    /// Create an empty store bound to `database`.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                database: database.into(),
                collections: RwLock::new(BTreeMap::new()),
                faults: Mutex::new(Faults::default()),
                offline: AtomicBool::new(false),
                strict: AtomicBool::new(false),
            }),
        }
    }

    /// Add documents to `collection`, creating it if needed. Bypasses fault
    /// injection and call counting.
    pub fn with_documents(self, collection: &str, docs: impl IntoIterator<Item = Document>) -> Self {
        self.write()
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
        self
    }

    /// Snapshot of a collection's documents, in natural order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.read().get(collection).cloned().unwrap_or_default()
    }

    /// Check whether a collection exists, without counting a call.
    pub fn has_collection(&self, collection: &str) -> bool {
        self.read().contains_key(collection)
    }

    /// Queue a failure of `kind` for the next call to `operation`.
    pub fn fail_next(&self, operation: Operation, kind: StoreErrorKind) {
        self.faults()
            .pending
            .entry(operation)
            .or_default()
            .push_back(kind);
    }

    /// Fail every call with a transport error while `offline`.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Reject writes to collections that do not exist yet.
    pub fn require_existing_collections(&self, strict: bool) {
        self.inner.strict.store(strict, Ordering::SeqCst);
    }

    /// Number of calls made to `operation`, including failed ones.
    pub fn calls(&self, operation: Operation) -> u32 {
        self.faults().calls.get(&operation).copied().unwrap_or(0)
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.inner
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.inner
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.inner
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and fire any injected failure.
    fn begin(&self, operation: Operation, collection: &str) -> Result<()> {
        let mut faults = self.faults();
        *faults.calls.entry(operation).or_default() += 1;

        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StoreError::transport(operation, collection, "connection refused").into());
        }
        if let Some(kind) = faults
            .pending
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            debug!(%operation, %kind, "Injecting failure");
            return Err(StoreError::new(operation, collection, kind, "injected failure").into());
        }
        Ok(())
    }

    fn missing_collection(operation: Operation, collection: &str) -> StoreError {
        StoreError::new(
            operation,
            collection,
            StoreErrorKind::CollectionNotFound,
            format!("ns does not exist: {}", collection),
        )
    }

    /// Matching documents, in natural order.
    fn select(&self, collection: &str, filter: &Document) -> Result<Vec<Document>> {
        let collections = self.read();
        let mut out = Vec::new();
        for doc in collections.get(collection).into_iter().flatten() {
            if matches(doc, filter)? {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DocumentBackend for InMemoryBackend {
    fn database(&self) -> &str {
        &self.inner.database
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        self.begin(Operation::ListCollections, "")?;
        Ok(self.read().keys().cloned().collect())
    }

    #[instrument(skip(self))]
    async fn create_collection(&self, name: &str) -> Result<()> {
        self.begin(Operation::CreateCollection, name)?;
        self.write().entry(name.to_string()).or_default();
        debug!("Created collection");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.begin(Operation::DropCollection, name)?;
        let existed = self.write().remove(name).is_some();
        debug!(existed, "Dropped collection");
        Ok(())
    }

    #[instrument(skip(self, filter, options))]
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        self.begin(Operation::Find, collection)?;
        let mut docs = self.select(collection, &filter)?;

        if let Some(sort) = &options.sort {
            sort_documents(&mut docs, sort)?;
        }
        let skip = options.skip.map_or(0, |s| usize::try_from(s).unwrap_or(usize::MAX));
        let limit = options.limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        Ok(docs.into_iter().skip(skip).take(limit).collect())
    }

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        self.begin(Operation::FindOne, collection)?;
        let collections = self.read();
        for doc in collections.get(collection).into_iter().flatten() {
            if matches(doc, &filter)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    #[instrument(skip(self, pipeline), fields(stages = pipeline.len()))]
    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        self.begin(Operation::Aggregate, collection)?;
        let docs = self.documents(collection);
        run(docs, &pipeline)
    }

    async fn distinct(&self, collection: &str, field: &str, filter: Document) -> Result<Vec<Bson>> {
        self.begin(Operation::Distinct, collection)?;
        let mut values: Vec<Bson> = Vec::new();
        for doc in self.select(collection, &filter)? {
            for found in resolve(&doc, field) {
                let items = match found {
                    Bson::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                for item in items {
                    if !values.iter().any(|v| values_equal(v, &item)) {
                        values.push(item);
                    }
                }
            }
        }
        Ok(values)
    }

    #[instrument(skip(self, filter, update))]
    async fn upsert_one(&self, collection: &str, filter: Document, update: Document) -> Result<()> {
        self.begin(Operation::Upsert, collection)?;
        let strict = self.inner.strict.load(Ordering::SeqCst);

        let mut collections = self.write();
        if strict && !collections.contains_key(collection) {
            return Err(Self::missing_collection(Operation::Upsert, collection).into());
        }
        let docs = collections.entry(collection.to_string()).or_default();

        let mut target = None;
        for (idx, doc) in docs.iter().enumerate() {
            if matches(doc, &filter)? {
                target = Some(idx);
                break;
            }
        }

        match target {
            Some(idx) => {
                let mut updated = docs[idx].clone();
                apply_update(&mut updated, &update, false)?;
                docs[idx] = updated;
                debug!("Updated document");
            }
            None => {
                let mut inserted = seed_from_filter(&filter);
                apply_update(&mut inserted, &update, true)?;
                docs.push(inserted);
                debug!("Inserted document");
            }
        }
        Ok(())
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64> {
        self.begin(Operation::DeleteOne, collection)?;
        let mut collections = self.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut target = None;
        for (idx, doc) in docs.iter().enumerate() {
            if matches(doc, &filter)? {
                target = Some(idx);
                break;
            }
        }
        Ok(match target {
            Some(idx) => {
                docs.remove(idx);
                1
            }
            None => 0,
        })
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        self.begin(Operation::DeleteMany, collection)?;
        let mut collections = self.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut doomed = Vec::with_capacity(docs.len());
        for doc in docs.iter() {
            doomed.push(matches(doc, &filter)?);
        }

        let before = docs.len();
        let mut doomed = doomed.into_iter();
        docs.retain(|_| !doomed.next().unwrap_or(false));
        Ok((before - docs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn orders() -> InMemoryBackend {
        InMemoryBackend::new("shop").with_documents(
            "orders",
            (1..=4).map(|i| {
                let sku = if i % 2 == 0 { "even" } else { "odd" };
                doc! { "_id": i, "qty": i * 10, "sku": sku }
            }),
        )
    }

    #[tokio::test]
    async fn find_applies_sort_skip_and_limit() {
        let store = orders();
        let options = FindOptions::new()
            .sort(doc! { "qty": -1 })
            .skip(1)
            .limit(2);
        let docs = store.find("orders", doc! {}, options).await.unwrap();

        let ids: Vec<i32> = docs.iter().map(|d| d.get_i32("_id").unwrap()).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[tokio::test]
    async fn reads_from_missing_collection_are_empty() {
        let store = InMemoryBackend::default();
        assert_eq!(store.database(), "memory_db");
        assert!(store.find("nope", doc! {}, FindOptions::new()).await.unwrap().is_empty());
        assert!(store.find_one("nope", doc! {}).await.unwrap().is_none());
        assert_eq!(store.delete_many("nope", doc! {}).await.unwrap(), 0);
        assert!(!store.has_collection("nope"));
    }

    #[tokio::test]
    async fn distinct_flattens_arrays_and_dedupes() {
        let store = InMemoryBackend::new("shop").with_documents(
            "items",
            vec![
                doc! { "tags": ["a", "b"] },
                doc! { "tags": "b" },
                doc! { "tags": ["c"] },
                doc! { "other": 1 },
            ],
        );
        let values = store.distinct("items", "tags", doc! {}).await.unwrap();
        assert_eq!(values, vec![Bson::from("a"), Bson::from("b"), Bson::from("c")]);
    }

    #[tokio::test]
    async fn upsert_inserts_then_updates() {
        let store = InMemoryBackend::default();
        let update = doc! { "$set": { "memory": "tea" }, "$setOnInsert": { "created_at": 1 } };
        store.upsert_one("memory", doc! { "_id": "m1" }, update).await.unwrap();

        let update = doc! { "$set": { "memory": "coffee" }, "$setOnInsert": { "created_at": 2 } };
        store.upsert_one("memory", doc! { "_id": "m1" }, update).await.unwrap();

        assert_eq!(
            store.documents("memory"),
            vec![doc! { "_id": "m1", "memory": "coffee", "created_at": 1 }]
        );
    }

    #[tokio::test]
    async fn strict_mode_rejects_writes_to_missing_collections() {
        let store = InMemoryBackend::default();
        store.require_existing_collections(true);

        let err = store
            .upsert_one("memory", doc! { "_id": "m1" }, doc! { "$set": { "a": 1 } })
            .await
            .unwrap_err();
        assert!(err.as_store().unwrap().is_collection_not_found());

        store.create_collection("memory").await.unwrap();
        store
            .upsert_one("memory", doc! { "_id": "m1" }, doc! { "$set": { "a": 1 } })
            .await
            .unwrap();
        assert_eq!(store.calls(Operation::Upsert), 2);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = orders();
        store.fail_next(Operation::Find, StoreErrorKind::Transport);
        store.fail_next(Operation::Find, StoreErrorKind::Unauthorized);

        let first = store.find("orders", doc! {}, FindOptions::new()).await.unwrap_err();
        assert_eq!(first.as_store().unwrap().kind, StoreErrorKind::Transport);
        let second = store.find("orders", doc! {}, FindOptions::new()).await.unwrap_err();
        assert_eq!(second.as_store().unwrap().kind, StoreErrorKind::Unauthorized);
        assert_eq!(store.find("orders", doc! {}, FindOptions::new()).await.unwrap().len(), 4);
        assert_eq!(store.calls(Operation::Find), 3);
    }

    #[tokio::test]
    async fn offline_fails_everything() {
        let store = orders();
        store.set_offline(true);

        assert!(store.list_collection_names().await.is_err());
        let err = store.aggregate("orders", vec![]).await.unwrap_err();
        assert_eq!(err.as_store().unwrap().operation, Operation::Aggregate);

        store.set_offline(false);
        assert_eq!(store.list_collection_names().await.unwrap(), vec!["orders"]);
    }

    #[tokio::test]
    async fn clones_share_data() {
        let store = InMemoryBackend::default();
        let other = store.clone();
        store.create_collection("memory").await.unwrap();
        assert!(other.has_collection("memory"));
    }

    #[tokio::test]
    async fn delete_one_removes_first_match() {
        let store = orders();
        assert_eq!(store.delete_one("orders", doc! { "sku": "even" }).await.unwrap(), 1);
        assert_eq!(store.delete_many("orders", doc! { "sku": "odd" }).await.unwrap(), 2);
        assert_eq!(store.documents("orders"), vec![doc! { "_id": 4, "qty": 40, "sku": "even" }]);
    }
}
