//! MongoDB backend.

use async_trait::async_trait;
use bson::{Bson, Document};
use futures_util::TryStreamExt;
use mongodb::error::ErrorKind;
use mongodb::{Client, Collection, Database};
use tracing::{debug, instrument};

use docstore_core::error::{ConfigurationError, Operation};
use docstore_core::{DocumentBackend, FindOptions, Result};

use crate::config::ConnectionConfig;
use crate::error::{NAMESPACE_EXISTS, server_code, store_error};

/// A document backend over one MongoDB database.
///
/// Holds a single driver handle for its lifetime; the driver pools
/// connections internally. Clones share the pool.
#[derive(Debug, Clone)]
pub struct MongoBackend {
    client: Client,
    db: Database,
}

impl MongoBackend {
    /// Build a backend from `config`.
    ///
    /// A client handle in `config` is used as is. Otherwise the URL is
    /// handed to the driver, which validates it and, for `mongodb+srv`
    /// URLs, resolves the seed list. No server round trip happens here.
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::MissingConnection`] if `config` has neither a
    ///   handle nor a URL.
    /// - [`ConfigurationError::InvalidUrl`] if the driver rejects the URL.
    /// - A transport [`StoreError`](docstore_core::StoreError) if seed list
    ///   resolution fails.
    #[instrument(skip(config), fields(database = %config.database()))]
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        let (client, url, database) = config.into_parts();

        let client = match (client, url) {
            (Some(client), _) => {
                debug!("Using supplied client handle");
                client
            }
            (None, Some(url)) => {
                debug!(url = %url, "Connecting");
                Client::with_uri_str(url.as_str()).await.map_err(|err| {
                    match err.kind.as_ref() {
                        ErrorKind::InvalidArgument { .. } => ConfigurationError::InvalidUrl {
                            value: url.to_string(),
                            reason: err.to_string(),
                        }
                        .into(),
                        _ => store_error(Operation::Connect, "", err),
                    }
                })?
            }
            (None, None) => return Err(ConfigurationError::MissingConnection.into()),
        };

        let db = client.database(&database);
        Ok(Self { client, db })
    }

    /// The underlying driver handle.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

#[async_trait]
impl DocumentBackend for MongoBackend {
    fn database(&self) -> &str {
        self.db.name()
    }

    #[instrument(skip(self), fields(database = self.db.name()))]
    async fn list_collection_names(&self) -> Result<Vec<String>> {
        self.db
            .list_collection_names()
            .await
            .map_err(|e| store_error(Operation::ListCollections, "", e))
    }

    #[instrument(skip(self), fields(database = self.db.name()))]
    async fn create_collection(&self, name: &str) -> Result<()> {
        match self.db.create_collection(name).await {
            Ok(()) => {
                debug!("Created collection");
                Ok(())
            }
            Err(err) if server_code(&err) == Some(NAMESPACE_EXISTS) => {
                debug!("Collection already exists");
                Ok(())
            }
            Err(err) => Err(store_error(Operation::CreateCollection, name, err)),
        }
    }

    #[instrument(skip(self), fields(database = self.db.name()))]
    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.collection(name)
            .drop()
            .await
            .map_err(|e| store_error(Operation::DropCollection, name, e))
    }

    #[instrument(skip(self, filter, options))]
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        debug!(filter = %filter, "Finding documents");

        let coll = self.collection(collection);
        let mut action = coll.find(filter);
        if let Some(sort) = options.sort {
            action = action.sort(sort);
        }
        if let Some(skip) = options.skip {
            action = action.skip(skip);
        }
        if let Some(limit) = options.limit {
            action = action.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let cursor = action
            .await
            .map_err(|e| store_error(Operation::Find, collection, e))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| store_error(Operation::Find, collection, e))
    }

    #[instrument(skip(self, filter))]
    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        self.collection(collection)
            .find_one(filter)
            .await
            .map_err(|e| store_error(Operation::FindOne, collection, e))
    }

    #[instrument(skip(self, pipeline), fields(stages = pipeline.len()))]
    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let cursor = self
            .collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| store_error(Operation::Aggregate, collection, e))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| store_error(Operation::Aggregate, collection, e))
    }

    #[instrument(skip(self, filter))]
    async fn distinct(&self, collection: &str, field: &str, filter: Document) -> Result<Vec<Bson>> {
        self.collection(collection)
            .distinct(field, filter)
            .await
            .map_err(|e| store_error(Operation::Distinct, collection, e))
    }

    #[instrument(skip(self, filter, update))]
    async fn upsert_one(&self, collection: &str, filter: Document, update: Document) -> Result<()> {
        let result = self
            .collection(collection)
            .update_one(filter, update)
            .upsert(true)
            .await
            .map_err(|e| store_error(Operation::Upsert, collection, e))?;
        debug!(
            matched = result.matched_count,
            inserted = result.upserted_id.is_some(),
            "Upserted document"
        );
        Ok(())
    }

    #[instrument(skip(self, filter))]
    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64> {
        self.collection(collection)
            .delete_one(filter)
            .await
            .map(|r| r.deleted_count)
            .map_err(|e| store_error(Operation::DeleteOne, collection, e))
    }

    #[instrument(skip(self, filter))]
    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        self.collection(collection)
            .delete_many(filter)
            .await
            .map(|r| r.deleted_count)
            .map_err(|e| store_error(Operation::DeleteMany, collection, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::{DbUrl, Error};

    #[tokio::test]
    async fn connect_requires_handle_or_url() {
        let err = MongoBackend::connect(ConnectionConfig::new()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::MissingConnection)
        ));
    }

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        let url = DbUrl::new("mongodb://localhost:notaport").unwrap();
        let err = MongoBackend::connect(ConnectionConfig::new().with_url(url))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn connect_is_lazy() {
        // Nothing listens on port 1; construction must still succeed.
        let url = DbUrl::new("mongodb://127.0.0.1:1/sales").unwrap();
        let backend = MongoBackend::connect(ConnectionConfig::new().with_url(url))
            .await
            .unwrap();
        assert_eq!(backend.database(), "sales");
    }

    #[tokio::test]
    async fn supplied_handle_takes_precedence() {
        let client = Client::with_uri_str("mongodb://127.0.0.1:1").await.unwrap();
        let config = ConnectionConfig::new()
            .with_client(client)
            .with_url(DbUrl::new("mongodb://localhost:notaport").unwrap())
            .with_database("reports");

        let backend = MongoBackend::connect(config).await.unwrap();
        assert_eq!(backend.database(), "reports");
    }
}
