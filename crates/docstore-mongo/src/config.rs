//! Connection configuration.

use mongodb::Client;
use mongodb::options::ConnectionString;

use docstore_core::{DEFAULT_DATABASE, DbUrl};

/// Where a [`MongoBackend`](crate::MongoBackend) gets its connection from.
///
/// An explicit client handle takes precedence over a URL. The database is,
/// in order: the one set with [`with_database`](Self::with_database), the
/// default database in the URL path, then `memory_db`.
///
/// # Example
///
/// ```
/// use docstore_core::DbUrl;
/// use docstore_mongo::ConnectionConfig;
///
/// let url = DbUrl::new("mongodb://localhost:27017/sales").unwrap();
/// let config = ConnectionConfig::new().with_url(url);
/// assert_eq!(config.database(), "sales");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    client: Option<Client>,
    url: Option<DbUrl>,
    database: Option<String>,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing driver handle. Its connection pool is shared.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_url(mut self, url: DbUrl) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    pub fn url(&self) -> Option<&DbUrl> {
        self.url.as_ref()
    }

    /// The database name this configuration resolves to.
    pub fn database(&self) -> String {
        if let Some(database) = &self.database {
            return database.clone();
        }
        self.url
            .as_ref()
            .and_then(url_database)
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string())
    }

    pub(crate) fn into_parts(self) -> (Option<Client>, Option<DbUrl>, String) {
        let database = self.database();
        (self.client, self.url, database)
    }
}

/// The default database named in `url`, decoded the way the driver reads it.
///
/// Returns `None` if the URL has no database path or the driver rejects it.
pub fn url_database(url: &DbUrl) -> Option<String> {
    ConnectionString::parse(url.as_str()).ok()?.default_database
}
