//! Collection reference type.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConfigurationError, Error};

/// Default database name for the memory store.
pub const DEFAULT_DATABASE: &str = "memory_db";

/// Default collection name for the memory store.
pub const DEFAULT_COLLECTION: &str = "memory";

/// A (database, collection) pair.
///
/// Resolved lazily against the connection: constructing one never touches
/// the server.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionRef {
    database: String,
    collection: String,
}

impl CollectionRef {
    /// Create a new collection reference, validating both names.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError::InvalidName`] for empty names, names
    /// containing NUL, a database name containing `/\. "$`, or a collection
    /// name containing `$` or starting with `system.`.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Result<Self, Error> {
        let database = database.into();
        let collection = collection.into();
        validate_database_name(&database)?;
        validate_collection_name(&collection)?;
        Ok(Self {
            database,
            collection,
        })
    }

    /// Returns the database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the `database.collection` namespace string.
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }
}

impl Default for CollectionRef {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

fn invalid(value: &str, reason: &str) -> Error {
    ConfigurationError::InvalidName {
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

pub(crate) fn validate_database_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(invalid(name, "database name must not be empty"));
    }
    if name.contains(['/', '\\', '.', ' ', '"', '$', '\0']) {
        return Err(invalid(name, "database name contains a reserved character"));
    }
    Ok(())
}

pub(crate) fn validate_collection_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(invalid(name, "collection name must not be empty"));
    }
    if name.contains(['$', '\0']) {
        return Err(invalid(name, "collection name contains a reserved character"));
    }
    if name.starts_with("system.") {
        return Err(invalid(name, "the system. prefix is reserved"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reference() {
        let coll = CollectionRef::default();
        assert_eq!(coll.database(), "memory_db");
        assert_eq!(coll.collection(), "memory");
        assert_eq!(coll.namespace(), "memory_db.memory");
    }

    #[test]
    fn valid_names() {
        let coll = CollectionRef::new("sales", "sf_anomalies_dashboard").unwrap();
        assert_eq!(coll.to_string(), "sales.sf_anomalies_dashboard");
    }

    #[test]
    fn dotted_collection_names_are_allowed() {
        assert!(CollectionRef::new("app", "events.2024").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(CollectionRef::new("", "memory").is_err());
        assert!(CollectionRef::new("my.db", "memory").is_err());
        assert!(CollectionRef::new("memory_db", "").is_err());
        assert!(CollectionRef::new("memory_db", "bad$name").is_err());
        assert!(CollectionRef::new("memory_db", "system.users").is_err());
    }
}
