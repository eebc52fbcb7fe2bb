//! Read options.

use bson::{Document, doc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, InvalidInputError};

/// Conventional timestamp field used for sorted reads.
pub const TIMESTAMP_FIELD: &str = "created_at";

/// Sort direction on the timestamp field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Oldest first.
    #[serde(alias = "asc")]
    Ascending,
    /// Newest first.
    #[serde(alias = "desc")]
    Descending,
}

impl SortOrder {
    /// MongoDB sort direction (`1` or `-1`).
    pub fn direction(&self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }

    /// Sort specification on [`TIMESTAMP_FIELD`].
    pub fn to_sort_document(&self) -> Document {
        doc! { TIMESTAMP_FIELD: self.direction() }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Ascending => f.write_str("asc"),
            SortOrder::Descending => f.write_str("desc"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Ok(SortOrder::Ascending),
            "desc" | "descending" | "-1" => Ok(SortOrder::Descending),
            other => Err(InvalidInputError::Other {
                message: format!("unknown sort order '{}', expected asc or desc", other),
            }
            .into()),
        }
    }
}

/// Options for a backend `find` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Sort specification, applied before skip and limit.
    pub sort: Option<Document>,
    /// Number of matches to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_order_parsing() {
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Ascending);
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Descending);
        assert_eq!("-1".parse::<SortOrder>().unwrap(), SortOrder::Descending);
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[test]
    fn sort_document_targets_timestamp() {
        assert_eq!(
            SortOrder::Descending.to_sort_document(),
            doc! { "created_at": -1 }
        );
    }

    #[test]
    fn builder_sets_fields() {
        let opts = FindOptions::new().limit(5).skip(2).sort(doc! { "a": 1 });
        assert_eq!(opts.limit, Some(5));
        assert_eq!(opts.skip, Some(2));
        assert_eq!(opts.sort, Some(doc! { "a": 1 }));
    }
}
