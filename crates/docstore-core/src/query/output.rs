//! Query results.

use bson::{Bson, Document};
use serde_json::Value;

/// The result of executing a [`QueryDescription`](super::QueryDescription).
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Documents from `find` or `aggregate`.
    Documents(Vec<Document>),
    /// Values from `distinct`.
    Values(Vec<Bson>),
}

impl QueryOutput {
    /// Number of result entries.
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Documents(docs) => docs.len(),
            QueryOutput::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render as a JSON array in relaxed extended JSON.
    pub fn to_json(&self) -> Value {
        match self {
            QueryOutput::Documents(docs) => Value::Array(
                docs.iter()
                    .map(|d| Bson::Document(d.clone()).into_relaxed_extjson())
                    .collect(),
            ),
            QueryOutput::Values(values) => Value::Array(
                values
                    .iter()
                    .map(|v| v.clone().into_relaxed_extjson())
                    .collect(),
            ),
        }
    }
}
