//! Query descriptions produced by an external natural-language translator.

use bson::{Bson, Document};
use serde_json::{Map, Value, json};
use std::str::FromStr;

use crate::error::{Error, InvalidInputError};
use crate::types::validate_collection_name;

const COLLECTION_KEY: &str = "collection_name";
const FILTER_KEY: &str = "query";
const PIPELINE_KEY: &str = "pipeline";
const DISTINCT_KEY: &str = "distinct";
const LIMIT_KEY: &str = "limit";

/// A structured query with exactly one active variant.
///
/// The wire format is a JSON object carrying `collection_name` and exactly one
/// of `query` (a filter object), `pipeline` (an array of stage objects) or
/// `distinct` (a field name), plus an optional `limit`. Values are read as
/// MongoDB extended JSON, so `{"$date": "2024-09-01T00:00:00Z"}` becomes a
/// datetime.
///
/// # Example
///
/// ```
/// use docstore_core::QueryDescription;
///
/// let query: QueryDescription = r#"{
///     "collection_name": "sf_anomalies_dashboard",
///     "pipeline": [
///         {"$group": {"_id": "$product_name", "qty": {"$sum": "$TotalQty"}}},
///         {"$sort": {"qty": -1}}
///     ],
///     "limit": 10
/// }"#.parse().unwrap();
///
/// assert_eq!(query.collection(), "sf_anomalies_dashboard");
/// assert_eq!(query.limit(), Some(10));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum QueryDescription {
    /// A filter predicate for `find`.
    Find {
        collection: String,
        filter: Document,
        limit: Option<u64>,
    },
    /// An ordered aggregation pipeline.
    Aggregate {
        collection: String,
        pipeline: Vec<Document>,
        limit: Option<u64>,
    },
    /// The distinct values of one field.
    Distinct { collection: String, field: String },
}

impl QueryDescription {
    /// Returns the target collection name.
    pub fn collection(&self) -> &str {
        match self {
            QueryDescription::Find { collection, .. }
            | QueryDescription::Aggregate { collection, .. }
            | QueryDescription::Distinct { collection, .. } => collection,
        }
    }

    /// Returns the result limit, if any.
    pub fn limit(&self) -> Option<u64> {
        match self {
            QueryDescription::Find { limit, .. } | QueryDescription::Aggregate { limit, .. } => {
                *limit
            }
            QueryDescription::Distinct { .. } => None,
        }
    }

    /// Short name of the active variant.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryDescription::Find { .. } => "find",
            QueryDescription::Aggregate { .. } => "aggregate",
            QueryDescription::Distinct { .. } => "distinct",
        }
    }

    /// Parse a query description from text.
    ///
    /// Model output is often wrapped in a Markdown code fence; the fence is
    /// stripped before parsing.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let body = strip_code_fence(input);
        let value: Value = serde_json::from_str(body).map_err(|e| invalid(e.to_string()))?;
        Self::from_json(value)
    }

    /// Build a query description from a JSON value in wire format.
    pub fn from_json(value: Value) -> Result<Self, Error> {
        let Value::Object(mut obj) = value else {
            return Err(invalid("expected a JSON object"));
        };

        let collection = match obj.remove(COLLECTION_KEY) {
            Some(Value::String(name)) => name,
            Some(_) => return Err(invalid("'collection_name' must be a string")),
            None => return Err(invalid("missing 'collection_name'")),
        };
        validate_collection_name(&collection)
            .map_err(|e| invalid(format!("bad collection_name: {}", e)))?;

        let limit = match obj.remove(LIMIT_KEY) {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .ok_or_else(|| invalid("'limit' must be a non-negative integer"))?,
            ),
        };

        let filter = take_present(&mut obj, FILTER_KEY);
        let pipeline = take_present(&mut obj, PIPELINE_KEY);
        let distinct = take_present(&mut obj, DISTINCT_KEY);

        let populated = [&filter, &pipeline, &distinct]
            .iter()
            .filter(|v| v.is_some())
            .count();
        if populated != 1 {
            return Err(invalid(format!(
                "exactly one of 'query', 'pipeline' or 'distinct' must be present, found {}",
                populated
            )));
        }

        if let Some(filter) = filter {
            return Ok(QueryDescription::Find {
                collection,
                filter: to_document(filter, FILTER_KEY)?,
                limit,
            });
        }

        if let Some(pipeline) = pipeline {
            let Value::Array(stages) = pipeline else {
                return Err(invalid("'pipeline' must be an array of stages"));
            };
            let pipeline = stages
                .into_iter()
                .map(|stage| to_document(stage, "pipeline stage"))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(QueryDescription::Aggregate {
                collection,
                pipeline,
                limit,
            });
        }

        let field = match distinct {
            Some(Value::String(field)) if !field.is_empty() => field,
            _ => return Err(invalid("'distinct' must be a non-empty field name")),
        };
        if limit.is_some() {
            return Err(invalid("'limit' is not supported for distinct queries"));
        }

        Ok(QueryDescription::Distinct { collection, field })
    }

    /// Render back to wire format (relaxed extended JSON).
    pub fn to_json(&self) -> Value {
        let mut value = match self {
            QueryDescription::Find {
                collection, filter, ..
            } => json!({
                COLLECTION_KEY: collection,
                FILTER_KEY: Bson::Document(filter.clone()).into_relaxed_extjson(),
            }),
            QueryDescription::Aggregate {
                collection,
                pipeline,
                ..
            } => json!({
                COLLECTION_KEY: collection,
                PIPELINE_KEY: pipeline
                    .iter()
                    .map(|stage| Bson::Document(stage.clone()).into_relaxed_extjson())
                    .collect::<Vec<_>>(),
            }),
            QueryDescription::Distinct { collection, field } => json!({
                COLLECTION_KEY: collection,
                DISTINCT_KEY: field,
            }),
        };

        if let (Some(limit), Some(obj)) = (self.limit(), value.as_object_mut()) {
            obj.insert(LIMIT_KEY.to_string(), json!(limit));
        }

        value
    }
}

impl FromStr for QueryDescription {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    InvalidInputError::Query {
        reason: reason.into(),
    }
    .into()
}

/// Remove a key, treating an explicit `null` as absent.
fn take_present(obj: &mut Map<String, Value>, key: &str) -> Option<Value> {
    obj.remove(key).filter(|v| !v.is_null())
}

fn to_document(value: Value, what: &str) -> Result<Document, Error> {
    if !value.is_object() {
        return Err(invalid(format!("{} must be a JSON object", what)));
    }
    match Bson::try_from(value) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(_) => Err(invalid(format!("{} must be a document", what))),
        Err(e) => Err(invalid(format!("{}: {}", what, e))),
    }
}

/// Strip a surrounding Markdown code fence (with optional language tag).
fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parses_find() {
        let q = QueryDescription::parse(
            r#"{"collection_name": "orders", "query": {"TotalQty": {"$gt": 5}}, "limit": 3}"#,
        )
        .unwrap();

        assert_eq!(
            q,
            QueryDescription::Find {
                collection: "orders".to_string(),
                filter: doc! { "TotalQty": { "$gt": 5 } },
                limit: Some(3),
            }
        );
        assert_eq!(q.kind(), "find");
    }

    #[test]
    fn parses_pipeline_in_order() {
        let q = QueryDescription::parse(
            r#"{"collection_name": "orders", "pipeline": [{"$match": {"a": 1}}, {"$sort": {"b": -1}}]}"#,
        )
        .unwrap();

        let QueryDescription::Aggregate { pipeline, limit, .. } = q else {
            panic!("expected aggregate");
        };
        assert_eq!(pipeline.len(), 2);
        assert!(pipeline[0].contains_key("$match"));
        assert!(pipeline[1].contains_key("$sort"));
        assert_eq!(limit, None);
    }

    #[test]
    fn parses_distinct() {
        let q =
            QueryDescription::parse(r#"{"collection_name": "orders", "distinct": "subcategory"}"#)
                .unwrap();
        assert_eq!(
            q,
            QueryDescription::Distinct {
                collection: "orders".to_string(),
                field: "subcategory".to_string(),
            }
        );
    }

    #[test]
    fn reads_extended_json_dates() {
        let q = QueryDescription::parse(
            r#"{"collection_name": "orders", "query": {"OrderDate": {"$gte": {"$date": "2024-09-01T00:00:00Z"}}}}"#,
        )
        .unwrap();

        let QueryDescription::Find { filter, .. } = q else {
            panic!("expected find");
        };
        let bound = filter
            .get_document("OrderDate")
            .unwrap()
            .get("$gte")
            .unwrap();
        assert!(matches!(bound, Bson::DateTime(_)));
    }

    #[test]
    fn strips_markdown_fence() {
        let text = "```json\n{\"collection_name\": \"orders\", \"distinct\": \"AgeGroupName\"}\n```\n";
        let q = QueryDescription::parse(text).unwrap();
        assert_eq!(q.collection(), "orders");
    }

    #[test]
    fn rejects_multiple_variants() {
        let err = QueryDescription::parse(
            r#"{"collection_name": "orders", "query": {}, "distinct": "a"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn rejects_no_variant() {
        assert!(QueryDescription::parse(r#"{"collection_name": "orders"}"#).is_err());
        assert!(
            QueryDescription::parse(r#"{"collection_name": "orders", "query": null}"#).is_err()
        );
    }

    #[test]
    fn rejects_missing_collection() {
        assert!(QueryDescription::parse(r#"{"query": {}}"#).is_err());
        assert!(QueryDescription::parse(r#"{"collection_name": 3, "query": {}}"#).is_err());
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(QueryDescription::parse(r#"{"collection_name": "o", "query": []}"#).is_err());
        assert!(QueryDescription::parse(r#"{"collection_name": "o", "pipeline": {}}"#).is_err());
        assert!(QueryDescription::parse(r#"{"collection_name": "o", "pipeline": [1]}"#).is_err());
        assert!(QueryDescription::parse(r#"{"collection_name": "o", "distinct": ""}"#).is_err());
        assert!(
            QueryDescription::parse(r#"{"collection_name": "o", "query": {}, "limit": -1}"#)
                .is_err()
        );
        assert!(
            QueryDescription::parse(r#"{"collection_name": "o", "distinct": "a", "limit": 2}"#)
                .is_err()
        );
    }

    #[test]
    fn ignores_unknown_keys() {
        let q = QueryDescription::parse(
            r#"{"collection_name": "o", "query": {}, "explanation": "all orders"}"#,
        )
        .unwrap();
        assert_eq!(q.kind(), "find");
    }

    #[test]
    fn renders_wire_format() {
        let q = QueryDescription::Aggregate {
            collection: "orders".to_string(),
            pipeline: vec![doc! { "$match": { "a": 1 } }],
            limit: Some(3),
        };
        assert_eq!(
            q.to_json(),
            json!({
                "collection_name": "orders",
                "pipeline": [{"$match": {"a": 1}}],
                "limit": 3
            })
        );
    }
}
