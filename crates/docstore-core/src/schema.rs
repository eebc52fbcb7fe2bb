//! Best-effort schema sketches for prompt context.
//!
//! A sketch is derived from a single sampled document. It says nothing about
//! fields the sample lacks, and nothing about type consistency across
//! documents.

use bson::{Bson, Document};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument};

use crate::client::log_failure;
use crate::traits::DocumentBackend;

/// Coarse runtime type of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Null,
    Bool,
    Int,
    Float,
    String,
    Datetime,
    Array,
    Object,
}

impl TypeTag {
    /// Classify a BSON value.
    ///
    /// Identifier-like and opaque types (ObjectId, binary, regex, code,
    /// symbols, min/max keys) are reported as `string`.
    pub fn of(value: &Bson) -> Self {
        match value {
            Bson::Null | Bson::Undefined => TypeTag::Null,
            Bson::Boolean(_) => TypeTag::Bool,
            Bson::Int32(_) | Bson::Int64(_) => TypeTag::Int,
            Bson::Double(_) | Bson::Decimal128(_) => TypeTag::Float,
            Bson::DateTime(_) | Bson::Timestamp(_) => TypeTag::Datetime,
            Bson::Array(_) => TypeTag::Array,
            Bson::Document(_) => TypeTag::Object,
            _ => TypeTag::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Null => "null",
            TypeTag::Bool => "bool",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::String => "string",
            TypeTag::Datetime => "datetime",
            TypeTag::Array => "array",
            TypeTag::Object => "object",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field name → type tag, in the sampled document's field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSketch {
    fields: Vec<(String, TypeTag)>,
}

impl SchemaSketch {
    /// Sketch the top-level fields of one document.
    pub fn from_document(doc: &Document) -> Self {
        Self {
            fields: doc
                .iter()
                .map(|(name, value)| (name.clone(), TypeTag::of(value)))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<TypeTag> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, tag)| *tag)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TypeTag)> {
        self.fields.iter().map(|(name, tag)| (name.as_str(), *tag))
    }

    /// Render as a JSON object, field → tag.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(name, tag)| (name.clone(), Value::String(tag.as_str().to_string())))
                .collect(),
        )
    }
}

impl Serialize for SchemaSketch {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, tag) in &self.fields {
            map.serialize_entry(name, tag)?;
        }
        map.end()
    }
}

/// Sketches for several collections, in the order they were requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCatalog {
    collections: Vec<(String, SchemaSketch)>,
}

impl SchemaCatalog {
    pub fn insert(&mut self, collection: impl Into<String>, sketch: SchemaSketch) {
        let collection = collection.into();
        match self.collections.iter_mut().find(|(name, _)| *name == collection) {
            Some((_, existing)) => *existing = sketch,
            None => self.collections.push((collection, sketch)),
        }
    }

    pub fn get(&self, collection: &str) -> Option<&SchemaSketch> {
        self.collections
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, sketch)| sketch)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaSketch)> {
        self.collections
            .iter()
            .map(|(name, sketch)| (name.as_str(), sketch))
    }

    /// Text for inclusion as advisory context in a query-generation prompt.
    pub fn to_prompt_context(&self) -> String {
        let schema = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("Use this as the database schema: {}", schema)
    }
}

impl Serialize for SchemaCatalog {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.collections.len()))?;
        for (name, sketch) in &self.collections {
            map.serialize_entry(name, sketch)?;
        }
        map.end()
    }
}

/// Derives schema sketches from sample documents.
#[derive(Debug)]
pub struct SchemaInspector<'a, B> {
    backend: &'a B,
}

impl<'a, B: DocumentBackend> SchemaInspector<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Sketch a collection from one of its documents.
    ///
    /// An empty collection, a missing collection and a failed read all
    /// produce an empty sketch.
    #[instrument(skip(self))]
    pub async fn describe_collection(&self, name: &str) -> SchemaSketch {
        match self.backend.find_one(name, Document::new()).await {
            Ok(Some(doc)) => {
                let sketch = SchemaSketch::from_document(&doc);
                debug!(fields = sketch.len(), "Sketched collection");
                sketch
            }
            Ok(None) => {
                debug!("Collection is empty");
                SchemaSketch::default()
            }
            Err(err) => {
                log_failure("describe_collection", name, &err);
                SchemaSketch::default()
            }
        }
    }

    /// Sketch several collections, one sample each.
    pub async fn describe_collections<I, S>(&self, names: I) -> SchemaCatalog
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut catalog = SchemaCatalog::default();
        for name in names {
            let name = name.as_ref();
            let sketch = self.describe_collection(name).await;
            catalog.insert(name, sketch);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use bson::oid::ObjectId;
    use serde_json::json;

    #[test]
    fn tags_cover_sales_document() {
        let sample = doc! {
            "_id": ObjectId::new(),
            "OrderDate": bson::DateTime::now(),
            "ProductID": 1042_i32,
            "ArticleTypeID": 7_i64,
            "product_name": "Linen Shirt",
            "TotalCostPrice": 18.5,
            "returned": false,
            "tags": ["summer"],
            "dims": { "w": 1 },
            "note": null,
        };
        let sketch = SchemaSketch::from_document(&sample);

        assert_eq!(sketch.get("_id"), Some(TypeTag::String));
        assert_eq!(sketch.get("OrderDate"), Some(TypeTag::Datetime));
        assert_eq!(sketch.get("ProductID"), Some(TypeTag::Int));
        assert_eq!(sketch.get("ArticleTypeID"), Some(TypeTag::Int));
        assert_eq!(sketch.get("product_name"), Some(TypeTag::String));
        assert_eq!(sketch.get("TotalCostPrice"), Some(TypeTag::Float));
        assert_eq!(sketch.get("returned"), Some(TypeTag::Bool));
        assert_eq!(sketch.get("tags"), Some(TypeTag::Array));
        assert_eq!(sketch.get("dims"), Some(TypeTag::Object));
        assert_eq!(sketch.get("note"), Some(TypeTag::Null));
        assert_eq!(sketch.get("missing"), None);
    }

    #[test]
    fn nested_fields_are_not_flattened() {
        let sketch = SchemaSketch::from_document(&doc! { "a": { "b": 1 } });
        assert_eq!(sketch.len(), 1);
        assert_eq!(sketch.get("a.b"), None);
    }

    #[test]
    fn serializes_in_field_order() {
        let sketch = SchemaSketch::from_document(&doc! { "z": 1, "a": "x" });
        assert_eq!(
            serde_json::to_string(&sketch).unwrap(),
            r#"{"z":"int","a":"string"}"#
        );
        assert_eq!(sketch.to_json(), json!({ "z": "int", "a": "string" }));
    }

    #[test]
    fn catalog_prompt_context() {
        let mut catalog = SchemaCatalog::default();
        catalog.insert("orders", SchemaSketch::from_document(&doc! { "qty": 1 }));
        catalog.insert("empty", SchemaSketch::default());

        assert_eq!(
            catalog.to_prompt_context(),
            r#"Use this as the database schema: {"orders":{"qty":"int"},"empty":{}}"#
        );
    }

    #[test]
    fn catalog_insert_replaces_existing() {
        let mut catalog = SchemaCatalog::default();
        catalog.insert("orders", SchemaSketch::default());
        catalog.insert("orders", SchemaSketch::from_document(&doc! { "qty": 1 }));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("orders").unwrap().len(), 1);
    }
}
