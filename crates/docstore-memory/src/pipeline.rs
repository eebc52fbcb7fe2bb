//! Aggregation pipeline stages and update operators.

use bson::{Bson, Document, oid::ObjectId};

use docstore_core::Result;

use crate::evaluator::{
    as_f64, compare, first_value, invalid, matches, remove_path, resolve, set_path,
    sort_documents, unsupported, values_equal,
};

/// Run `pipeline` over `docs`, stage by stage.
pub(crate) fn run(mut docs: Vec<Document>, pipeline: &[Document]) -> Result<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(invalid("each pipeline stage must have exactly one key"));
        };

        docs = match name.as_str() {
            "$match" => {
                let filter = stage_document(name, spec)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$sort" => {
                sort_documents(&mut docs, stage_document(name, spec)?)?;
                docs
            }
            "$limit" => {
                let n = stage_count(name, spec)?;
                if n == 0 {
                    return Err(invalid("$limit must be positive"));
                }
                docs.into_iter().take(n).collect()
            }
            "$skip" => {
                let n = stage_count(name, spec)?;
                docs.into_iter().skip(n).collect()
            }
            "$project" => {
                let spec = stage_document(name, spec)?;
                docs.iter()
                    .map(|doc| project(doc, spec))
                    .collect::<Result<_>>()?
            }
            "$count" => {
                let Bson::String(field) = spec else {
                    return Err(invalid("$count expects a field name"));
                };
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field.as_str(), count_value(docs.len()));
                    vec![out]
                }
            }
            "$group" => group(&docs, stage_document(name, spec)?)?,
            "$unwind" => unwind(docs, spec)?,
            other => return Err(unsupported("pipeline stage", other)),
        };
    }
    Ok(docs)
}

fn stage_document<'a>(name: &str, spec: &'a Bson) -> Result<&'a Document> {
    match spec {
        Bson::Document(d) => Ok(d),
        _ => Err(invalid(format!("{} expects a document", name))),
    }
}

fn stage_count(name: &str, spec: &Bson) -> Result<usize> {
    match as_f64(spec) {
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as usize),
        _ => Err(invalid(format!("{} expects a non-negative integer", name))),
    }
}

fn count_value(n: usize) -> Bson {
    match i32::try_from(n) {
        Ok(v) => Bson::Int32(v),
        Err(_) => Bson::Int64(n as i64),
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// Evaluate an expression: `"$path"` references a field, documents and
/// arrays are evaluated element-wise, anything else is a literal.
fn eval(doc: &Document, expr: &Bson) -> Result<Bson> {
    match expr {
        Bson::String(s) if s.starts_with('$') => Ok(first_value(doc, &s[1..])),
        Bson::Document(d) => {
            if let Some(op) = d.keys().find(|k| k.starts_with('$')) {
                return Err(unsupported("expression operator", op));
            }
            let mut out = Document::new();
            for (k, v) in d {
                out.insert(k.as_str(), eval(doc, v)?);
            }
            Ok(Bson::Document(out))
        }
        Bson::Array(items) => Ok(Bson::Array(
            items.iter().map(|i| eval(doc, i)).collect::<Result<_>>()?,
        )),
        other => Ok(other.clone()),
    }
}

fn truthy(value: &Bson) -> Option<bool> {
    match value {
        Bson::Boolean(b) => Some(*b),
        other => as_f64(other).map(|n| n != 0.0),
    }
}

// ============================================================================
// $project
// ============================================================================

fn project(doc: &Document, spec: &Document) -> Result<Document> {
    let exclusion = spec
        .iter()
        .any(|(k, v)| k != "_id" && truthy(v) == Some(false));

    if exclusion {
        let mut out = doc.clone();
        for (path, value) in spec {
            match truthy(value) {
                Some(false) => remove_path(&mut out, path),
                Some(true) if path == "_id" => {}
                _ => return Err(invalid("cannot mix inclusion and exclusion in $project")),
            }
        }
        return Ok(out);
    }

    let mut out = Document::new();
    if let Some(id) = doc.get("_id") {
        if spec.get("_id").and_then(truthy) != Some(false) {
            out.insert("_id", id.clone());
        }
    }
    for (path, value) in spec {
        match truthy(value) {
            Some(false) => {}
            Some(true) => {
                if path != "_id" {
                    if let Some(found) = resolve(doc, path).first() {
                        set_path(&mut out, path, (*found).clone());
                    }
                }
            }
            None => set_path(&mut out, path, eval(doc, value)?),
        }
    }
    Ok(out)
}

// ============================================================================
// $group
// ============================================================================

#[derive(Debug)]
enum Accumulator {
    Sum { int: i64, float: f64, is_float: bool },
    Avg { total: f64, count: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
    Last(Bson),
    Push(Vec<Bson>),
    AddToSet(Vec<Bson>),
}

impl Accumulator {
    fn new(op: &str) -> Result<Self> {
        Ok(match op {
            "$sum" | "$count" => Accumulator::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
            },
            "$avg" => Accumulator::Avg {
                total: 0.0,
                count: 0,
            },
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            "$first" => Accumulator::First(None),
            "$last" => Accumulator::Last(Bson::Null),
            "$push" => Accumulator::Push(Vec::new()),
            "$addToSet" => Accumulator::AddToSet(Vec::new()),
            other => return Err(unsupported("accumulator", other)),
        })
    }

    fn add(&mut self, value: Bson) {
        let is_missing = matches!(value, Bson::Null | Bson::Undefined);
        match self {
            Accumulator::Sum {
                int,
                float,
                is_float,
            } => match value {
                Bson::Int32(v) => *int = int.saturating_add(i64::from(v)),
                Bson::Int64(v) => *int = int.saturating_add(v),
                Bson::Double(v) => {
                    *float += v;
                    *is_float = true;
                }
                _ => {}
            },
            Accumulator::Avg { total, count } => {
                if let Some(v) = as_f64(&value) {
                    *total += v;
                    *count += 1;
                }
            }
            Accumulator::Min(current) => {
                if !is_missing
                    && current
                        .as_ref()
                        .is_none_or(|c| compare(&value, c).is_lt())
                {
                    *current = Some(value);
                }
            }
            Accumulator::Max(current) => {
                if !is_missing
                    && current
                        .as_ref()
                        .is_none_or(|c| compare(&value, c).is_gt())
                {
                    *current = Some(value);
                }
            }
            Accumulator::First(current) => {
                if current.is_none() {
                    *current = Some(value);
                }
            }
            Accumulator::Last(current) => *current = value,
            Accumulator::Push(items) => items.push(value),
            Accumulator::AddToSet(items) => {
                if !items.iter().any(|i| values_equal(i, &value)) {
                    items.push(value);
                }
            }
        }
    }

    fn finish(self) -> Bson {
        match self {
            Accumulator::Sum {
                int,
                float,
                is_float,
            } => {
                if is_float {
                    Bson::Double(float + int as f64)
                } else {
                    match i32::try_from(int) {
                        Ok(v) => Bson::Int32(v),
                        Err(_) => Bson::Int64(int),
                    }
                }
            }
            Accumulator::Avg { total, count } => {
                if count == 0 {
                    Bson::Null
                } else {
                    Bson::Double(total / count as f64)
                }
            }
            Accumulator::Min(v) | Accumulator::Max(v) | Accumulator::First(v) => {
                v.unwrap_or(Bson::Null)
            }
            Accumulator::Last(v) => v,
            Accumulator::Push(items) | Accumulator::AddToSet(items) => Bson::Array(items),
        }
    }
}

struct GroupField<'a> {
    name: &'a str,
    op: &'a str,
    expr: &'a Bson,
}

fn group(docs: &[Document], spec: &Document) -> Result<Vec<Document>> {
    let Some(key_expr) = spec.get("_id") else {
        return Err(invalid("$group requires an _id expression"));
    };

    let mut fields = Vec::new();
    for (name, value) in spec.iter().filter(|(k, _)| *k != "_id") {
        let Bson::Document(acc) = value else {
            return Err(invalid(format!("$group field '{}' must be an accumulator", name)));
        };
        let mut entries = acc.iter();
        let (Some((op, expr)), None) = (entries.next(), entries.next()) else {
            return Err(invalid(format!("$group field '{}' must have one accumulator", name)));
        };
        Accumulator::new(op)?;
        fields.push(GroupField { name, op, expr });
    }

    let mut groups: Vec<(Bson, Vec<Accumulator>)> = Vec::new();
    for doc in docs {
        let key = eval(doc, key_expr)?;
        let idx = match groups.iter().position(|(k, _)| values_equal(k, &key)) {
            Some(idx) => idx,
            None => {
                let accs = fields
                    .iter()
                    .map(|f| Accumulator::new(f.op))
                    .collect::<Result<_>>()?;
                groups.push((key, accs));
                groups.len() - 1
            }
        };

        for (field, acc) in fields.iter().zip(groups[idx].1.iter_mut()) {
            let value = if field.op == "$count" {
                Bson::Int32(1)
            } else {
                eval(doc, field.expr)?
            };
            acc.add(value);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accs)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for (field, acc) in fields.iter().zip(accs) {
                out.insert(field.name, acc.finish());
            }
            out
        })
        .collect())
}

// ============================================================================
// $unwind
// ============================================================================

fn unwind(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
    let (path, preserve) = match spec {
        Bson::String(path) => (path.as_str(), false),
        Bson::Document(d) => match d.get("path") {
            Some(Bson::String(path)) => (
                path.as_str(),
                d.get("preserveNullAndEmptyArrays")
                    .and_then(truthy)
                    .unwrap_or(false),
            ),
            _ => return Err(invalid("$unwind requires a path")),
        },
        _ => return Err(invalid("$unwind expects a path or a document")),
    };
    let Some(field) = path.strip_prefix('$') else {
        return Err(invalid("$unwind path must start with '$'"));
    };

    let mut out = Vec::new();
    for mut doc in docs {
        let value = resolve(&doc, field).first().map(|v| (*v).clone());
        match value {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, field, item);
                    out.push(copy);
                }
            }
            Some(Bson::Array(_)) => {
                if preserve {
                    remove_path(&mut doc, field);
                    out.push(doc);
                }
            }
            Some(Bson::Null) | None => {
                if preserve {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    Ok(out)
}

// ============================================================================
// Updates
// ============================================================================

/// Seed a document for an upsert from the equality clauses of `filter`.
pub(crate) fn seed_from_filter(filter: &Document) -> Document {
    let mut doc = Document::new();
    for (key, value) in filter {
        if key.starts_with('$') {
            continue;
        }
        match value {
            Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => {
                if let Some(eq) = d.get("$eq") {
                    set_path(&mut doc, key, eq.clone());
                }
            }
            other => set_path(&mut doc, key, other.clone()),
        }
    }
    if !doc.contains_key("_id") {
        doc.insert("_id", ObjectId::new());
    }
    doc
}

/// Apply update operators to `doc`. `$setOnInsert` only applies when
/// `inserting`.
pub(crate) fn apply_update(doc: &mut Document, update: &Document, inserting: bool) -> Result<()> {
    if update.is_empty() {
        return Err(invalid("update document must not be empty"));
    }

    for (op, spec) in update {
        let Bson::Document(fields) = spec else {
            return Err(invalid(format!("{} expects a document", op)));
        };
        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(doc, path, value.clone());
                }
            }
            "$setOnInsert" => {
                if inserting {
                    for (path, value) in fields {
                        set_path(doc, path, value.clone());
                    }
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    remove_path(doc, path);
                }
            }
            "$inc" => {
                for (path, delta) in fields {
                    if as_f64(delta).is_none() {
                        return Err(invalid(format!("$inc amount for '{}' must be numeric", path)));
                    }
                    let current = first_value(doc, path);
                    let sum = match (&current, delta) {
                        (Bson::Null, d) => d.clone(),
                        (Bson::Int32(a), Bson::Int32(b)) => Bson::Int32(a.saturating_add(*b)),
                        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.saturating_add(*b)),
                        (Bson::Int32(a), Bson::Int64(b)) => {
                            Bson::Int64(i64::from(*a).saturating_add(*b))
                        }
                        (Bson::Int64(a), Bson::Int32(b)) => {
                            Bson::Int64(a.saturating_add(i64::from(*b)))
                        }
                        (a, b) => match (as_f64(a), as_f64(b)) {
                            (Some(x), Some(y)) => Bson::Double(x + y),
                            _ => return Err(invalid(format!("cannot $inc non-numeric '{}'", path))),
                        },
                    };
                    set_path(doc, path, sum);
                }
            }
            other => return Err(unsupported("update operator", other)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn sales() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "product_name": "Shirt", "TotalQty": 3, "TotalNetAmount": 30.0, "sizes": ["S", "M"] },
            doc! { "_id": 2, "product_name": "Jeans", "TotalQty": 1, "TotalNetAmount": 55.5, "sizes": ["L"] },
            doc! { "_id": 3, "product_name": "Shirt", "TotalQty": 2, "TotalNetAmount": 20.0, "sizes": [] },
        ]
    }

    #[test]
    fn match_sort_limit_in_order() {
        let out = run(
            sales(),
            &[
                doc! { "$match": { "TotalQty": { "$gte": 2 } } },
                doc! { "$sort": { "TotalQty": 1 } },
                doc! { "$limit": 1 },
            ],
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_i32("_id").unwrap(), 3);
    }

    #[test]
    fn group_with_accumulators() {
        let out = run(
            sales(),
            &[
                doc! { "$group": {
                    "_id": "$product_name",
                    "qty": { "$sum": "$TotalQty" },
                    "revenue": { "$sum": "$TotalNetAmount" },
                    "avg_qty": { "$avg": "$TotalQty" },
                    "max_qty": { "$max": "$TotalQty" },
                    "orders": { "$sum": 1 },
                    "ids": { "$push": "$_id" },
                } },
                doc! { "$sort": { "_id": 1 } },
            ],
        )
        .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get_str("_id").unwrap(), "Jeans");
        let shirt = &out[1];
        assert_eq!(shirt.get_i32("qty").unwrap(), 5);
        assert_eq!(shirt.get_f64("revenue").unwrap(), 50.0);
        assert_eq!(shirt.get_f64("avg_qty").unwrap(), 2.5);
        assert_eq!(shirt.get_i32("max_qty").unwrap(), 3);
        assert_eq!(shirt.get_i32("orders").unwrap(), 2);
        assert_eq!(shirt.get_array("ids").unwrap().len(), 2);
    }

    #[test]
    fn group_by_null_collapses_everything() {
        let out = run(sales(), &[doc! { "$group": { "_id": null, "n": { "$count": {} } } }]).unwrap();
        assert_eq!(out, vec![doc! { "_id": null, "n": 3 }]);
    }

    #[test]
    fn count_and_skip() {
        let out = run(sales(), &[doc! { "$skip": 1 }, doc! { "$count": "total" }]).unwrap();
        assert_eq!(out, vec![doc! { "total": 2 }]);

        let none = run(sales(), &[doc! { "$match": { "TotalQty": 99 } }, doc! { "$count": "total" }]).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn project_inclusion_and_exclusion() {
        let out = run(
            sales(),
            &[doc! { "$project": { "_id": 0, "name": "$product_name", "TotalQty": 1 } }],
        )
        .unwrap();
        assert_eq!(out[0], doc! { "name": "Shirt", "TotalQty": 3 });

        let out = run(sales(), &[doc! { "$project": { "sizes": 0, "TotalNetAmount": 0 } }]).unwrap();
        assert_eq!(out[1], doc! { "_id": 2, "product_name": "Jeans", "TotalQty": 1 });
    }

    #[test]
    fn unwind_arrays() {
        let out = run(sales(), &[doc! { "$unwind": "$sizes" }]).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].get_str("sizes").unwrap(), "M");

        let out = run(
            sales(),
            &[doc! { "$unwind": { "path": "$sizes", "preserveNullAndEmptyArrays": true } }],
        )
        .unwrap();
        assert_eq!(out.len(), 4);
        assert!(!out[3].contains_key("sizes"));
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let err = run(sales(), &[doc! { "$lookup": { "from": "x" } }]).unwrap_err();
        assert!(err.to_string().contains("$lookup"));
        assert!(run(sales(), &[doc! { "$limit": 0 }]).is_err());
        assert!(run(sales(), &[doc! { "$match": {}, "$limit": 1 }]).is_err());
    }

    #[test]
    fn update_operators() {
        let mut d = seed_from_filter(&doc! { "_id": "m1" });
        apply_update(
            &mut d,
            &doc! { "$set": { "memory": "tea" }, "$setOnInsert": { "created_at": 1 }, "$inc": { "n": 2 } },
            true,
        )
        .unwrap();
        assert_eq!(d, doc! { "_id": "m1", "memory": "tea", "created_at": 1, "n": 2 });

        apply_update(
            &mut d,
            &doc! { "$set": { "memory": "coffee" }, "$setOnInsert": { "created_at": 2 }, "$unset": { "n": "" } },
            false,
        )
        .unwrap();
        assert_eq!(d, doc! { "_id": "m1", "memory": "coffee", "created_at": 1 });

        assert!(apply_update(&mut d, &doc! { "$rename": { "a": "b" } }, false).is_err());
    }
}
