//! Filter evaluation, value comparison and field paths.

use std::cmp::Ordering;

use bson::{Bson, Document};

use docstore_core::Result;
use docstore_core::error::InvalidInputError;

pub(crate) fn unsupported(kind: &'static str, name: &str) -> docstore_core::Error {
    InvalidInputError::Unsupported {
        kind,
        name: name.to_string(),
    }
    .into()
}

pub(crate) fn invalid(message: impl Into<String>) -> docstore_core::Error {
    InvalidInputError::Other {
        message: message.into(),
    }
    .into()
}

// ============================================================================
// Field paths
// ============================================================================

/// Resolve a dotted path. Arrays of documents are traversed element-wise and
/// numeric segments index into arrays.
pub(crate) fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some(first) = doc.get(parts[0]) {
        resolve_in(first, &parts[1..], &mut out);
    }
    out
}

fn resolve_in<'a>(value: &'a Bson, parts: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = parts.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(next) = doc.get(*head) {
                resolve_in(next, rest, out);
            }
        }
        Bson::Array(items) => {
            if let Ok(idx) = head.parse::<usize>() {
                if let Some(next) = items.get(idx) {
                    resolve_in(next, rest, out);
                }
            } else {
                for item in items.iter().filter(|i| matches!(i, Bson::Document(_))) {
                    resolve_in(item, parts, out);
                }
            }
        }
        _ => {}
    }
}

/// First value at `path`, or `Null` when missing.
pub(crate) fn first_value(doc: &Document, path: &str) -> Bson {
    resolve(doc, path).first().map_or(Bson::Null, |v| (*v).clone())
}

/// Set a dotted path, creating intermediate documents.
pub(crate) fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = doc.get_mut(head) {
                set_path(child, rest, value);
            }
        }
    }
}

/// Remove a dotted path, if present.
pub(crate) fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = doc.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

// ============================================================================
// Comparison
// ============================================================================

pub(crate) fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Position in the server's cross-type sort order.
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Total order over BSON values, following the server's type ordering.
pub(crate) fn compare(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Symbol(x), Bson::Symbol(y)) => x.cmp(y),
        (Bson::Document(x), Bson::Document(y)) => compare_documents(x, y),
        (Bson::Array(x), Bson::Array(y)) => compare_seq(x.iter(), y.iter()),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

fn compare_documents(a: &Document, b: &Document) -> Ordering {
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        let ord = ka.cmp(kb).then_with(|| compare(va, vb));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn compare_seq<'a>(
    a: impl Iterator<Item = &'a Bson>,
    b: impl Iterator<Item = &'a Bson>,
) -> Ordering {
    let mut a = a;
    let mut b = b;
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Equality with numeric types compared by value.
pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => match (a, b) {
            (Bson::Null | Bson::Undefined, Bson::Null | Bson::Undefined) => true,
            (Bson::Array(x), Bson::Array(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equal(p, q))
            }
            (Bson::Document(x), Bson::Document(y)) => {
                x.len() == y.len()
                    && x
                        .iter()
                        .zip(y.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
            }
            _ => a == b,
        },
    }
}

/// Sort documents by a `{field: 1 | -1, ...}` specification. Stable.
pub(crate) fn sort_documents(docs: &mut [Document], spec: &Document) -> Result<()> {
    let keys = spec
        .iter()
        .map(|(field, dir)| match as_f64(dir) {
            Some(d) if d == 1.0 => Ok((field.clone(), Ordering::Less)),
            Some(d) if d == -1.0 => Ok((field.clone(), Ordering::Greater)),
            _ => Err(invalid(format!("sort direction for '{}' must be 1 or -1", field))),
        })
        .collect::<Result<Vec<_>>>()?;

    docs.sort_by(|a, b| {
        for (field, direction) in &keys {
            let ord = compare(&first_value(a, field), &first_value(b, field));
            let ord = if *direction == Ordering::Greater {
                ord.reverse()
            } else {
                ord
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

// ============================================================================
// Filters
// ============================================================================

/// Evaluate a query filter against a document.
pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => logical(doc, cond, key)?.iter().all(|m| *m),
            "$or" => logical(doc, cond, key)?.iter().any(|m| *m),
            "$nor" => !logical(doc, cond, key)?.iter().any(|m| *m),
            op if op.starts_with('$') => return Err(unsupported("query operator", op)),
            path => field_matches(doc, path, cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn logical(doc: &Document, cond: &Bson, op: &str) -> Result<Vec<bool>> {
    let Bson::Array(clauses) = cond else {
        return Err(invalid(format!("{} expects an array", op)));
    };
    if clauses.is_empty() {
        return Err(invalid(format!("{} expects a non-empty array", op)));
    }
    clauses
        .iter()
        .map(|clause| match clause {
            Bson::Document(sub) => matches(doc, sub),
            _ => Err(invalid(format!("{} clauses must be documents", op))),
        })
        .collect()
}

fn is_operator_document(cond: &Bson) -> Option<&Document> {
    match cond {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn field_matches(doc: &Document, path: &str, cond: &Bson) -> Result<bool> {
    let candidates = resolve(doc, path);
    match is_operator_document(cond) {
        Some(ops) => operators_match(&candidates, ops),
        None => Ok(eq_matches(&candidates, cond)),
    }
}

fn operators_match(candidates: &[&Bson], ops: &Document) -> Result<bool> {
    for (op, arg) in ops {
        if !operator_matches(candidates, op, arg)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Candidate values with one level of arrays expanded.
fn expanded<'a>(candidates: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut out = Vec::new();
    for c in candidates {
        if let Bson::Array(items) = c {
            out.extend(items.iter());
        }
        out.push(*c);
    }
    out
}

fn eq_matches(candidates: &[&Bson], value: &Bson) -> bool {
    if candidates.is_empty() {
        return matches!(value, Bson::Null);
    }
    expanded(candidates).iter().any(|c| values_equal(c, value))
}

fn range_matches(candidates: &[&Bson], arg: &Bson, accept: fn(Ordering) -> bool) -> bool {
    expanded(candidates)
        .iter()
        .filter(|c| type_rank(c) == type_rank(arg))
        .any(|c| accept(compare(c, arg)))
}

fn operator_matches(candidates: &[&Bson], op: &str, arg: &Bson) -> Result<bool> {
    let ok = match op {
        "$eq" => eq_matches(candidates, arg),
        "$ne" => !eq_matches(candidates, arg),
        "$gt" => range_matches(candidates, arg, |o| o == Ordering::Greater),
        "$gte" => range_matches(candidates, arg, |o| o != Ordering::Less),
        "$lt" => range_matches(candidates, arg, |o| o == Ordering::Less),
        "$lte" => range_matches(candidates, arg, |o| o != Ordering::Greater),
        "$in" | "$nin" => {
            let Bson::Array(options) = arg else {
                return Err(invalid(format!("{} expects an array", op)));
            };
            let found = options.iter().any(|o| eq_matches(candidates, o));
            if op == "$in" { found } else { !found }
        }
        "$exists" => {
            let wanted = match arg {
                Bson::Boolean(b) => *b,
                other => as_f64(other).is_some_and(|n| n != 0.0),
            };
            candidates.is_empty() != wanted
        }
        "$size" => {
            let Some(size) = as_f64(arg) else {
                return Err(invalid("$size expects a number"));
            };
            candidates
                .iter()
                .any(|c| matches!(c, Bson::Array(items) if items.len() as f64 == size))
        }
        "$not" => match arg {
            Bson::Document(ops) => !operators_match(candidates, ops)?,
            _ => return Err(invalid("$not expects an operator document")),
        },
        other => return Err(unsupported("query operator", other)),
    };
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn order() -> Document {
        doc! {
            "_id": 1,
            "product_name": "Linen Shirt",
            "TotalQty": 12,
            "TotalNetAmount": 240.5,
            "tags": ["summer", "linen"],
            "store": { "city": "Austin", "zip": "78701" },
            "lines": [ { "sku": "A", "qty": 2 }, { "sku": "B", "qty": 10 } ],
        }
    }

    #[test]
    fn equality_and_missing_fields() {
        let d = order();
        assert!(matches(&d, &doc! { "product_name": "Linen Shirt" }).unwrap());
        assert!(matches(&d, &doc! { "TotalQty": 12.0 }).unwrap());
        assert!(!matches(&d, &doc! { "product_name": "Jeans" }).unwrap());
        assert!(matches(&d, &doc! { "discount": null }).unwrap());
        assert!(matches(&d, &doc! {}).unwrap());
    }

    #[test]
    fn comparison_operators() {
        let d = order();
        assert!(matches(&d, &doc! { "TotalQty": { "$gt": 10, "$lte": 12 } }).unwrap());
        assert!(!matches(&d, &doc! { "TotalQty": { "$lt": 12 } }).unwrap());
        assert!(!matches(&d, &doc! { "product_name": { "$gt": 5 } }).unwrap());
        assert!(matches(&d, &doc! { "TotalQty": { "$ne": 3 } }).unwrap());
    }

    #[test]
    fn arrays_and_nested_paths() {
        let d = order();
        assert!(matches(&d, &doc! { "tags": "linen" }).unwrap());
        assert!(matches(&d, &doc! { "tags": { "$size": 2 } }).unwrap());
        assert!(matches(&d, &doc! { "store.city": "Austin" }).unwrap());
        assert!(matches(&d, &doc! { "lines.sku": "B" }).unwrap());
        assert!(matches(&d, &doc! { "lines.1.qty": { "$gte": 10 } }).unwrap());
    }

    #[test]
    fn membership_and_existence() {
        let d = order();
        assert!(matches(&d, &doc! { "product_name": { "$in": ["Jeans", "Linen Shirt"] } }).unwrap());
        assert!(matches(&d, &doc! { "product_name": { "$nin": ["Jeans"] } }).unwrap());
        assert!(matches(&d, &doc! { "store": { "$exists": true } }).unwrap());
        assert!(matches(&d, &doc! { "refund": { "$exists": false } }).unwrap());
    }

    #[test]
    fn logical_operators() {
        let d = order();
        assert!(matches(&d, &doc! { "$or": [ { "TotalQty": 1 }, { "TotalQty": 12 } ] }).unwrap());
        assert!(!matches(&d, &doc! { "$and": [ { "TotalQty": 12 }, { "tags": "wool" } ] }).unwrap());
        assert!(matches(&d, &doc! { "$nor": [ { "TotalQty": 1 } ] }).unwrap());
        assert!(matches(&d, &doc! { "TotalQty": { "$not": { "$lt": 5 } } }).unwrap());
    }

    #[test]
    fn unsupported_operator_is_an_error() {
        let d = order();
        assert!(matches(&d, &doc! { "product_name": { "$regex": "^Lin" } }).is_err());
        assert!(matches(&d, &doc! { "$where": "true" }).is_err());
    }

    #[test]
    fn cross_type_ordering() {
        assert_eq!(compare(&Bson::Null, &Bson::Int32(0)), Ordering::Less);
        assert_eq!(compare(&Bson::Int32(2), &Bson::Double(1.5)), Ordering::Greater);
        assert_eq!(compare(&Bson::String("a".into()), &Bson::Int64(9)), Ordering::Greater);
    }

    #[test]
    fn sorts_by_multiple_keys() {
        let mut docs = vec![
            doc! { "a": 1, "b": 2 },
            doc! { "a": 2, "b": 1 },
            doc! { "a": 1, "b": 3 },
        ];
        sort_documents(&mut docs, &doc! { "a": -1, "b": 1 }).unwrap();
        assert_eq!(docs[0], doc! { "a": 2, "b": 1 });
        assert_eq!(docs[1], doc! { "a": 1, "b": 2 });
        assert_eq!(docs[2], doc! { "a": 1, "b": 3 });
        assert!(sort_documents(&mut docs, &doc! { "a": 2 }).is_err());
    }

    #[test]
    fn set_and_remove_paths() {
        let mut d = doc! { "a": 1 };
        set_path(&mut d, "b.c", Bson::Int32(5));
        assert_eq!(d, doc! { "a": 1, "b": { "c": 5 } });
        remove_path(&mut d, "b.c");
        assert_eq!(d, doc! { "a": 1, "b": {} });
    }
}
