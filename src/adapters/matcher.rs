//! Evaluation of query specifications against in-memory documents, following
//! document-database semantics: request strings are cast to the stored
//! field's type, array fields match on any element, and sort order is total
//! across value types.

use crate::domain::model::{get_path, Document, ID_FIELD};
use crate::domain::ports::{Group, Reducer};
use crate::domain::query::{Comparison, Filter, Predicate, Projection, SortDirection, SortKey};
use chrono::DateTime;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

pub fn matches(document: &Document, filter: &Filter) -> bool {
    filter
        .predicates()
        .iter()
        .all(|predicate| matches_predicate(document, predicate))
}

fn matches_predicate(document: &Document, predicate: &Predicate) -> bool {
    let stored = get_path(document, predicate.field());
    match predicate {
        Predicate::Equals { value, .. } => match (stored, value) {
            (None, _) => false,
            // Several request values behave like "any of".
            (Some(stored), Value::Array(candidates)) => {
                stored == value || candidates.iter().any(|c| equals(stored, c))
            }
            (Some(stored), value) => equals(stored, value),
        },
        Predicate::Compare { op, value, .. } => match (stored, op) {
            (None, Comparison::Ne) => true,
            (None, _) => false,
            (Some(stored), Comparison::Ne) => !equals(stored, value),
            (Some(Value::Array(items)), op) => items.iter().any(|item| compare_op(item, *op, value)),
            (Some(stored), op) => compare_op(stored, *op, value),
        },
        Predicate::Literal { value, .. } => stored == Some(value),
    }
}

fn equals(stored: &Value, wanted: &Value) -> bool {
    match stored {
        Value::Array(items) => {
            items.iter().any(|item| coerced_cmp(item, wanted) == Some(Ordering::Equal))
        }
        stored => coerced_cmp(stored, wanted) == Some(Ordering::Equal),
    }
}

fn compare_op(stored: &Value, op: Comparison, wanted: &Value) -> bool {
    match (coerced_cmp(stored, wanted), op) {
        (Some(ordering), Comparison::Gt) => ordering == Ordering::Greater,
        (Some(ordering), Comparison::Gte) => ordering != Ordering::Less,
        (Some(ordering), Comparison::Lt) => ordering == Ordering::Less,
        (Some(ordering), Comparison::Lte) => ordering != Ordering::Greater,
        (Some(ordering), Comparison::Ne) => ordering != Ordering::Equal,
        (None, _) => false,
    }
}

/// Compares a stored value with a wanted one, casting request strings to the
/// stored type. `None` when the two cannot be compared.
fn coerced_cmp(stored: &Value, wanted: &Value) -> Option<Ordering> {
    match (stored, wanted) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Number(a), Value::String(b)) => a.as_f64()?.partial_cmp(&b.trim().parse::<f64>().ok()?),
        (Value::String(a), Value::String(b)) => Some(compare_strings(a, b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::String(b)) => Some(a.cmp(&b.trim().parse::<bool>().ok()?)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

/// Timestamps compare as instants; everything else lexicographically.
fn compare_strings(a: &str, b: &str) -> Ordering {
    match (
        DateTime::parse_from_rfc3339(a),
        DateTime::parse_from_rfc3339(b),
    ) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used for sorting: by type first, then by value.
fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let by_type = type_rank(a).cmp(&type_rank(b));
    if by_type != Ordering::Equal {
        return by_type;
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => compare_strings(x, y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        _ => Ordering::Equal,
    }
}

/// Stable multi-key sort; the first key is primary.
pub fn sort_documents(documents: &mut [Document], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    documents.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let ordering = sort_cmp(get_path(a, &key.field), get_path(b, &key.field));
                match key.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

pub fn project(document: Document, projection: &Projection) -> Document {
    match projection {
        Projection::All => document,
        Projection::Include(fields) => {
            let mut projected = Map::new();
            if let Some(id) = document.get(ID_FIELD) {
                projected.insert(ID_FIELD.to_string(), id.clone());
            }
            for field in fields {
                if let Some(value) = get_path(&document, field) {
                    insert_path(&mut projected, field, value.clone());
                }
            }
            projected
        }
        Projection::Exclude(fields) => {
            let mut projected = document;
            for field in fields {
                remove_path(&mut projected, field);
            }
            projected
        }
    }
}

fn insert_path(document: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(child)) = document.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

/// Groups `documents` by the value at `group_key`, in first-seen order.
pub fn group_by<'a, I>(documents: I, group_key: &str, reducers: &[Reducer]) -> Vec<Group>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut buckets: Vec<(Value, Vec<&'a Document>)> = Vec::new();
    for document in documents {
        let key = get_path(document, group_key).cloned().unwrap_or(Value::Null);
        match buckets.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, members)) => members.push(document),
            None => buckets.push((key, vec![document])),
        }
    }

    buckets
        .into_iter()
        .map(|(key, members)| Group {
            key,
            values: reducers
                .iter()
                .map(|reducer| (reducer.name().to_string(), reduce(reducer, &members)))
                .collect(),
        })
        .collect()
}

fn reduce(reducer: &Reducer, members: &[&Document]) -> Value {
    let numbers = |field: &str| -> Vec<f64> {
        members
            .iter()
            .filter_map(|doc| get_path(doc, field).and_then(Value::as_f64))
            .collect()
    };
    match reducer {
        Reducer::Count { .. } => Value::from(members.len() as u64),
        Reducer::Avg { field, .. } => {
            let values = numbers(field);
            if values.is_empty() {
                Value::Null
            } else {
                float(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
    }
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}
