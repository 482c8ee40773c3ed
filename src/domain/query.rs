//! Query specification: the per-request filter, sort, projection and page
//! window handed to a collection. Built fresh for each request and dropped
//! after execution.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const PAGE_PARAM: &str = "page";
pub const SORT_PARAM: &str = "sort";
pub const LIMIT_PARAM: &str = "limit";
pub const FIELDS_PARAM: &str = "fields";

/// Control keys that are never interpreted as predicates.
pub const RESERVED_PARAMS: [&str; 4] = [PAGE_PARAM, SORT_PARAM, LIMIT_PARAM, FIELDS_PARAM];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
    /// Internal only. Never produced from request parameters.
    Ne,
}

impl Comparison {
    /// Recognizes the request-side operator tokens. `ne` is deliberately absent.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(Comparison::Gt),
            "gte" => Some(Comparison::Gte),
            "lt" => Some(Comparison::Lt),
            "lte" => Some(Comparison::Lte),
            _ => None,
        }
    }

    /// Operator in the document engine's syntax.
    pub fn operator(self) -> &'static str {
        match self {
            Comparison::Gt => "$gt",
            Comparison::Gte => "$gte",
            Comparison::Lt => "$lt",
            Comparison::Lte => "$lte",
            Comparison::Ne => "$ne",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exact match. String values are coerced to the stored field's type.
    Equals { field: String, value: Value },
    Compare {
        field: String,
        op: Comparison,
        value: Value,
    },
    /// Input the builder could not interpret, forwarded as written. Compared
    /// without coercion, so it usually matches nothing.
    Literal { field: String, value: Value },
}

impl Predicate {
    pub fn field(&self) -> &str {
        match self {
            Predicate::Equals { field, .. }
            | Predicate::Compare { field, .. }
            | Predicate::Literal { field, .. } => field,
        }
    }

    fn render(&self) -> Value {
        match self {
            Predicate::Equals { value, .. } | Predicate::Literal { value, .. } => value.clone(),
            Predicate::Compare { op, value, .. } => {
                let mut ops = Map::new();
                ops.insert(op.operator().to_string(), value.clone());
                Value::Object(ops)
            }
        }
    }
}

/// Conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::new().and(Predicate::Equals {
            field: field.to_string(),
            value: value.into(),
        })
    }

    pub fn compare(field: &str, op: Comparison, value: impl Into<Value>) -> Self {
        Self::new().and(Predicate::Compare {
            field: field.to_string(),
            op,
            value: value.into(),
        })
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn merge(mut self, other: Filter) -> Self {
        self.predicates.extend(other.predicates);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Renders the filter in document-query syntax, e.g.
    /// `{ "duration": { "$gte": "5" }, "difficulty": "easy" }`.
    /// Predicates that cannot share a field key are moved under `$and`.
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        let mut overflow = Vec::new();

        for predicate in &self.predicates {
            let field = predicate.field();
            let rendered = predicate.render();
            let mergeable = matches!(&rendered, Value::Object(ops) if is_operator_object(ops));
            match doc.get_mut(field) {
                None => {
                    doc.insert(field.to_string(), rendered);
                }
                Some(Value::Object(existing)) if mergeable && is_operator_object(existing) => {
                    if let Value::Object(ops) = rendered {
                        existing.extend(ops);
                    }
                }
                Some(_) => {
                    let mut clause = Map::new();
                    clause.insert(field.to_string(), rendered);
                    overflow.push(Value::Object(clause));
                }
            }
        }

        if !overflow.is_empty() {
            doc.insert("$and".to_string(), Value::Array(overflow));
        }
        Value::Object(doc)
    }
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Descending,
        }
    }

    /// `-price` sorts descending, `price` ascending. Blank input yields `None`.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        match spec.strip_prefix('-') {
            Some(field) if !field.trim().is_empty() => Some(Self::desc(field.trim())),
            Some(_) => None,
            None if !spec.is_empty() => Some(Self::asc(spec)),
            None => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    /// Only these fields, plus the identity field.
    Include(Vec<String>),
    Exclude(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl QuerySpec {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    Many(Vec<String>),
}

impl ParamValue {
    /// The value that wins when a key is repeated.
    pub fn last(&self) -> Option<&str> {
        match self {
            ParamValue::Single(value) => Some(value),
            ParamValue::Many(values) => values.last().map(String::as_str),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ParamValue::Single(value) => Value::String(value.clone()),
            ParamValue::Many(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

/// Flat, untrusted request parameters, keyed exactly as they arrived
/// (`price[gte]` stays a single key).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: BTreeMap<String, ParamValue>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a URL query string, with or without the leading `?`.
    /// Repeated keys collect into [`ParamValue::Many`].
    pub fn parse(query: &str) -> Self {
        let query = query.trim().trim_start_matches('?');
        url::form_urlencoded::parse(query.as_bytes())
            .fold(Self::new(), |params, (key, value)| {
                params.with(&key, &value)
            })
    }

    /// Adds a value, turning the entry into a list if the key already exists.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: &str, value: &str) {
        match self.params.remove(key) {
            None => {
                self.params
                    .insert(key.to_string(), ParamValue::Single(value.to_string()));
            }
            Some(ParamValue::Single(previous)) => {
                self.params.insert(
                    key.to_string(),
                    ParamValue::Many(vec![previous, value.to_string()]),
                );
            }
            Some(ParamValue::Many(mut values)) => {
                values.push(value.to_string());
                self.params.insert(key.to_string(), ParamValue::Many(values));
            }
        }
    }

    pub fn insert(&mut self, key: &str, value: ParamValue) {
        self.params.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    pub fn last(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ParamValue::last)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |params, (k, v)| {
            params.with(k.as_ref(), v.as_ref())
        })
    }
}
