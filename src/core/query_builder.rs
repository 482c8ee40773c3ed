//! Turns untrusted request parameters into a bounded query.
//!
//! The four steps are independent and chainable, and are meant to be applied
//! in the order filter, sort, field selection, pagination:
//!
//! ```ignore
//! let docs = QueryBuilder::new(find(&tours, Filter::new()), &params)
//!     .filter()
//!     .sort()
//!     .limit_fields()
//!     .paginate()
//!     .into_query()
//!     .await?;
//! ```

use crate::domain::model::{CREATED_AT_FIELD, VERSION_FIELD};
use crate::domain::ports::{Collection, Find};
use crate::domain::query::{
    Comparison, Filter, ParamValue, Predicate, Projection, QueryParams, SortKey, FIELDS_PARAM,
    LIMIT_PARAM, PAGE_PARAM, RESERVED_PARAMS, SORT_PARAM,
};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: usize,
    /// Optional ceiling on `limit`. `None` leaves the page size unbounded.
    pub max_limit: Option<usize>,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: None,
        }
    }
}

pub struct QueryBuilder<'c, 'p, C: Collection + ?Sized> {
    query: Find<'c, C>,
    params: &'p QueryParams,
    limits: PageLimits,
    hidden: Vec<&'static str>,
}

impl<'c, 'p, C: Collection + ?Sized> QueryBuilder<'c, 'p, C> {
    pub fn new(query: Find<'c, C>, params: &'p QueryParams) -> Self {
        Self {
            query,
            params,
            limits: PageLimits::default(),
            hidden: vec![VERSION_FIELD],
        }
    }

    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Fields left out of results unless `fields` names them. `__v` always is.
    pub fn hide_fields(mut self, fields: &[&'static str]) -> Self {
        for field in fields {
            if !self.hidden.contains(field) {
                self.hidden.push(*field);
            }
        }
        self
    }

    /// ANDs every non-reserved parameter onto the base query as a predicate.
    pub fn filter(mut self) -> Self {
        let filter = parse_filter(self.params);
        if !filter.is_empty() {
            tracing::debug!("Request filter: {}", filter.to_document());
        }
        self.query = self.query.filter(filter);
        self
    }

    /// Multi-key sort from `sort=a,-b`, newest first when absent.
    pub fn sort(mut self) -> Self {
        self.query = self.query.sort(parse_sort(self.params));
        self
    }

    /// Projection from `fields=a,b`; hides the revision and other hidden fields when absent.
    pub fn limit_fields(mut self) -> Self {
        self.query = self
            .query
            .select(parse_projection(self.params, &self.hidden));
        self
    }

    pub fn paginate(mut self) -> Self {
        let (skip, limit) = parse_page(self.params, self.limits);
        self.query = self.query.skip(skip).limit(limit);
        self
    }

    /// All four steps in their documented order.
    pub fn build(self) -> Find<'c, C> {
        self.filter().sort().limit_fields().paginate().into_query()
    }

    pub fn into_query(self) -> Find<'c, C> {
        self.query
    }
}

fn operator_key() -> &'static Regex {
    static OPERATOR_KEY: OnceLock<Regex> = OnceLock::new();
    OPERATOR_KEY.get_or_init(|| {
        Regex::new(r"^([^\[\]]+)\[([^\[\]]*)\]$").expect("operator key pattern is valid")
    })
}

pub fn parse_filter(params: &QueryParams) -> Filter {
    params
        .iter()
        .filter(|(key, _)| !RESERVED_PARAMS.contains(key))
        .fold(Filter::new(), |filter, (key, value)| {
            filter.and(parse_predicate(key, value))
        })
}

/// `price[gte]=100` becomes a comparison; anything it cannot interpret is
/// passed through as a literal predicate instead of failing.
fn parse_predicate(key: &str, value: &ParamValue) -> Predicate {
    if let Some(caps) = operator_key().captures(key) {
        let field = caps[1].to_string();
        let token = &caps[2];

        if let (Some(op), ParamValue::Single(raw)) = (Comparison::from_token(token), value) {
            return Predicate::Compare {
                field,
                op,
                value: Value::String(raw.clone()),
            };
        }

        let literal = if token.is_empty() {
            match value {
                ParamValue::Single(raw) => Value::Array(vec![Value::String(raw.clone())]),
                ParamValue::Many(_) => value.to_value(),
            }
        } else {
            let mut inner = Map::new();
            inner.insert(token.to_string(), value.to_value());
            Value::Object(inner)
        };
        tracing::debug!("Unrecognized filter key `{}`, forwarding as literal", key);
        return Predicate::Literal {
            field,
            value: literal,
        };
    }

    if key.trim().is_empty() || key.contains('[') || key.contains(']') {
        tracing::debug!("Malformed filter key `{}`, forwarding as literal", key);
        return Predicate::Literal {
            field: key.to_string(),
            value: value.to_value(),
        };
    }

    Predicate::Equals {
        field: key.to_string(),
        value: value.to_value(),
    }
}

pub fn parse_sort(params: &QueryParams) -> Vec<SortKey> {
    let keys: Vec<SortKey> = params
        .last(SORT_PARAM)
        .map(|raw| raw.split(',').filter_map(SortKey::parse).collect())
        .unwrap_or_default();

    if keys.is_empty() {
        vec![SortKey::desc(CREATED_AT_FIELD)]
    } else {
        keys
    }
}

/// `hidden` fields are excluded unless explicitly included.
pub fn parse_projection(params: &QueryParams, hidden: &[&str]) -> Projection {
    let fields: Vec<String> = params
        .last(FIELDS_PARAM)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if fields.is_empty() {
        return Projection::Exclude(hidden.iter().map(|field| field.to_string()).collect());
    }

    // `fields=-a,-b` hides fields. A mixed list keeps only the included ones.
    let (excluded, included): (Vec<String>, Vec<String>) =
        fields.into_iter().partition(|field| field.starts_with('-'));
    if included.is_empty() {
        let mut excluded: Vec<String> = excluded
            .into_iter()
            .map(|field| field.trim_start_matches('-').to_string())
            .filter(|field| !field.is_empty())
            .collect();
        for field in hidden {
            if !excluded.iter().any(|name| name.as_str() == *field) {
                excluded.push(field.to_string());
            }
        }
        Projection::Exclude(excluded)
    } else {
        Projection::Include(included)
    }
}

fn positive(params: &QueryParams, key: &str) -> Option<usize> {
    params
        .last(key)
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
}

/// Returns `(skip, limit)`. Missing or unusable values fall back to the defaults.
pub fn parse_page(params: &QueryParams, limits: PageLimits) -> (usize, usize) {
    let page = positive(params, PAGE_PARAM).unwrap_or(DEFAULT_PAGE);
    let mut limit = positive(params, LIMIT_PARAM).unwrap_or(limits.default_limit);
    if let Some(max) = limits.max_limit {
        limit = limit.min(max);
    }
    ((page - 1).saturating_mul(limit), limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryCollection;
    use crate::domain::ports::find;
    use crate::domain::query::SortDirection;
    use serde_json::json;

    #[test]
    fn test_reserved_keys_add_no_predicates() {
        let params = QueryParams::parse("page=2&sort=price&limit=5&fields=name");
        assert!(parse_filter(&params).is_empty());
    }

    #[test]
    fn test_operator_keys_become_comparisons() {
        let params = QueryParams::parse("duration[gte]=5&difficulty=easy&price[lt]=1500");
        let filter = parse_filter(&params);
        assert_eq!(
            filter.to_document(),
            json!({
                "difficulty": "easy",
                "duration": { "$gte": "5" },
                "price": { "$lt": "1500" }
            })
        );
    }

    #[test]
    fn test_malformed_keys_are_literals() {
        let params = QueryParams::parse("price[ne]=5&tags[]=x&a[b][c]=1&[gte]=3");
        let filter = parse_filter(&params);
        assert_eq!(filter.predicates().len(), 4);
        assert!(filter
            .predicates()
            .iter()
            .all(|p| matches!(p, Predicate::Literal { .. })));

        let doc = filter.to_document();
        assert_eq!(doc["price"], json!({ "ne": "5" }));
        assert_eq!(doc["tags"], json!(["x"]));
        assert_eq!(doc["a[b][c]"], json!("1"));
        assert_eq!(doc["[gte]"], json!("3"));
    }

    #[test]
    fn test_repeated_operator_is_literal() {
        let params = QueryParams::parse("price[gte]=1&price[gte]=2");
        let filter = parse_filter(&params);
        assert_eq!(
            filter.predicates(),
            &[Predicate::Literal {
                field: "price".to_string(),
                value: json!({ "gte": ["1", "2"] }),
            }]
        );
    }

    #[test]
    fn test_sort_default_and_multi_key() {
        assert_eq!(
            parse_sort(&QueryParams::new()),
            vec![SortKey::desc("createdAt")]
        );
        assert_eq!(
            parse_sort(&QueryParams::parse("sort=price,-ratingsAverage")),
            vec![SortKey::asc("price"), SortKey::desc("ratingsAverage")]
        );
        assert_eq!(
            parse_sort(&QueryParams::parse("sort=,,")),
            vec![SortKey::desc("createdAt")]
        );
        let keys = parse_sort(&QueryParams::parse("sort=-price"));
        assert_eq!(keys[0].direction, SortDirection::Descending);
    }

    #[test]
    fn test_projection() {
        assert_eq!(
            parse_projection(&QueryParams::new(), &["__v"]),
            Projection::Exclude(vec!["__v".to_string()])
        );
        assert_eq!(
            parse_projection(&QueryParams::parse("fields=name, price,,"), &["__v"]),
            Projection::Include(vec!["name".to_string(), "price".to_string()])
        );
        assert_eq!(
            parse_projection(&QueryParams::parse("fields=-price,-summary"), &["__v"]),
            Projection::Exclude(vec![
                "price".to_string(),
                "summary".to_string(),
                "__v".to_string()
            ])
        );
        assert_eq!(
            parse_projection(&QueryParams::parse("fields=name,-price"), &["__v"]),
            Projection::Include(vec!["name".to_string()])
        );
    }

    #[test]
    fn test_hidden_fields_unless_requested() {
        let hidden = ["__v", "createdAt"];
        assert_eq!(
            parse_projection(&QueryParams::new(), &hidden),
            Projection::Exclude(vec!["__v".to_string(), "createdAt".to_string()])
        );
        assert_eq!(
            parse_projection(&QueryParams::parse("fields=-createdAt,-price"), &hidden),
            Projection::Exclude(vec![
                "createdAt".to_string(),
                "price".to_string(),
                "__v".to_string()
            ])
        );
        assert_eq!(
            parse_projection(&QueryParams::parse("fields=name,createdAt"), &hidden),
            Projection::Include(vec!["name".to_string(), "createdAt".to_string()])
        );
    }

    #[test]
    fn test_page_defaults_and_coercion() {
        let limits = PageLimits::default();
        assert_eq!(parse_page(&QueryParams::new(), limits), (0, 100));
        assert_eq!(
            parse_page(&QueryParams::parse("page=3&limit=10"), limits),
            (20, 10)
        );
        assert_eq!(
            parse_page(&QueryParams::parse("page=abc&limit=-4"), limits),
            (0, 100)
        );
        assert_eq!(
            parse_page(&QueryParams::parse("page=0&limit=0"), limits),
            (0, 100)
        );
        assert_eq!(
            parse_page(&QueryParams::parse("limit=100000"), limits),
            (0, 100000)
        );
    }

    #[test]
    fn test_page_ceiling_when_configured() {
        let limits = PageLimits {
            default_limit: 20,
            max_limit: Some(50),
        };
        assert_eq!(parse_page(&QueryParams::new(), limits), (0, 20));
        assert_eq!(
            parse_page(&QueryParams::parse("page=2&limit=500"), limits),
            (50, 50)
        );
    }

    #[test]
    fn test_builder_keeps_base_filter() {
        let tours = MemoryCollection::new("tours");
        let params = QueryParams::parse("difficulty=easy&page=2&limit=3");
        let query = QueryBuilder::new(find(&tours, Filter::eq("secretTour", false)), &params)
            .build();
        let spec = query.spec();

        assert_eq!(spec.filter.predicates().len(), 2);
        assert_eq!(spec.filter.predicates()[0].field(), "secretTour");
        assert_eq!(spec.sort, vec![SortKey::desc("createdAt")]);
        assert_eq!(spec.skip, 3);
        assert_eq!(spec.limit, Some(3));
    }

    #[test]
    fn test_steps_apply_independently() {
        let tours = MemoryCollection::new("tours");
        let params = QueryParams::parse("difficulty=easy&sort=name");
        let spec = QueryBuilder::new(find(&tours, Filter::new()), &params)
            .sort()
            .into_query()
            .into_spec();

        assert!(spec.filter.is_empty());
        assert_eq!(spec.sort, vec![SortKey::asc("name")]);
        assert_eq!(spec.limit, None);
        assert_eq!(spec.projection, Projection::All);
    }
}
