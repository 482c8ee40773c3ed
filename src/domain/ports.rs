use crate::domain::model::{Document, DocumentId};
use crate::domain::query::{Filter, Projection, QuerySpec, SortKey};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::{Future, IntoFuture};
use std::pin::Pin;

#[derive(Debug, Clone, PartialEq)]
pub enum Reducer {
    /// Number of documents in the group.
    Count { name: String },
    /// Arithmetic mean of a numeric field; `null` when no document carries it.
    Avg { name: String, field: String },
}

impl Reducer {
    pub fn count(name: &str) -> Self {
        Reducer::Count {
            name: name.to_string(),
        }
    }

    pub fn avg(name: &str, field: &str) -> Self {
        Reducer::Avg {
            name: name.to_string(),
            field: field.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Reducer::Count { name } | Reducer::Avg { name, .. } => name,
        }
    }
}

/// One row of a grouped aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: Value,
    pub values: Map<String, Value>,
}

impl Group {
    pub fn number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }
}

pub trait SettingsProvider: Send + Sync {
    fn default_ratings_average(&self) -> f64;
    fn default_page_limit(&self) -> usize;
    fn max_page_limit(&self) -> Option<usize>;
}

/// Data access for one collection of documents.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Executes a full query specification.
    async fn run(&self, spec: &QuerySpec) -> Result<Vec<Document>>;

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        self.run(&QuerySpec::new(filter.clone())).await
    }

    async fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>>;

    /// Inserts a new document, assigning `_id`, `__v` and `createdAt` when absent.
    async fn create(&self, fields: Document) -> Result<Document>;

    /// Writes a whole in-memory document back, inserting it if it is new.
    async fn save(&self, document: Document) -> Result<Document>;

    /// Merges `fields` into the stored document and returns the updated version.
    async fn update_by_id(&self, id: DocumentId, fields: Document) -> Result<Option<Document>>;

    /// Removes the document and returns what was removed.
    async fn delete_by_id(&self, id: DocumentId) -> Result<Option<Document>>;

    async fn aggregate_by_key(
        &self,
        matching: &Filter,
        group_key: &str,
        reducers: &[Reducer],
    ) -> Result<Vec<Group>>;
}

/// An unexecuted query over a collection. Refine it, then `.await` it.
pub struct Find<'c, C: Collection + ?Sized> {
    collection: &'c C,
    spec: QuerySpec,
}

impl<'c, C: Collection + ?Sized> Find<'c, C> {
    pub fn new(collection: &'c C, filter: Filter) -> Self {
        Self {
            collection,
            spec: QuerySpec::new(filter),
        }
    }

    /// ANDs more predicates onto the query.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.spec.filter = std::mem::take(&mut self.spec.filter).merge(filter);
        self
    }

    pub fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.spec.sort = keys;
        self
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.spec.projection = projection;
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.spec.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn into_spec(self) -> QuerySpec {
        self.spec
    }

    pub async fn exec(self) -> Result<Vec<Document>> {
        self.collection.run(&self.spec).await
    }
}

impl<'c, C: Collection + ?Sized> IntoFuture for Find<'c, C> {
    type Output = Result<Vec<Document>>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'c>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.exec())
    }
}

/// Starts a query over `collection`.
pub fn find<C: Collection + ?Sized>(collection: &C, filter: Filter) -> Find<'_, C> {
    Find::new(collection, filter)
}
