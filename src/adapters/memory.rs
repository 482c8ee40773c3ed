use crate::adapters::matcher::{group_by, matches, project, sort_documents};
use crate::domain::model::{get_path, Document, DocumentId, CREATED_AT_FIELD, ID_FIELD, VERSION_FIELD};
use crate::domain::ports::{Collection, Group, Reducer};
use crate::domain::query::{Filter, QuerySpec};
use crate::domain::review::{TOUR_FIELD, USER_FIELD};
use crate::utils::error::{Result, StoreError};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A document collection held in process memory.
///
/// Each operation takes the collection lock for its own duration only, so a
/// caller's read-then-write sequence can interleave with other callers.
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<Document>>,
    unique_indexes: Vec<Vec<String>>,
}

impl MemoryCollection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            documents: RwLock::new(Vec::new()),
            unique_indexes: Vec::new(),
        }
    }

    /// Rejects writes that would leave two documents sharing all of `fields`.
    pub fn with_unique_index(mut self, fields: &[&str]) -> Self {
        self.unique_indexes
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// `documents` must not contain the candidate's previous version.
    fn check_unique(&self, documents: &[Document], candidate: &Document) -> Result<()> {
        let candidate_id = DocumentId::of(candidate);
        for index in &self.unique_indexes {
            let values: Option<Vec<&Value>> =
                index.iter().map(|field| get_path(candidate, field)).collect();
            let Some(values) = values else {
                continue;
            };
            let clash = documents.iter().any(|doc| {
                DocumentId::of(doc) != candidate_id
                    && index
                        .iter()
                        .zip(&values)
                        .all(|(field, value)| get_path(doc, field) == Some(*value))
            });
            if clash {
                return Err(self.duplicate(index));
            }
        }
        Ok(())
    }

    fn duplicate(&self, fields: &[String]) -> StoreError {
        StoreError::DuplicateKey {
            collection: self.name.clone(),
            fields: fields.join(", "),
        }
    }

    fn position(documents: &[Document], id: DocumentId) -> Option<usize> {
        documents
            .iter()
            .position(|doc| DocumentId::of(doc) == Some(id))
    }
}

fn version_of(document: &Document) -> u64 {
    document
        .get(VERSION_FIELD)
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn stamp_new(mut document: Document) -> Document {
    if DocumentId::of(&document).is_none() {
        document.insert(ID_FIELD.to_string(), DocumentId::new().to_value());
    }
    document
        .entry(VERSION_FIELD.to_string())
        .or_insert_with(|| Value::from(0u64));
    document
        .entry(CREATED_AT_FIELD.to_string())
        .or_insert_with(|| {
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
        });
    document
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, spec: &QuerySpec) -> Result<Vec<Document>> {
        let mut selected: Vec<Document> = {
            let documents = self.documents.read().await;
            documents
                .iter()
                .filter(|doc| matches(doc, &spec.filter))
                .cloned()
                .collect()
        };
        sort_documents(&mut selected, &spec.sort);

        let page = selected
            .into_iter()
            .skip(spec.skip)
            .take(spec.limit.unwrap_or(usize::MAX))
            .map(|doc| project(doc, &spec.projection))
            .collect::<Vec<_>>();

        tracing::trace!("{}: query returned {} documents", self.name, page.len());
        Ok(page)
    }

    async fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(Self::position(&documents, id).map(|idx| documents[idx].clone()))
    }

    async fn create(&self, fields: Document) -> Result<Document> {
        let document = stamp_new(fields);
        let mut documents = self.documents.write().await;
        if let Some(id) = DocumentId::of(&document) {
            if Self::position(&documents, id).is_some() {
                return Err(self.duplicate(&[ID_FIELD.to_string()]));
            }
        }
        self.check_unique(&documents, &document)?;
        documents.push(document.clone());
        Ok(document)
    }

    async fn save(&self, document: Document) -> Result<Document> {
        let mut document = stamp_new(document);
        let mut documents = self.documents.write().await;
        let existing = DocumentId::of(&document).and_then(|id| Self::position(&documents, id));

        match existing {
            Some(idx) => {
                let previous = documents.remove(idx);
                document.insert(
                    VERSION_FIELD.to_string(),
                    Value::from(version_of(&previous) + 1),
                );
                if let Err(err) = self.check_unique(&documents, &document) {
                    documents.insert(idx, previous);
                    return Err(err);
                }
                documents.insert(idx, document.clone());
            }
            None => {
                self.check_unique(&documents, &document)?;
                documents.push(document.clone());
            }
        }
        Ok(document)
    }

    async fn update_by_id(&self, id: DocumentId, fields: Document) -> Result<Option<Document>> {
        let mut documents = self.documents.write().await;
        let Some(idx) = Self::position(&documents, id) else {
            return Ok(None);
        };

        let previous = documents.remove(idx);
        let mut updated = previous.clone();
        for (key, value) in fields {
            if key != ID_FIELD && key != VERSION_FIELD {
                updated.insert(key, value);
            }
        }
        updated.insert(
            VERSION_FIELD.to_string(),
            Value::from(version_of(&previous) + 1),
        );

        if let Err(err) = self.check_unique(&documents, &updated) {
            documents.insert(idx, previous);
            return Err(err);
        }
        documents.insert(idx, updated.clone());
        Ok(Some(updated))
    }

    async fn delete_by_id(&self, id: DocumentId) -> Result<Option<Document>> {
        let mut documents = self.documents.write().await;
        Ok(Self::position(&documents, id).map(|idx| documents.remove(idx)))
    }

    async fn aggregate_by_key(
        &self,
        matching: &Filter,
        group_key: &str,
        reducers: &[Reducer],
    ) -> Result<Vec<Group>> {
        let documents = self.documents.read().await;
        Ok(group_by(
            documents.iter().filter(|doc| matches(doc, matching)),
            group_key,
            reducers,
        ))
    }
}

/// The collections of one application store, with their indexes declared.
#[derive(Clone)]
pub struct MemoryStore {
    pub tours: Arc<MemoryCollection>,
    pub reviews: Arc<MemoryCollection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_names("tours", "reviews")
    }

    pub fn with_names(tours: &str, reviews: &str) -> Self {
        Self {
            tours: Arc::new(MemoryCollection::new(tours).with_unique_index(&["name"])),
            reviews: Arc::new(
                MemoryCollection::new(reviews).with_unique_index(&[TOUR_FIELD, USER_FIELD]),
            ),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
