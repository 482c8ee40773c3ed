//! Keeps tour rating statistics in step with review writes.
//!
//! Reviews reach the store through four paths. A create carries a new review,
//! so the tour id is read off the written document. Saves, updates and
//! deletes may touch a review that already exists, so the stored review is
//! fetched before the write is issued and its tour id captured then. After a
//! delete the review can no longer be fetched, and after a save or an update
//! it may point elsewhere.

use crate::core::ratings::Recalculator;
use crate::domain::model::{to_document, Document, DocumentId};
use crate::domain::ports::Collection;
use crate::domain::rating::RatingStats;
use crate::domain::review::{Review, TOUR_FIELD};
use crate::utils::error::Result;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Every way a review can be written.
#[derive(Debug, Clone)]
pub enum ReviewWrite {
    Create(Review),
    Save(Review),
    UpdateById { id: DocumentId, fields: Document },
    DeleteById(DocumentId),
}

impl ReviewWrite {
    pub fn kind(&self) -> &'static str {
        match self {
            ReviewWrite::Create(_) => "create",
            ReviewWrite::Save(_) => "save",
            ReviewWrite::UpdateById { .. } => "update",
            ReviewWrite::DeleteById(_) => "delete",
        }
    }
}

/// Tour referenced by a stored review, if it has a readable one.
pub fn parent_of(review: &Document) -> Option<DocumentId> {
    review
        .get(TOUR_FIELD)
        .and_then(Value::as_str)
        .and_then(|raw| DocumentId::parse(TOUR_FIELD, raw).ok())
}

/// Recalculates the tour of a review that was just created.
pub async fn after_save<X: Recalculator + ?Sized>(
    recalculator: &X,
    review: &Document,
) -> Result<Option<RatingStats>> {
    match parent_of(review) {
        Some(tour_id) => Ok(Some(recalculator.recalculate(tour_id).await?)),
        None => Ok(None),
    }
}

/// Captures the tour of review `id`, runs `write`, then recalculates.
///
/// `write` is not polled until the fetch has finished. The tours named before
/// and after the write are both recalculated, once each; when neither exists
/// (an update or delete of a missing review) the write still runs and
/// nothing is recalculated.
pub async fn with_parent_id<C, X, F>(
    reviews: &C,
    recalculator: &X,
    id: DocumentId,
    write: F,
) -> Result<Option<Document>>
where
    C: Collection + ?Sized,
    X: Recalculator + ?Sized,
    F: Future<Output = Result<Option<Document>>> + Send,
{
    let before = reviews.find_by_id(id).await?.as_ref().and_then(parent_of);
    let written = write.await?;
    let after = written.as_ref().and_then(parent_of);

    let mut parents: Vec<DocumentId> = before.into_iter().collect();
    if let Some(tour_id) = after {
        if !parents.contains(&tour_id) {
            parents.push(tour_id);
        }
    }

    if parents.is_empty() {
        tracing::debug!("Review {} not found, skipping ratings recalculation", id);
    }
    for tour_id in parents {
        recalculator.recalculate(tour_id).await?;
    }
    Ok(written)
}

/// Routes each [`ReviewWrite`] to the store and to its consistency hook.
pub struct ConsistencyHooks<C: Collection + ?Sized, X: Recalculator + ?Sized> {
    reviews: Arc<C>,
    recalculator: Arc<X>,
}

impl<C: Collection + ?Sized, X: Recalculator + ?Sized> ConsistencyHooks<C, X> {
    pub fn new(reviews: Arc<C>, recalculator: Arc<X>) -> Self {
        Self {
            reviews,
            recalculator,
        }
    }

    pub fn recalculator(&self) -> &X {
        &self.recalculator
    }

    pub async fn apply(&self, write: ReviewWrite) -> Result<Option<Document>> {
        tracing::debug!("Review write: {}", write.kind());
        let reviews = &*self.reviews;
        let recalculator = &*self.recalculator;

        match write {
            ReviewWrite::Create(review) => {
                let stored = reviews.create(to_document(&review)?).await?;
                after_save(recalculator, &stored).await?;
                Ok(Some(stored))
            }
            ReviewWrite::Save(review) => {
                let document = to_document(&review)?;
                let save = async move { reviews.save(document).await.map(Some) };
                with_parent_id(reviews, recalculator, review.id, save).await
            }
            ReviewWrite::UpdateById { id, fields } => {
                with_parent_id(reviews, recalculator, id, reviews.update_by_id(id, fields)).await
            }
            ReviewWrite::DeleteById(id) => {
                with_parent_id(reviews, recalculator, id, reviews.delete_by_id(id)).await
            }
        }
    }
}
