//! Recomputes the denormalized rating statistics stored on a tour.
//!
//! The aggregate read and the tour write are two separate store operations
//! with no transaction around them. Two recalculations for the same tour
//! running concurrently may interleave, and the last write wins; the next
//! recalculation for that tour corrects any stale result.

use crate::domain::model::{Document, DocumentId};
use crate::domain::ports::{Collection, Reducer};
use crate::domain::query::Filter;
use crate::domain::rating::{RatingStats, DEFAULT_RATINGS_AVERAGE};
use crate::domain::review::{RATING_FIELD, TOUR_FIELD};
use crate::domain::tour::{RATINGS_AVERAGE_FIELD, RATINGS_QUANTITY_FIELD};
use crate::utils::error::{Result, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const COUNT: &str = "nRating";
const AVERAGE: &str = "avgRating";

#[async_trait]
pub trait Recalculator: Send + Sync {
    /// Recounts the tour's reviews and stores the result on the tour.
    async fn recalculate(&self, tour_id: DocumentId) -> Result<RatingStats>;
}

pub struct AverageRatings<R: Collection + ?Sized, T: Collection + ?Sized> {
    reviews: Arc<R>,
    tours: Arc<T>,
    default_average: f64,
}

impl<R: Collection + ?Sized, T: Collection + ?Sized> AverageRatings<R, T> {
    pub fn new(reviews: Arc<R>, tours: Arc<T>) -> Self {
        Self {
            reviews,
            tours,
            default_average: DEFAULT_RATINGS_AVERAGE,
        }
    }

    pub fn with_default_average(mut self, default_average: f64) -> Self {
        self.default_average = default_average;
        self
    }

    /// Reads the current statistics without writing them anywhere.
    pub async fn stats(&self, tour_id: DocumentId) -> Result<RatingStats> {
        let groups = self
            .reviews
            .aggregate_by_key(
                &Filter::eq(TOUR_FIELD, tour_id.to_value()),
                TOUR_FIELD,
                &[Reducer::count(COUNT), Reducer::avg(AVERAGE, RATING_FIELD)],
            )
            .await?;

        Ok(match groups.first() {
            Some(group) => RatingStats::new(
                group.number(COUNT).unwrap_or(0.0) as u64,
                group.number(AVERAGE).unwrap_or(f64::NAN),
                self.default_average,
            ),
            None => RatingStats::empty(self.default_average),
        })
    }
}

#[async_trait]
impl<R: Collection + ?Sized, T: Collection + ?Sized> Recalculator for AverageRatings<R, T> {
    async fn recalculate(&self, tour_id: DocumentId) -> Result<RatingStats> {
        let stats = self.stats(tour_id).await?;

        let mut fields = Document::new();
        fields.insert(
            RATINGS_QUANTITY_FIELD.to_string(),
            Value::from(stats.quantity),
        );
        fields.insert(RATINGS_AVERAGE_FIELD.to_string(), Value::from(stats.average));

        match self.tours.update_by_id(tour_id, fields).await {
            Ok(Some(_)) => {
                tracing::debug!(
                    "Tour {} ratings: {} reviews, average {}",
                    tour_id,
                    stats.quantity,
                    stats.average
                );
            }
            Ok(None) => {
                tracing::warn!("Tour {} no longer exists, ratings not stored", tour_id);
            }
            Err(err) => {
                return Err(StoreError::AggregateWriteFailure {
                    tour_id: tour_id.to_string(),
                    source: Box::new(err),
                });
            }
        }
        Ok(stats)
    }
}
