//! Loads tours and reviews from a JSON seed file.
//!
//! Tours are imported with reset rating statistics. Reviews then go through
//! the review service, so every tour ends up with statistics derived from the
//! reviews that were actually loaded.

use crate::core::ratings::Recalculator;
use crate::core::reviews::ReviewService;
use crate::core::tours::TourService;
use crate::domain::model::{from_document, Document, DocumentId, CREATED_AT_FIELD, ID_FIELD};
use crate::domain::ports::Collection;
use crate::domain::review::Review;
use crate::utils::error::Result;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub tours: Vec<Document>,
    pub reviews: Vec<Document>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub tours: usize,
    pub reviews: usize,
}

impl Seed {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Imports every tour, then every review. Stops at the first failure.
    pub async fn load_into<T, R, X>(
        self,
        tours: &TourService<T>,
        reviews: &ReviewService<R, T, X>,
    ) -> Result<SeedReport>
    where
        T: Collection + ?Sized,
        R: Collection + ?Sized,
        X: Recalculator + ?Sized,
    {
        let mut report = SeedReport::default();

        for document in self.tours {
            let tour = tours.import(document).await?;
            tracing::debug!("Seeded tour {} ({})", tour.id, tour.name);
            report.tours += 1;
        }

        for mut document in self.reviews {
            document
                .entry(ID_FIELD.to_string())
                .or_insert_with(|| DocumentId::new().to_value());
            document.entry(CREATED_AT_FIELD.to_string()).or_insert_with(|| {
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
            });

            let review: Review = from_document(document)?;
            reviews.save(review).await?;
            report.reviews += 1;
        }

        tracing::info!(
            "Seed loaded: {} tours, {} reviews",
            report.tours,
            report.reviews
        );
        Ok(report)
    }
}
