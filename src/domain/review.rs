use crate::domain::model::DocumentId;
use crate::domain::rating::{MAX_RATING, MIN_RATING};
use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, validate_range, Validate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TOUR_FIELD: &str = "tour";
pub const USER_FIELD: &str = "user";
pub const RATING_FIELD: &str = "rating";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub review: String,
    pub rating: f64,
    pub tour: DocumentId,
    pub user: DocumentId,
    pub created_at: DateTime<Utc>,
}

impl Validate for Review {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("review", &self.review)?;
        validate_range(RATING_FIELD, self.rating, MIN_RATING, MAX_RATING)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub review: String,
    pub rating: f64,
}

impl NewReview {
    pub fn into_review(self, tour: DocumentId, user: DocumentId) -> Review {
        Review {
            id: DocumentId::new(),
            review: self.review.trim().to_string(),
            rating: self.rating,
            tour,
            user,
            created_at: Utc::now(),
        }
    }
}

/// Partial update. Only the fields that are set are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tour: Option<DocumentId>,
}

impl Validate for ReviewPatch {
    fn validate(&self) -> Result<()> {
        if let Some(review) = &self.review {
            validate_non_empty_string("review", review)?;
        }
        if let Some(rating) = self.rating {
            validate_range(RATING_FIELD, rating, MIN_RATING, MAX_RATING)?;
        }
        Ok(())
    }
}
