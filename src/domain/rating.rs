use serde::{Deserialize, Serialize};

/// Average shown for a tour nobody has reviewed yet.
pub const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;

pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 5.0;

/// Rounds a rating to one decimal place. Every stored or displayed average goes through here.
pub fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// The denormalized `{count, average}` pair kept on a tour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingStats {
    pub quantity: u64,
    pub average: f64,
}

impl RatingStats {
    pub fn empty(default_average: f64) -> Self {
        Self {
            quantity: 0,
            average: round_rating(default_average),
        }
    }

    /// Zero ratings fall back to `default_average` rather than a meaningless mean.
    pub fn new(quantity: u64, mean: f64, default_average: f64) -> Self {
        if quantity == 0 || !mean.is_finite() {
            return Self::empty(default_average);
        }
        Self {
            quantity,
            average: round_rating(mean),
        }
    }
}
