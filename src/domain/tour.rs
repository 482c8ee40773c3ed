use crate::domain::model::DocumentId;
use crate::domain::rating::{round_rating, DEFAULT_RATINGS_AVERAGE, MAX_RATING, MIN_RATING};
use crate::utils::error::{Result, StoreError};
use crate::utils::validation::{
    validate_length, validate_non_empty_string, validate_positive_number, validate_range, Validate,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const RATINGS_AVERAGE_FIELD: &str = "ratingsAverage";
pub const RATINGS_QUANTITY_FIELD: &str = "ratingsQuantity";
pub const SECRET_TOUR_FIELD: &str = "secretTour";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoKind {
    #[default]
    Point,
}

/// A GeoJSON point, `coordinates` being `[longitude, latitude]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type", default)]
    pub kind: GeoKind,
    #[serde(default)]
    pub coordinates: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Day of the tour this stop is visited on. Unset for the start location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

impl Validate for Location {
    fn validate(&self) -> Result<()> {
        match self.coordinates.as_slice() {
            [] => Ok(()),
            [lng, lat] => {
                validate_range("coordinates.longitude", *lng, -180.0, 180.0)?;
                validate_range("coordinates.latitude", *lat, -90.0, 90.0)
            }
            _ => Err(StoreError::validation(
                "coordinates",
                "A point needs exactly [longitude, latitude]",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    pub duration: u32,
    pub max_group_size: u32,
    pub difficulty: Difficulty,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub start_dates: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub secret_tour: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_location: Option<Location>,
    #[serde(default)]
    pub locations: Vec<Location>,
    /// Users guiding the tour.
    #[serde(default)]
    pub guides: Vec<DocumentId>,
    #[serde(default = "default_ratings_average")]
    pub ratings_average: f64,
    #[serde(default)]
    pub ratings_quantity: u64,
    pub created_at: DateTime<Utc>,
}

fn default_ratings_average() -> f64 {
    DEFAULT_RATINGS_AVERAGE
}

impl Tour {
    pub fn display_rating(&self) -> String {
        format!("{:.1}", round_rating(self.ratings_average))
    }
}

/// Fields a client may supply when creating a tour. Ratings are never among them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTour {
    pub name: String,
    pub duration: u32,
    pub max_group_size: u32,
    pub difficulty: Difficulty,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub start_dates: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub secret_tour: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_location: Option<Location>,
    #[serde(default)]
    pub locations: Vec<Location>,
    /// Users guiding the tour.
    #[serde(default)]
    pub guides: Vec<DocumentId>,
}

impl NewTour {
    pub fn into_tour(self, default_average: f64) -> Tour {
        Tour {
            id: DocumentId::new(),
            slug: slugify(&self.name),
            name: self.name.trim().to_string(),
            duration: self.duration,
            max_group_size: self.max_group_size,
            difficulty: self.difficulty,
            price: self.price,
            price_discount: self.price_discount,
            summary: self.summary.trim().to_string(),
            description: self.description.map(|d| d.trim().to_string()),
            image_cover: self.image_cover,
            images: self.images,
            start_dates: self.start_dates,
            secret_tour: self.secret_tour,
            start_location: self.start_location,
            locations: self.locations,
            guides: self.guides,
            ratings_average: round_rating(default_average),
            ratings_quantity: 0,
            created_at: Utc::now(),
        }
    }
}

impl Validate for NewTour {
    fn validate(&self) -> Result<()> {
        validate_tour(&TourRules {
            name: &self.name,
            duration: self.duration,
            max_group_size: self.max_group_size,
            image_cover: &self.image_cover,
            price: self.price,
            price_discount: self.price_discount,
            start_location: self.start_location.as_ref(),
            locations: &self.locations,
        })
    }
}

impl Validate for Tour {
    fn validate(&self) -> Result<()> {
        validate_tour(&TourRules {
            name: &self.name,
            duration: self.duration,
            max_group_size: self.max_group_size,
            image_cover: &self.image_cover,
            price: self.price,
            price_discount: self.price_discount,
            start_location: self.start_location.as_ref(),
            locations: &self.locations,
        })?;
        validate_range(
            RATINGS_AVERAGE_FIELD,
            self.ratings_average,
            MIN_RATING,
            MAX_RATING,
        )
    }
}

/// The client-writable part of a tour, checked the same way on create and update.
struct TourRules<'a> {
    name: &'a str,
    duration: u32,
    max_group_size: u32,
    image_cover: &'a str,
    price: f64,
    price_discount: Option<f64>,
    start_location: Option<&'a Location>,
    locations: &'a [Location],
}

fn validate_tour(tour: &TourRules<'_>) -> Result<()> {
    validate_length("name", tour.name, 10, 40)?;
    validate_positive_number("duration", tour.duration as usize, 1)?;
    validate_positive_number("maxGroupSize", tour.max_group_size as usize, 1)?;
    validate_non_empty_string("imageCover", tour.image_cover)?;
    if tour.price.is_nan() || tour.price <= 0.0 {
        return Err(StoreError::validation("price", "A tour must have a price"));
    }
    if let Some(discount) = tour.price_discount {
        if discount >= tour.price {
            return Err(StoreError::validation(
                "priceDiscount",
                format!(
                    "Discount price ({}) should be below regular price",
                    discount
                ),
            ));
        }
    }
    if let Some(start) = tour.start_location {
        start.validate()?;
    }
    tour.locations.iter().try_for_each(Validate::validate)
}

/// Lowercases and hyphenates a name into a URL-safe slug.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut prev_was_hyphen = true;
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            prev_was_hyphen = false;
        } else if !prev_was_hyphen {
            slug.push('-');
            prev_was_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
