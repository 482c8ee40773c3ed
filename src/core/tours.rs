use crate::core::query_builder::{PageLimits, QueryBuilder};
use crate::domain::model::{
    from_document, to_document, Document, DocumentId, CREATED_AT_FIELD, ID_FIELD, VERSION_FIELD,
};
use crate::domain::ports::{find, Collection, SettingsProvider};
use crate::domain::query::{Comparison, Filter, QueryParams};
use crate::domain::tour::{
    slugify, NewTour, Tour, RATINGS_AVERAGE_FIELD, RATINGS_QUANTITY_FIELD, SECRET_TOUR_FIELD,
};
use crate::utils::error::{Result, StoreError};
use crate::utils::validation::Validate;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Fields no tour write may set directly.
const PROTECTED_FIELDS: [&str; 4] = [
    ID_FIELD,
    VERSION_FIELD,
    RATINGS_AVERAGE_FIELD,
    RATINGS_QUANTITY_FIELD,
];

/// Every tour read goes through this filter, so secret tours never surface.
pub fn visible_tours() -> Filter {
    Filter::compare(SECRET_TOUR_FIELD, Comparison::Ne, true)
}

pub fn visible_tour(id: DocumentId) -> Filter {
    Filter::eq(ID_FIELD, id.to_value()).merge(visible_tours())
}

pub struct TourService<T: Collection + ?Sized> {
    tours: Arc<T>,
    limits: PageLimits,
    default_average: f64,
}

impl<T: Collection + ?Sized> TourService<T> {
    pub fn new(tours: Arc<T>, settings: &dyn SettingsProvider) -> Self {
        Self {
            tours,
            limits: PageLimits {
                default_limit: settings.default_page_limit(),
                max_limit: settings.max_page_limit(),
            },
            default_average: settings.default_ratings_average(),
        }
    }

    pub async fn list(&self, params: &QueryParams) -> Result<Vec<Document>> {
        QueryBuilder::new(find(&*self.tours, visible_tours()), params)
            .with_limits(self.limits)
            .hide_fields(&[CREATED_AT_FIELD])
            .build()
            .await
    }

    pub async fn get(&self, id: DocumentId) -> Result<Option<Tour>> {
        let found = find(&*self.tours, visible_tour(id)).limit(1).await?;
        found.into_iter().next().map(from_document).transpose()
    }

    pub async fn create(&self, new_tour: NewTour) -> Result<Tour> {
        new_tour.validate()?;
        let tour = new_tour.into_tour(self.default_average);
        let stored = self.tours.create(to_document(&tour)?).await?;
        tracing::info!("Created tour {} ({})", tour.id, tour.slug);
        from_document(stored)
    }

    /// Stores a tour as given, keeping its identifier but resetting its
    /// rating statistics to the no-review defaults.
    pub async fn import(&self, mut document: Document) -> Result<Tour> {
        document
            .entry(ID_FIELD.to_string())
            .or_insert_with(|| DocumentId::new().to_value());
        document.insert(RATINGS_QUANTITY_FIELD.to_string(), Value::from(0u64));
        document.insert(
            RATINGS_AVERAGE_FIELD.to_string(),
            Value::from(self.default_average),
        );
        document.entry(CREATED_AT_FIELD.to_string()).or_insert_with(|| {
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
        });

        let mut tour: Tour = from_document(document)?;
        if tour.slug.is_empty() {
            tour.slug = slugify(&tour.name);
        }
        from_document(self.tours.save(to_document(&tour)?).await?)
    }

    /// Applies `fields` to a visible tour. The merged tour must still pass
    /// validation; keys that are not tour fields are dropped.
    pub async fn update(&self, id: DocumentId, mut fields: Document) -> Result<Option<Tour>> {
        for field in PROTECTED_FIELDS {
            if fields.remove(field).is_some() {
                tracing::debug!("Ignoring write to protected tour field `{}`", field);
            }
        }

        let Some(current) = find(&*self.tours, visible_tour(id))
            .limit(1)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        let mut merged = current;
        merged.extend(fields.clone());
        let tour: Tour = serde_json::from_value(Value::Object(merged))
            .map_err(|e| StoreError::validation("tour", e.to_string()))?;
        tour.validate()?;

        // Write the normalized values of the supplied keys only, so a
        // concurrent recalculation of the rating fields is not overwritten.
        let typed = to_document(&tour)?;
        let mut changes = Document::new();
        for (key, value) in fields {
            match typed.get(&key) {
                Some(normalized) => {
                    changes.insert(key, normalized.clone());
                }
                // Optional field being cleared.
                None if value.is_null() => {
                    changes.insert(key, Value::Null);
                }
                None => tracing::debug!("Ignoring unknown tour field `{}`", key),
            }
        }

        self.tours
            .update_by_id(id, changes)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn delete(&self, id: DocumentId) -> Result<Option<Tour>> {
        if self.get(id).await?.is_none() {
            return Ok(None);
        }
        self.tours
            .delete_by_id(id)
            .await?
            .map(from_document)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryCollection, MemoryStore};
    use crate::config::AppConfig;
    use crate::domain::tour::Difficulty;
    use serde_json::json;

    fn new_tour(name: &str, price: f64, secret: bool) -> NewTour {
        NewTour {
            name: name.to_string(),
            duration: 7,
            max_group_size: 15,
            difficulty: Difficulty::Medium,
            price,
            price_discount: None,
            summary: "Exploring the jaw-dropping US east coast by foot and by boat".to_string(),
            description: None,
            image_cover: "tour-2-cover.jpg".to_string(),
            images: vec![],
            start_dates: vec![],
            secret_tour: secret,
            start_location: None,
            locations: vec![],
            guides: vec![],
        }
    }

    fn service() -> TourService<MemoryCollection> {
        TourService::new(MemoryStore::new().tours, &AppConfig::default())
    }

    #[tokio::test]
    async fn test_secret_tours_are_hidden() {
        let tours = service();
        tours.create(new_tour("The Sea Explorer", 497.0, false)).await.unwrap();
        let secret = tours
            .create(new_tour("The Secret Super Tour", 9997.0, true))
            .await
            .unwrap();

        let listed = tours.list(&QueryParams::new()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["name"], json!("The Sea Explorer"));
        assert!(tours.get(secret.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_ignores_rating_fields() {
        let tours = service();
        let tour = tours.create(new_tour("The Sea Explorer", 497.0, false)).await.unwrap();

        let fields = json!({ "price": 450, "ratingsAverage": 1.0, "ratingsQuantity": 99 });
        let updated = tours
            .update(tour.id, fields.as_object().cloned().unwrap())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.price, 450.0);
        assert_eq!(updated.ratings_average, 4.5);
        assert_eq!(updated.ratings_quantity, 0);
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_values() {
        let tours = service();
        let tour = tours.create(new_tour("The Sea Explorer", 497.0, false)).await.unwrap();

        let fields = json!({ "difficulty": "extreme" });
        let err = tours
            .update(tour.id, fields.as_object().cloned().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ValidationError { .. }));
        assert_eq!(
            tours.get(tour.id).await.unwrap().unwrap().difficulty,
            Difficulty::Medium
        );
    }

    #[tokio::test]
    async fn test_update_applies_tour_rules() {
        let tours = service();
        let tour = tours.create(new_tour("The Sea Explorer", 497.0, false)).await.unwrap();

        for fields in [
            json!({ "name": "Short" }),
            json!({ "name": "A name far too long to fit on any tour card" }),
            json!({ "priceDiscount": 497 }),
            json!({ "price": 100, "priceDiscount": 150 }),
        ] {
            let err = tours
                .update(tour.id, fields.as_object().cloned().unwrap())
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::ValidationError { .. }), "{fields}");
        }

        let stored = tours.get(tour.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "The Sea Explorer");
        assert_eq!(stored.price, 497.0);
        assert_eq!(stored.price_discount, None);
    }

    #[tokio::test]
    async fn test_update_drops_unknown_fields_and_clears_optionals() {
        let tours = service();
        let mut new = new_tour("The Sea Explorer", 497.0, false);
        new.price_discount = Some(397.0);
        let tour = tours.create(new).await.unwrap();

        let fields = json!({ "priceDiscount": null, "popularity": 11 });
        let updated = tours
            .update(tour.id, fields.as_object().cloned().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.price_discount, None);

        let listed = tours.list(&QueryParams::parse("fields=popularity")).await.unwrap();
        assert!(!listed[0].contains_key("popularity"));
    }

    #[tokio::test]
    async fn test_created_at_hidden_unless_selected() {
        let tours = service();
        tours.create(new_tour("The Sea Explorer", 497.0, false)).await.unwrap();

        let listed = tours.list(&QueryParams::new()).await.unwrap();
        assert!(!listed[0].contains_key(CREATED_AT_FIELD));
        assert!(!listed[0].contains_key(VERSION_FIELD));

        let selected = tours
            .list(&QueryParams::parse("fields=name,createdAt"))
            .await
            .unwrap();
        assert!(selected[0].contains_key(CREATED_AT_FIELD));
    }

    #[tokio::test]
    async fn test_import_keeps_locations_and_guides() {
        let tours = service();
        let guide = DocumentId::new();
        let document = json!({
            "name": "The Northern Lights",
            "duration": 3,
            "maxGroupSize": 12,
            "difficulty": "easy",
            "price": 1497,
            "imageCover": "tour-9-cover.jpg",
            "startLocation": {
                "type": "Point",
                "coordinates": [-18.9, 64.9],
                "address": "Reykjavik, Iceland",
                "description": "Iceland"
            },
            "locations": [
                { "coordinates": [-21.9, 64.1], "description": "Reykjavik", "day": 1 }
            ],
            "guides": [guide.to_string()]
        });

        let tour = tours
            .import(document.as_object().cloned().unwrap())
            .await
            .unwrap();
        let start = tour.start_location.as_ref().unwrap();
        assert_eq!(start.coordinates, vec![-18.9, 64.9]);
        assert_eq!(tour.locations[0].day, Some(1));
        assert_eq!(tour.guides, vec![guide]);

        let listed = tours
            .list(&QueryParams::parse("fields=startLocation,guides"))
            .await
            .unwrap();
        assert_eq!(listed[0]["startLocation"]["address"], json!("Reykjavik, Iceland"));
        assert_eq!(listed[0]["startLocation"]["type"], json!("Point"));
        assert_eq!(listed[0]["guides"], json!([guide.to_string()]));
    }

    #[tokio::test]
    async fn test_duplicate_tour_name() {
        let tours = service();
        tours.create(new_tour("The Sea Explorer", 497.0, false)).await.unwrap();
        let err = tours
            .create(new_tour("The Sea Explorer", 397.0, false))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn test_import_resets_ratings() {
        let tours = service();
        let id = DocumentId::new();
        let document = json!({
            "_id": id.to_string(),
            "name": "The Forest Hiker",
            "duration": 5,
            "maxGroupSize": 25,
            "difficulty": "easy",
            "price": 397,
            "imageCover": "tour-1-cover.jpg",
            "ratingsAverage": 4.8,
            "ratingsQuantity": 37
        });

        let tour = tours
            .import(document.as_object().cloned().unwrap())
            .await
            .unwrap();
        assert_eq!(tour.id, id);
        assert_eq!(tour.slug, "the-forest-hiker");
        assert_eq!(tour.ratings_quantity, 0);
        assert_eq!(tour.ratings_average, 4.5);
    }

    #[tokio::test]
    async fn test_delete() {
        let tours = service();
        let tour = tours.create(new_tour("The Sea Explorer", 497.0, false)).await.unwrap();
        assert!(tours.delete(tour.id).await.unwrap().is_some());
        assert!(tours.delete(tour.id).await.unwrap().is_none());
    }
}
