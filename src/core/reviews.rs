use crate::core::hooks::{ConsistencyHooks, ReviewWrite};
use crate::core::query_builder::{PageLimits, QueryBuilder};
use crate::core::ratings::{AverageRatings, Recalculator};
use crate::core::tours::visible_tour;
use crate::domain::model::{from_document, to_document, Document, DocumentId};
use crate::domain::ports::{find, Collection, SettingsProvider};
use crate::domain::query::{Filter, QueryParams};
use crate::domain::review::{NewReview, Review, ReviewPatch, TOUR_FIELD, USER_FIELD};
use crate::utils::error::{Result, StoreError};
use crate::utils::validation::Validate;
use std::sync::Arc;

/// Review CRUD. Every write is routed through [`ConsistencyHooks`].
pub struct ReviewService<R, T, X = AverageRatings<R, T>>
where
    R: Collection + ?Sized,
    T: Collection + ?Sized,
    X: Recalculator + ?Sized,
{
    reviews: Arc<R>,
    tours: Arc<T>,
    hooks: ConsistencyHooks<R, X>,
    limits: PageLimits,
}

impl<R, T> ReviewService<R, T>
where
    R: Collection + ?Sized + 'static,
    T: Collection + ?Sized + 'static,
{
    pub fn new(reviews: Arc<R>, tours: Arc<T>, settings: &dyn SettingsProvider) -> Self {
        let recalculator = AverageRatings::new(reviews.clone(), tours.clone())
            .with_default_average(settings.default_ratings_average());
        Self::with_recalculator(reviews, tours, Arc::new(recalculator), settings)
    }
}

impl<R, T, X> ReviewService<R, T, X>
where
    R: Collection + ?Sized,
    T: Collection + ?Sized,
    X: Recalculator + ?Sized,
{
    pub fn with_recalculator(
        reviews: Arc<R>,
        tours: Arc<T>,
        recalculator: Arc<X>,
        settings: &dyn SettingsProvider,
    ) -> Self {
        Self {
            hooks: ConsistencyHooks::new(reviews.clone(), recalculator),
            reviews,
            tours,
            limits: PageLimits {
                default_limit: settings.default_page_limit(),
                max_limit: settings.max_page_limit(),
            },
        }
    }

    pub fn recalculator(&self) -> &X {
        self.hooks.recalculator()
    }

    /// Lists reviews, optionally only those of one tour.
    pub async fn list(&self, tour: Option<DocumentId>, params: &QueryParams) -> Result<Vec<Document>> {
        let base = match tour {
            Some(tour_id) => Filter::eq(TOUR_FIELD, tour_id.to_value()),
            None => Filter::new(),
        };
        QueryBuilder::new(find(&*self.reviews, base), params)
            .with_limits(self.limits)
            .build()
            .await
    }

    pub async fn list_for_user(&self, user: DocumentId) -> Result<Vec<Review>> {
        self.reviews
            .find(&Filter::eq(USER_FIELD, user.to_value()))
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn get(&self, id: DocumentId) -> Result<Option<Review>> {
        self.reviews
            .find_by_id(id)
            .await?
            .map(from_document)
            .transpose()
    }

    /// Creates the review of `user` for `tour`. The tour must exist and be visible.
    pub async fn create(&self, tour: DocumentId, user: DocumentId, new_review: NewReview) -> Result<Review> {
        let review = new_review.into_review(tour, user);
        review.validate()?;
        self.ensure_tour(tour).await?;

        let stored = self.write(ReviewWrite::Create(review)).await?;
        tracing::info!("User {} reviewed tour {}", user, tour);
        Ok(stored)
    }

    /// Writes back a review held in memory, inserting it if it is new.
    pub async fn save(&self, review: Review) -> Result<Review> {
        review.validate()?;
        self.ensure_tour(review.tour).await?;
        self.write(ReviewWrite::Save(review)).await
    }

    pub async fn update(&self, id: DocumentId, patch: ReviewPatch) -> Result<Option<Review>> {
        patch.validate()?;
        if let Some(tour) = patch.tour {
            self.ensure_tour(tour).await?;
        }
        self.hooks
            .apply(ReviewWrite::UpdateById {
                id,
                fields: to_document(&patch)?,
            })
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn delete(&self, id: DocumentId) -> Result<Option<Review>> {
        self.hooks
            .apply(ReviewWrite::DeleteById(id))
            .await?
            .map(from_document)
            .transpose()
    }

    async fn write(&self, write: ReviewWrite) -> Result<Review> {
        match self.hooks.apply(write).await? {
            Some(stored) => from_document(stored),
            None => Err(StoreError::BackendError {
                message: format!("{} returned no document", self.reviews.name()),
            }),
        }
    }

    async fn ensure_tour(&self, tour: DocumentId) -> Result<()> {
        let found = find(&*self.tours, visible_tour(tour)).limit(1).await?;
        if found.is_empty() {
            return Err(StoreError::ParentNotFound {
                id: tour.to_string(),
            });
        }
        Ok(())
    }
}
