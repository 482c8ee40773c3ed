use std::sync::Arc;
use tourbook::domain::review::{NewReview, ReviewPatch};
use tourbook::domain::tour::{Difficulty, NewTour, Tour};
use tourbook::{
    AppConfig, DocumentId, MemoryCollection, MemoryStore, QueryParams, Recalculator,
    ReviewService, StoreError, TourService,
};

struct App {
    tours: TourService<MemoryCollection>,
    reviews: ReviewService<MemoryCollection, MemoryCollection>,
}

fn app() -> App {
    let store = MemoryStore::new();
    let config = AppConfig::default();
    App {
        tours: TourService::new(store.tours.clone(), &config),
        reviews: ReviewService::new(store.reviews, store.tours, &config),
    }
}

fn new_tour(name: &str, secret: bool) -> NewTour {
    NewTour {
        name: name.to_string(),
        duration: 7,
        max_group_size: 15,
        difficulty: Difficulty::Medium,
        price: 497.0,
        price_discount: None,
        summary: "Exploring the jaw-dropping US east coast".to_string(),
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

fn rated(rating: f64) -> NewReview {
    NewReview {
        review: "Really enjoyed it".to_string(),
        rating,
    }
}

async fn stored(app: &App, id: DocumentId) -> Tour {
    app.tours.get(id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_new_tour_has_default_ratings() {
    let app = app();
    let tour = app.tours.create(new_tour("The Sea Explorer", false)).await.unwrap();
    assert_eq!(tour.ratings_quantity, 0);
    assert_eq!(tour.ratings_average, 4.5);

    let stats = app.reviews.recalculator().recalculate(tour.id).await.unwrap();
    assert_eq!((stats.quantity, stats.average), (0, 4.5));
}

#[tokio::test]
async fn test_create_and_delete_keep_ratings_in_step() {
    let app = app();
    let tour = app.tours.create(new_tour("The Sea Explorer", false)).await.unwrap();

    app.reviews.create(tour.id, DocumentId::new(), rated(5.0)).await.unwrap();
    app.reviews.create(tour.id, DocumentId::new(), rated(4.0)).await.unwrap();
    let lowest = app
        .reviews
        .create(tour.id, DocumentId::new(), rated(3.0))
        .await
        .unwrap();

    let after_create = stored(&app, tour.id).await;
    assert_eq!(after_create.ratings_quantity, 3);
    assert_eq!(after_create.ratings_average, 4.0);

    let removed = app.reviews.delete(lowest.id).await.unwrap().unwrap();
    assert_eq!(removed.id, lowest.id);

    let after_delete = stored(&app, tour.id).await;
    assert_eq!(after_delete.ratings_quantity, 2);
    assert_eq!(after_delete.ratings_average, 4.5);
}

#[tokio::test]
async fn test_deleting_last_review_restores_default() {
    let app = app();
    let tour = app.tours.create(new_tour("The Sea Explorer", false)).await.unwrap();
    let only = app
        .reviews
        .create(tour.id, DocumentId::new(), rated(2.0))
        .await
        .unwrap();
    assert_eq!(stored(&app, tour.id).await.ratings_average, 2.0);

    app.reviews.delete(only.id).await.unwrap();
    let tour = stored(&app, tour.id).await;
    assert_eq!(tour.ratings_quantity, 0);
    assert_eq!(tour.ratings_average, 4.5);
}

#[tokio::test]
async fn test_recalculation_is_idempotent() {
    let app = app();
    let tour = app.tours.create(new_tour("The Sea Explorer", false)).await.unwrap();
    app.reviews.create(tour.id, DocumentId::new(), rated(4.0)).await.unwrap();
    app.reviews.create(tour.id, DocumentId::new(), rated(5.0)).await.unwrap();

    let first = app.reviews.recalculator().recalculate(tour.id).await.unwrap();
    let second = app.reviews.recalculator().recalculate(tour.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(stored(&app, tour.id).await.ratings_average, 4.5);
}

#[tokio::test]
async fn test_duplicate_review_fails_without_changing_ratings() {
    let app = app();
    let tour = app.tours.create(new_tour("The Sea Explorer", false)).await.unwrap();
    let user = DocumentId::new();
    app.reviews.create(tour.id, user, rated(5.0)).await.unwrap();

    let err = app.reviews.create(tour.id, user, rated(1.0)).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }));
    assert_eq!(err.status_code(), 400);

    let tour = stored(&app, tour.id).await;
    assert_eq!(tour.ratings_quantity, 1);
    assert_eq!(tour.ratings_average, 5.0);
}

#[tokio::test]
async fn test_update_of_missing_review_is_silent() {
    let app = app();
    let tour = app.tours.create(new_tour("The Sea Explorer", false)).await.unwrap();
    app.reviews.create(tour.id, DocumentId::new(), rated(3.0)).await.unwrap();

    let patch = ReviewPatch {
        rating: Some(5.0),
        ..Default::default()
    };
    assert!(app.reviews.update(DocumentId::new(), patch).await.unwrap().is_none());
    assert!(app.reviews.delete(DocumentId::new()).await.unwrap().is_none());
    assert_eq!(stored(&app, tour.id).await.ratings_average, 3.0);
}

#[tokio::test]
async fn test_moving_review_updates_both_tours() {
    let app = app();
    let from = app.tours.create(new_tour("The Sea Explorer", false)).await.unwrap();
    let to = app.tours.create(new_tour("The Forest Hiker", false)).await.unwrap();
    let review = app
        .reviews
        .create(from.id, DocumentId::new(), rated(2.0))
        .await
        .unwrap();
    app.reviews.create(from.id, DocumentId::new(), rated(4.0)).await.unwrap();

    let patch = ReviewPatch {
        tour: Some(to.id),
        ..Default::default()
    };
    let moved = app.reviews.update(review.id, patch).await.unwrap().unwrap();
    assert_eq!(moved.tour, to.id);

    let from = stored(&app, from.id).await;
    assert_eq!((from.ratings_quantity, from.ratings_average), (1, 4.0));
    let to = stored(&app, to.id).await;
    assert_eq!((to.ratings_quantity, to.ratings_average), (1, 2.0));
}

#[tokio::test]
async fn test_saving_review_under_another_tour_updates_both_tours() {
    let app = app();
    let from = app.tours.create(new_tour("The Sea Explorer", false)).await.unwrap();
    let to = app.tours.create(new_tour("The Forest Hiker", false)).await.unwrap();
    let mut review = app
        .reviews
        .create(from.id, DocumentId::new(), rated(2.0))
        .await
        .unwrap();
    assert_eq!(stored(&app, from.id).await.ratings_quantity, 1);

    review.tour = to.id;
    let saved = app.reviews.save(review).await.unwrap();
    assert_eq!(saved.tour, to.id);

    let from = stored(&app, from.id).await;
    assert_eq!((from.ratings_quantity, from.ratings_average), (0, 4.5));
    let to = stored(&app, to.id).await;
    assert_eq!((to.ratings_quantity, to.ratings_average), (1, 2.0));
}

#[tokio::test]
async fn test_reviews_for_secret_tours_are_rejected() {
    let app = app();
    let secret = app
        .tours
        .create(new_tour("The Secret Super Tour", true))
        .await
        .unwrap();

    let err = app
        .reviews
        .create(secret.id, DocumentId::new(), rated(5.0))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ParentNotFound { .. }));
    assert!(app.tours.list(&QueryParams::new()).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_converge() {
    let store = MemoryStore::new();
    let config = AppConfig::default();
    let tours = TourService::new(store.tours.clone(), &config);
    let reviews = Arc::new(ReviewService::new(
        store.reviews.clone(),
        store.tours.clone(),
        &config,
    ));
    let tour = tours.create(new_tour("The Sea Explorer", false)).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let reviews = reviews.clone();
            tokio::spawn(async move {
                let rating = f64::from(i % 5 + 1);
                reviews
                    .create(tour.id, DocumentId::new(), rated(rating))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    // Interleaved recalculations may leave a stale write behind; one more
    // recalculation after the writers stop must settle it.
    let stats = reviews.recalculator().recalculate(tour.id).await.unwrap();
    assert_eq!(stats.quantity, 20);
    assert_eq!(stats.average, 3.0);

    let tour = tours.get(tour.id).await.unwrap().unwrap();
    assert_eq!(tour.ratings_quantity, 20);
    assert_eq!(tour.ratings_average, 3.0);
}
