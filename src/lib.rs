pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};

pub use adapters::{MemoryCollection, MemoryStore, Seed};
pub use config::AppConfig;
pub use core::{
    find, AverageRatings, Collection, ConsistencyHooks, QueryBuilder, Recalculator, ReviewService,
    ReviewWrite, TourService,
};
pub use domain::model::{Document, DocumentId};
pub use domain::query::{Filter, QueryParams};
pub use utils::error::{Result, StoreError};
