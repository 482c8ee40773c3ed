pub mod hooks;
pub mod query_builder;
pub mod ratings;
pub mod reviews;
pub mod tours;

pub use crate::domain::ports::{find, Collection, Find, SettingsProvider};
pub use crate::utils::error::Result;
pub use hooks::{ConsistencyHooks, ReviewWrite};
pub use query_builder::{PageLimits, QueryBuilder};
pub use ratings::{AverageRatings, Recalculator};
pub use reviews::ReviewService;
pub use tours::TourService;
