#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "cli")]
pub use cli::{CliConfig, Command};

use crate::core::query_builder::DEFAULT_LIMIT;
use crate::domain::ports::SettingsProvider;
use crate::domain::rating::{DEFAULT_RATINGS_AVERAGE, MAX_RATING, MIN_RATING};
use crate::utils::error::{Result, StoreError};
use crate::utils::validation::{
    validate_non_empty_string, validate_one_of, validate_positive_number, validate_range, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application settings, read from a TOML file. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub ratings: RatingsConfig,
    pub pagination: PaginationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub tours_collection: String,
    pub reviews_collection: String,
    /// Seed file loaded at startup when none is given on the command line.
    pub seed_file: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tours_collection: "tours".to_string(),
            reviews_collection: "reviews".to_string(),
            seed_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingsConfig {
    /// Average reported for a tour without reviews.
    pub default_average: f64,
}

impl Default for RatingsConfig {
    fn default() -> Self {
        Self {
            default_average: DEFAULT_RATINGS_AVERAGE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: usize,
    /// Ceiling applied to `limit`. Unbounded when unset.
    pub max_limit: Option<usize>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    /// `compact` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: "compact".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["compact", "json"];

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;
        toml::from_str(&processed).map_err(|e| StoreError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value. Unset variables are left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| StoreError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.into_owned())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("store.tours_collection", &self.store.tours_collection)?;
        validate_non_empty_string("store.reviews_collection", &self.store.reviews_collection)?;
        if self.store.tours_collection == self.store.reviews_collection {
            return Err(StoreError::ConfigError {
                message: "store.tours_collection and store.reviews_collection must differ"
                    .to_string(),
            });
        }

        validate_range(
            "ratings.default_average",
            self.ratings.default_average,
            MIN_RATING,
            MAX_RATING,
        )?;

        validate_positive_number("pagination.default_limit", self.pagination.default_limit, 1)?;
        if let Some(max_limit) = self.pagination.max_limit {
            validate_positive_number("pagination.max_limit", max_limit, 1)?;
            if self.pagination.default_limit > max_limit {
                return Err(StoreError::ConfigError {
                    message: format!(
                        "pagination.default_limit ({}) exceeds pagination.max_limit ({})",
                        self.pagination.default_limit, max_limit
                    ),
                });
            }
        }

        if let Some(level) = &self.logging.level {
            validate_one_of("logging.level", level, &LOG_LEVELS)?;
        }
        validate_one_of("logging.format", &self.logging.format, &LOG_FORMATS)?;

        Ok(())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

impl SettingsProvider for AppConfig {
    fn default_ratings_average(&self) -> f64 {
        self.ratings.default_average
    }

    fn default_page_limit(&self) -> usize {
        self.pagination.default_limit
    }

    fn max_page_limit(&self) -> Option<usize> {
        self.pagination.max_limit
    }
}
