use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Can not add review to this tour. Tour with ID {id} does not exist")]
    ParentNotFound { id: String },

    #[error("Duplicate value for ({fields}) in {collection}. Please use another value")]
    DuplicateKey { collection: String, fields: String },

    #[error("Invalid {field}: {value}")]
    InvalidId { field: String, value: String },

    #[error("Invalid input data. {field}: {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Failed to store ratings on tour {tour_id}: {source}")]
    AggregateWriteFailure {
        tour_id: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Data store error: {message}")]
    BackendError { message: String },
}

impl StoreError {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        StoreError::ValidationError {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// HTTP status the boundary layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::ParentNotFound { .. } => 404,
            StoreError::DuplicateKey { .. }
            | StoreError::InvalidId { .. }
            | StoreError::ValidationError { .. } => 400,
            StoreError::AggregateWriteFailure { .. }
            | StoreError::SerializationError(_)
            | StoreError::IoError(_)
            | StoreError::ConfigError { .. }
            | StoreError::BackendError { .. } => 500,
        }
    }

    /// `"fail"` for client errors, `"error"` for everything else.
    pub fn status(&self) -> &'static str {
        if (400..500).contains(&self.status_code()) {
            "fail"
        } else {
            "error"
        }
    }

    /// Operational errors carry a message that is safe to show to clients.
    pub fn is_operational(&self) -> bool {
        self.status_code() < 500
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_fail() {
        let err = StoreError::ParentNotFound {
            id: "abc".to_string(),
        };
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.status(), "fail");
        assert!(err.is_operational());

        let err = StoreError::DuplicateKey {
            collection: "reviews".to_string(),
            fields: "tour, user".to_string(),
        };
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_aggregate_failure_keeps_source() {
        let err = StoreError::AggregateWriteFailure {
            tour_id: "t1".to_string(),
            source: Box::new(StoreError::BackendError {
                message: "connection reset".to_string(),
            }),
        };
        assert_eq!(err.status(), "error");
        assert!(!err.is_operational());
        assert!(err.to_string().contains("connection reset"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
