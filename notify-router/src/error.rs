//! Application-wide error types.

use thiserror::Error;

use crate::domain::Priority;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Counter store error: {0}")]
    CounterStore(#[from] redis::RedisError),

    #[error("Counter store error: {0}")]
    CounterStoreOther(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Staging buffer for {0} band is closed")]
    BufferClosed(Priority),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of a per-record failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Malformed inbound payload.
    Poison,
    /// Counter store or preference store unavailable.
    Store,
    /// Delivery topic publish failed.
    Publish,
    /// Anything else.
    Other,
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn counter_store(msg: impl Into<String>) -> Self {
        Self::CounterStoreOther(msg.into())
    }

    /// Classify this error for pipeline statistics and logging.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::Serialization(_) | Self::Validation(_) => FailureClass::Poison,
            Self::DatabaseSqlx(_)
            | Self::Database(_)
            | Self::CounterStore(_)
            | Self::CounterStoreOther(_) => FailureClass::Store,
            Self::Kafka(_) => FailureClass::Publish,
            _ => FailureClass::Other,
        }
    }

    /// Whether the failure is expected to clear on its own (network, timeouts).
    pub fn is_transient(&self) -> bool {
        matches!(
            self.failure_class(),
            FailureClass::Store | FailureClass::Publish
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_class() {
        assert_eq!(
            Error::validation("missing user_id").failure_class(),
            FailureClass::Poison
        );
        assert_eq!(
            Error::counter_store("timeout").failure_class(),
            FailureClass::Store
        );
        assert_eq!(
            Error::Database("gone".into()).failure_class(),
            FailureClass::Store
        );
        assert_eq!(
            Error::config("bad").failure_class(),
            FailureClass::Other
        );
    }

    #[test]
    fn test_is_transient() {
        assert!(Error::counter_store("timeout").is_transient());
        assert!(!Error::validation("bad").is_transient());
        assert!(!Error::BufferClosed(Priority::High).is_transient());
    }
}
