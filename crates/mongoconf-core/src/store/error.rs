//! Document store error types

use thiserror::Error;

/// Errors that can occur while talking to the document store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error reported by the MongoDB driver
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// The store cannot tail the collection (e.g. a standalone server without
    /// a replica set)
    #[error("Change streams not supported by {store}: {message}")]
    WatchUnsupported { store: String, message: String },

    /// The store could not be reached
    #[error("Store not available: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Create a watch-unsupported error
    pub fn watch_unsupported(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WatchUnsupported {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Whether this error means change streams can never work for this store
    pub fn is_watch_unsupported(&self) -> bool {
        matches!(self, StoreError::WatchUnsupported { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_unsupported() {
        let err = StoreError::watch_unsupported("memory", "not a replica set");
        assert!(err.is_watch_unsupported());
        assert_eq!(
            err.to_string(),
            "Change streams not supported by memory: not a replica set"
        );
        assert!(!StoreError::Unavailable("down".into()).is_watch_unsupported());
    }
}
