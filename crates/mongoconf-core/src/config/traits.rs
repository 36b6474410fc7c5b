//! Configuration provider and source traits

use std::sync::Arc;

use async_trait::async_trait;

use super::reload::ReloadToken;
use crate::store::StoreError;

/// A layer of flat, `:`-delimited configuration keys
///
/// Implementations:
/// - `MemoryConfigurationProvider`: In-memory, writable
/// - `MongoConfigurationProvider`: Documents of a MongoDB collection, read-only
///
/// Key lookups are case-insensitive. Only `load` performs I/O; every other
/// method answers from state already in memory.
#[async_trait]
pub trait ConfigurationProvider: Send + Sync {
    /// Human-readable name of this provider
    fn name(&self) -> &str;

    /// Load (or reload) all values from the backing source
    async fn load(&self) -> ConfigResult<()>;

    /// Look up a value by key
    fn try_get(&self, key: &str) -> Option<String>;

    /// Store a value
    ///
    /// Returns `Err(ConfigError::ReadOnly)` if the provider doesn't support writing.
    fn set(&self, key: &str, value: &str) -> ConfigResult<()>;

    /// Token that fires once when this provider's data changes
    ///
    /// After it fires, ask for a new token to hear about the next change.
    fn reload_token(&self) -> ReloadToken;

    /// Immediate child segments under `parent_path`, merged with `earlier_keys`
    /// from other layers, sorted with [`compare_keys`](super::compare_keys)
    fn child_keys(&self, earlier_keys: &[String], parent_path: Option<&str>) -> Vec<String>;
}

/// Something that can build a configuration provider
pub trait ConfigurationSource: Send + Sync {
    /// Build the provider for this source
    fn build(&self) -> ConfigResult<Arc<dyn ConfigurationProvider>>;
}

/// Errors that can occur during configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Setting a key is not supported by {0}")]
    ReadOnly(String),

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
