//! MongoDB Configuration Provider
//!
//! Exposes the documents of a MongoDB collection as a flat, case-insensitive
//! key/value configuration layer, with live reload driven by change streams.
//!
//! ## Layout
//!
//! - `config`: the provider contract, reload tokens and layering of providers
//! - `store`: document access (MongoDB and in-memory)
//! - `provider`: options, flattening, snapshots, the change watcher and the
//!   provider itself
//! - `logging`: pluggable logger used by the background watcher
//!
//! ```rust,ignore
//! use mongoconf_core::config::ConfigurationBuilder;
//! use mongoconf_core::provider::{MongoConfigOptions, MongoConfigurationBuilderExt};
//!
//! let options = MongoConfigOptions::all_keys_filtered_documents(
//!     "mongodb://localhost:27017", "myconfigdb", "settings", "environment", "dev",
//! )?;
//! let root = ConfigurationBuilder::new().add_mongo(options).build().await?;
//!
//! let level = root.get("loglevel");
//! root.changed().await; // resolves after the collection changes
//! ```

pub mod types;
pub mod logging;
pub mod config;
pub mod store;
pub mod provider;

// Re-export commonly used types
pub use types::CancellationToken;

pub use logging::{ConsoleLogger, LogLevel, Logger, NoOpLogger, SharedLogger};

pub use config::{
    ConfigError, ConfigResult, ConfigurationBuilder, ConfigurationProvider, ConfigurationRoot,
    ConfigurationSource, MemoryConfigurationProvider, ReloadToken, ReloadTrigger,
};

pub use store::{DocumentStore, EqualityFilter, MemoryDocumentStore, MongoDocumentStore, StoreError};

pub use provider::{
    KeySelection, MongoConfigOptions, MongoConfigurationBuilderExt, MongoConfigurationProvider,
    MongoConfigurationSource, NestedValues, OptionsError, Snapshot, WatcherState,
};
