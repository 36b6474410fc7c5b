//! MongoDB configuration provider
//!
//! - `options`: which collection, which documents, which fields
//! - `flatten`: one document to `(key, value)` pairs
//! - `snapshot`: the immutable key/value view and its atomic holder
//! - `watcher`: background task that reloads on collection changes
//! - `mongo_provider`: the `ConfigurationProvider` tying it together

mod options;
mod flatten;
mod snapshot;
mod watcher;
mod mongo_provider;
mod source;

pub use options::{KeySelection, MongoConfigOptions, NestedValues, OptionsError, OptionsResult};
pub use flatten::{flatten_document, ConfigValue, ID_FIELD};
pub use snapshot::{Snapshot, SnapshotStore};
pub use watcher::{ChangeWatcher, WatchTarget, WatcherState};
pub use mongo_provider::MongoConfigurationProvider;
pub use source::{MongoConfigurationBuilderExt, MongoConfigurationSource};
