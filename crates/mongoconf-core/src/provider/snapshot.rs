//! Snapshot of the flattened configuration
//!
//! A [`Snapshot`] is immutable once built. [`SnapshotStore`] publishes new
//! snapshots with an atomic pointer swap, so readers see either the old or
//! the new map in full and never block on a reload.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use bson::Document;
use tokio::sync::Mutex;

use super::flatten::flatten_document;
use super::options::MongoConfigOptions;
use crate::config::path::{child_prefix, child_segment};
use crate::store::{DocumentStore, StoreResult};

/// Case-insensitive key/value view of the whole collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    // lowercased key -> (key as last written, value)
    entries: BTreeMap<String, (String, String)>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten `documents` in order; a later document overwrites an earlier
    /// one's value for the same key
    pub fn rebuild(documents: &[Document], options: &MongoConfigOptions) -> Self {
        let mut snapshot = Self::new();
        for document in documents {
            for (key, value) in flatten_document(document, options) {
                snapshot.insert(key, value);
            }
        }
        snapshot
    }

    fn insert(&mut self, key: String, value: String) {
        self.entries.insert(key.to_lowercase(), (key, value));
    }

    /// Value for `key`, ignoring case
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_lowercase())
            .map(|(_, value)| value.as_str())
    }

    /// Next path segment of every key under `parent_path`
    ///
    /// Unsorted and possibly repeated; see
    /// [`merge_child_keys`](crate::config::path::merge_child_keys).
    pub fn child_keys(&self, parent_path: Option<&str>) -> Vec<String> {
        let prefix = child_prefix(parent_path);
        self.entries
            .values()
            .filter_map(|(key, _)| child_segment(key, &prefix).map(str::to_string))
            .collect()
    }

    /// Entries as `(key, value)`, ordered by lowercased key
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Snapshot
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (key, value) in iter {
            snapshot.insert(key.into(), value.into());
        }
        snapshot
    }
}

/// Holder of the current snapshot
///
/// Many readers, one writer: [`refresh`](Self::refresh) runs fetch, rebuild
/// and swap under a single async lock, so a manual load and a watcher reload
/// never interleave. The previous snapshot stays in place until a fetch has
/// fully succeeded.
#[derive(Debug)]
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
    writer: Mutex<()>,
    generation: AtomicU64,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// Create a store holding an empty snapshot
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::new()),
            writer: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// The snapshot in effect right now
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// How many snapshots have been published
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Fetch, flatten and publish a new snapshot
    pub async fn refresh(
        &self,
        store: &dyn DocumentStore,
        options: &MongoConfigOptions,
    ) -> StoreResult<Arc<Snapshot>> {
        let _writer = self.writer.lock().await;

        let documents = store.find_all(options.filter()).await?;
        let snapshot = Arc::new(Snapshot::rebuild(&documents, options));
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    fn publish(&self, snapshot: Arc<Snapshot>) {
        self.current.store(snapshot);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
