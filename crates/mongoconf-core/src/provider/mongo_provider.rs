//! Configuration provider backed by a MongoDB collection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use super::options::MongoConfigOptions;
use super::snapshot::{Snapshot, SnapshotStore};
use super::watcher::{ChangeWatcher, WatchTarget, WatcherState};
use crate::config::path::merge_child_keys;
use crate::config::{ConfigError, ConfigResult, ConfigurationProvider, ReloadToken, ReloadTrigger};
use crate::logging::{default_logger, SharedLogger};
use crate::store::{DocumentStore, MongoDocumentStore, StoreError};
use crate::{log_debug, log_warn};

/// Read-only configuration provider over one MongoDB collection
///
/// `load` fetches every matching document, flattens it into a snapshot and,
/// when live reload is on, starts a background watcher that re-fetches after
/// each burst of changes and fires the reload token. Lookups never touch the
/// database.
///
/// # Example
///
/// ```no_run
/// use mongoconf_core::config::ConfigurationProvider;
/// use mongoconf_core::provider::{MongoConfigOptions, MongoConfigurationProvider};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let options = MongoConfigOptions::defined_keys_filtered_documents(
///     "mongodb://localhost:27017",
///     "myconfigdb",
///     "settings",
///     "environment",
///     "dev",
///     ["key1", "key2"],
/// )?;
///
/// let provider = MongoConfigurationProvider::new(options);
/// provider.load().await?;
///
/// let token = provider.reload_token();
/// token.register_callback(|| println!("configuration changed"));
///
/// let key1 = provider.try_get("key1");
/// # Ok(())
/// # }
/// ```
pub struct MongoConfigurationProvider {
    name: String,
    options: Arc<MongoConfigOptions>,
    store: OnceCell<Arc<dyn DocumentStore>>,
    snapshots: Arc<SnapshotStore>,
    trigger: Arc<ReloadTrigger>,
    watcher: Mutex<Option<ChangeWatcher>>,
    watch_started: AtomicBool,
    logger: SharedLogger,
}

impl MongoConfigurationProvider {
    /// Create a provider that connects on first load
    pub fn new(options: MongoConfigOptions) -> Self {
        Self::build(options, OnceCell::new())
    }

    /// Create a provider over an already-open document store
    pub fn with_store(options: MongoConfigOptions, store: Arc<dyn DocumentStore>) -> Self {
        Self::build(options, OnceCell::new_with(Some(store)))
    }

    fn build(options: MongoConfigOptions, store: OnceCell<Arc<dyn DocumentStore>>) -> Self {
        Self {
            name: format!(
                "MongoConfigurationProvider({}.{})",
                options.database(),
                options.collection()
            ),
            options: Arc::new(options),
            store,
            snapshots: Arc::new(SnapshotStore::new()),
            trigger: Arc::new(ReloadTrigger::new()),
            watcher: Mutex::new(None),
            watch_started: AtomicBool::new(false),
            logger: default_logger(),
        }
    }

    /// Replace the logger
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn options(&self) -> &MongoConfigOptions {
        &self.options
    }

    /// The snapshot currently served to readers
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.current()
    }

    /// State of the change watcher, `None` if it isn't running
    ///
    /// That covers live reload being off, no successful load yet, and after
    /// [`shutdown`](Self::shutdown).
    pub fn watcher_state(&self) -> Option<WatcherState> {
        self.watcher.lock().as_ref().map(ChangeWatcher::state)
    }

    /// Stop the change watcher and wait for it to exit
    ///
    /// The last snapshot stays readable. The watcher is not restarted by
    /// later loads.
    pub async fn shutdown(&self) {
        self.watch_started.store(true, Ordering::SeqCst);
        let watcher = self.watcher.lock().take();
        if let Some(watcher) = watcher {
            watcher.stop().await;
            log_debug!(self.logger, "{} shut down", self.name);
        }
    }

    async fn document_store(&self) -> ConfigResult<Arc<dyn DocumentStore>> {
        let options = &self.options;
        let store = self
            .store
            .get_or_try_init(|| async {
                let store = MongoDocumentStore::connect(
                    options.connection_string(),
                    options.database(),
                    options.collection(),
                )
                .await?;
                Ok::<_, StoreError>(Arc::new(store) as Arc<dyn DocumentStore>)
            })
            .await?;
        Ok(store.clone())
    }

    fn start_watcher(&self, store: Arc<dyn DocumentStore>) {
        if self.watch_started.swap(true, Ordering::SeqCst) {
            return;
        }

        if tokio::runtime::Handle::try_current().is_err() {
            log_warn!(
                self.logger,
                "{}: no tokio runtime on the loading thread, live reload disabled",
                self.name
            );
            return;
        }

        let watcher = ChangeWatcher::spawn(WatchTarget {
            store,
            options: self.options.clone(),
            snapshots: self.snapshots.clone(),
            trigger: self.trigger.clone(),
            logger: self.logger.clone(),
        });
        *self.watcher.lock() = Some(watcher);
    }
}

impl std::fmt::Debug for MongoConfigurationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoConfigurationProvider")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("keys", &self.snapshots.current().len())
            .field("watcher", &self.watcher_state())
            .finish()
    }
}

#[async_trait]
impl ConfigurationProvider for MongoConfigurationProvider {
    fn name(&self) -> &str {
        &self.name
    }

    /// Fetch and publish a fresh snapshot
    ///
    /// Safe to call repeatedly. A failed load leaves the previous snapshot
    /// in place. Manual loads don't fire the reload token.
    async fn load(&self) -> ConfigResult<()> {
        let store = self.document_store().await?;
        let snapshot = self
            .snapshots
            .refresh(store.as_ref(), &self.options)
            .await?;
        log_debug!(self.logger, "Loaded {} keys from {}", snapshot.len(), store.name());

        if self.options.live_reload() {
            self.start_watcher(store);
        }
        Ok(())
    }

    fn try_get(&self, key: &str) -> Option<String> {
        self.snapshots.current().lookup(key).map(str::to_string)
    }

    fn set(&self, _key: &str, _value: &str) -> ConfigResult<()> {
        Err(ConfigError::ReadOnly(self.name.clone()))
    }

    fn reload_token(&self) -> ReloadToken {
        self.trigger.token()
    }

    fn child_keys(&self, earlier_keys: &[String], parent_path: Option<&str>) -> Vec<String> {
        merge_child_keys(self.snapshots.current().child_keys(parent_path), earlier_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoOpLogger;
    use crate::store::MemoryDocumentStore;
    use bson::doc;
    use std::time::Duration;

    const URI: &str = "mongodb://localhost:27017";

    fn sample_store() -> Arc<MemoryDocumentStore> {
        Arc::new(MemoryDocumentStore::with_documents(vec![
            doc! { "_id": 1, "env": "dev", "key1": "A", "key2": "B" },
            doc! { "_id": 2, "env": "qa", "key1": "C" },
        ]))
    }

    fn provider(options: MongoConfigOptions, store: Arc<MemoryDocumentStore>) -> MongoConfigurationProvider {
        MongoConfigurationProvider::with_store(options, store).with_logger(Arc::new(NoOpLogger))
    }

    fn read_all() -> MongoConfigOptions {
        MongoConfigOptions::all_keys_all_documents(URI, "db", "settings").unwrap()
    }

    async fn wait_for_state(provider: &MongoConfigurationProvider, expected: WatcherState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while provider.watcher_state() != Some(expected) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("watcher did not reach expected state");
    }

    #[tokio::test]
    async fn test_filtered_defined_keys_scenario() {
        let options = MongoConfigOptions::defined_keys_filtered_documents(
            URI,
            "db",
            "settings",
            "env",
            "dev",
            ["key1", "key2", "key9"],
        )
        .unwrap()
        .with_live_reload(false);
        let provider = provider(options, sample_store());
        provider.load().await.unwrap();

        let snapshot = provider.snapshot();
        let entries: Vec<_> = snapshot.iter().collect();
        assert_eq!(entries, vec![("key1", "A"), ("key2", "B")]);
        assert_eq!(provider.try_get("key9"), None);
        assert_eq!(provider.try_get("_id"), None);
    }

    #[tokio::test]
    async fn test_read_all_last_document_wins() {
        let provider = provider(read_all().with_live_reload(false), sample_store());
        provider.load().await.unwrap();

        assert_eq!(provider.try_get("key1"), Some("C".to_string()));
        assert_eq!(provider.try_get("key2"), Some("B".to_string()));
        assert_eq!(provider.try_get("env"), Some("qa".to_string()));
    }

    #[tokio::test]
    async fn test_filter_with_no_match_gives_empty_snapshot() {
        let options =
            MongoConfigOptions::all_keys_filtered_documents(URI, "db", "settings", "env", "prod")
                .unwrap()
                .with_live_reload(false);
        let provider = provider(options, sample_store());
        provider.load().await.unwrap();
        assert!(provider.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_try_get_ignores_case() {
        let store = Arc::new(MemoryDocumentStore::with_documents(vec![doc! { "_id": 1, "Foo": "bar" }]));
        let provider = provider(read_all().with_live_reload(false), store);
        assert_eq!(provider.try_get("foo"), None);

        provider.load().await.unwrap();
        assert_eq!(provider.try_get("foo"), Some("bar".to_string()));
        assert_eq!(provider.try_get("FOO"), Some("bar".to_string()));
    }

    #[tokio::test]
    async fn test_set_always_fails() {
        let provider = provider(read_all().with_live_reload(false), sample_store());
        assert!(matches!(provider.set("key1", "x"), Err(ConfigError::ReadOnly(_))));

        provider.load().await.unwrap();
        assert!(matches!(provider.set("", ""), Err(ConfigError::ReadOnly(_))));
        assert_eq!(provider.try_get("key1"), Some("C".to_string()));
    }

    #[tokio::test]
    async fn test_child_keys() {
        let store = Arc::new(MemoryDocumentStore::with_documents(vec![
            doc! { "_id": 1, "a:b": "1", "a:c:d": "2", "x": "3" },
        ]));
        let provider = provider(read_all().with_live_reload(false), store);
        provider.load().await.unwrap();

        assert_eq!(provider.child_keys(&[], Some("a")), vec!["b", "c"]);
        assert_eq!(provider.child_keys(&[], None), vec!["a", "x"]);
        assert_eq!(
            provider.child_keys(&["c".to_string(), "a".to_string()], Some("a")),
            vec!["a", "b", "c"]
        );
    }

    #[tokio::test]
    async fn test_load_is_idempotent_and_silent() {
        let provider = provider(read_all().with_live_reload(false), sample_store());
        let token = provider.reload_token();

        provider.load().await.unwrap();
        let first = provider.snapshot();
        provider.load().await.unwrap();
        let second = provider.snapshot();

        assert_eq!(*first, *second);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!token.has_changed());
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_snapshot() {
        let store = sample_store();
        let provider = provider(read_all().with_live_reload(false), store.clone());
        provider.load().await.unwrap();

        store.set_fetch_failure(true);
        let result = provider.load().await;
        assert!(matches!(result, Err(ConfigError::Store(StoreError::Unavailable(_)))));
        assert_eq!(provider.try_get("key1"), Some("C".to_string()));
    }

    #[tokio::test]
    async fn test_live_reload_off_starts_no_watcher() {
        let store = sample_store();
        let provider = provider(read_all().with_live_reload(false), store.clone());
        provider.load().await.unwrap();

        assert_eq!(provider.watcher_state(), None);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_burst_fires_one_reload() {
        let store = sample_store();
        let provider = provider(read_all(), store.clone());
        provider.load().await.unwrap();
        wait_for_state(&provider, WatcherState::Watching).await;

        let token = provider.reload_token();
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = fired.clone();
        token.register_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.replace_all(vec![doc! { "_id": 3, "key1": "Z" }, doc! { "_id": 4, "key5": "E" }]);
        tokio::time::timeout(Duration::from_secs(5), async {
            while fired.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reload callback should run");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(token.has_changed());
        assert_eq!(provider.try_get("key1"), Some("Z".to_string()));
        assert_eq!(provider.try_get("key5"), Some("E".to_string()));
        assert_eq!(provider.try_get("env"), None);

        // A fresh token is waiting for the next change
        let next = provider.reload_token();
        assert!(!next.same_token(&token));
        assert!(!next.has_changed());

        provider.shutdown().await;
    }

    #[tokio::test]
    async fn test_write_right_after_load_is_not_lost() {
        let store = Arc::new(MemoryDocumentStore::with_documents(vec![doc! { "_id": 1, "k": "old" }]));
        let provider = provider(read_all(), store.clone());
        provider.load().await.unwrap();
        let token = provider.reload_token();

        // On a current-thread runtime the watcher hasn't subscribed yet
        store.replace_all(vec![doc! { "_id": 1, "k": "new" }]);

        wait_for_state(&provider, WatcherState::Watching).await;
        assert_eq!(provider.try_get("k"), Some("new".to_string()));
        assert!(token.has_changed());

        provider.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_burst_fires_nothing() {
        let store = sample_store();
        let provider = provider(read_all(), store.clone());
        provider.load().await.unwrap();
        wait_for_state(&provider, WatcherState::Watching).await;

        let token = provider.reload_token();
        store.publish(Vec::new());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!token.has_changed());

        provider.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unsupported_tailing_keeps_static_snapshot() {
        let store = sample_store();
        store.set_watch_unsupported(true);
        let provider = provider(read_all(), store.clone());

        provider.load().await.unwrap();
        wait_for_state(&provider, WatcherState::Unsupported).await;

        let token = provider.reload_token();
        assert_eq!(provider.try_get("key1"), Some("C".to_string()));

        // Loading again neither fails nor retries the watch
        provider.load().await.unwrap();
        assert_eq!(provider.watcher_state(), Some(WatcherState::Unsupported));
        assert!(!token.has_changed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_started_once() {
        let store = sample_store();
        let provider = provider(read_all(), store.clone());

        provider.load().await.unwrap();
        provider.load().await.unwrap();
        wait_for_state(&provider, WatcherState::Watching).await;
        assert_eq!(store.subscriber_count(), 1);

        provider.shutdown().await;
        assert_eq!(provider.watcher_state(), None);
        assert_eq!(store.subscriber_count(), 0);

        provider.load().await.unwrap();
        assert_eq!(provider.watcher_state(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_releases_subscription() {
        let store = sample_store();
        let provider = provider(read_all(), store.clone());
        provider.load().await.unwrap();
        wait_for_state(&provider, WatcherState::Watching).await;
        assert_eq!(store.subscriber_count(), 1);

        drop(provider);
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.subscriber_count() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription should be released");
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_as_store_error() {
        let options = MongoConfigOptions::all_keys_all_documents("not-a-mongo-uri", "db", "settings")
            .unwrap()
            .with_live_reload(false);
        let provider = MongoConfigurationProvider::new(options).with_logger(Arc::new(NoOpLogger));

        let result = provider.load().await;
        assert!(matches!(result, Err(ConfigError::Store(StoreError::Mongo(_)))));
        assert!(provider.snapshot().is_empty());
    }
}
