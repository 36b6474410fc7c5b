//! Layered configuration built from several sources
//!
//! Providers are consulted in registration order; for a given key the last
//! provider that has it wins.

use std::sync::Arc;

use futures::future::select_all;

use super::path::merge_child_keys;
use super::traits::{ConfigResult, ConfigurationProvider, ConfigurationSource};

/// Collects configuration sources and builds a [`ConfigurationRoot`]
///
/// # Example
///
/// ```no_run
/// use mongoconf_core::config::{ConfigurationBuilder, MemoryConfigurationProvider};
/// use mongoconf_core::provider::{MongoConfigOptions, MongoConfigurationBuilderExt};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let options = MongoConfigOptions::all_keys_all_documents(
///     "mongodb://localhost:27017",
///     "myconfigdb",
///     "settings",
/// )?;
///
/// let root = ConfigurationBuilder::new()
///     .add_provider(Arc::new(MemoryConfigurationProvider::with_values([("env", "dev")])))
///     .add_mongo(options)
///     .build()
///     .await?;
///
/// let level = root.get("logging:level");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ConfigurationBuilder {
    sources: Vec<Box<dyn ConfigurationSource>>,
    providers: Vec<Arc<dyn ConfigurationProvider>>,
    // Keeps sources and ready-made providers in registration order
    order: Vec<Entry>,
}

enum Entry {
    Source(usize),
    Provider(usize),
}

impl ConfigurationBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source; its provider is built in [`build`](Self::build)
    pub fn add<S>(mut self, source: S) -> Self
    where
        S: ConfigurationSource + 'static,
    {
        self.order.push(Entry::Source(self.sources.len()));
        self.sources.push(Box::new(source));
        self
    }

    /// Register an already constructed provider
    pub fn add_provider(mut self, provider: Arc<dyn ConfigurationProvider>) -> Self {
        self.order.push(Entry::Provider(self.providers.len()));
        self.providers.push(provider);
        self
    }

    /// Number of registered layers
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Build every provider and load them in registration order
    pub async fn build(self) -> ConfigResult<ConfigurationRoot> {
        let mut providers = Vec::with_capacity(self.order.len());
        for entry in &self.order {
            let provider = match entry {
                Entry::Source(index) => self.sources[*index].build()?,
                Entry::Provider(index) => self.providers[*index].clone(),
            };
            provider.load().await?;
            providers.push(provider);
        }
        Ok(ConfigurationRoot { providers })
    }
}

impl std::fmt::Debug for ConfigurationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationBuilder")
            .field("layers", &self.order.len())
            .finish()
    }
}

/// Loaded configuration layers
pub struct ConfigurationRoot {
    providers: Vec<Arc<dyn ConfigurationProvider>>,
}

impl ConfigurationRoot {
    /// Create a root over already loaded providers
    pub fn new(providers: Vec<Arc<dyn ConfigurationProvider>>) -> Self {
        Self { providers }
    }

    /// The layers, lowest priority first
    pub fn providers(&self) -> &[Arc<dyn ConfigurationProvider>] {
        &self.providers
    }

    /// Value of `key` from the last provider that has it
    pub fn get(&self, key: &str) -> Option<String> {
        self.providers
            .iter()
            .rev()
            .find_map(|provider| provider.try_get(key))
    }

    /// Write `key` to every provider
    ///
    /// Every layer is offered the value; the first layer that refuses it is
    /// reported, so a read-only layer never fails silently.
    pub fn set(&self, key: &str, value: &str) -> ConfigResult<()> {
        let mut first_error = None;
        for provider in &self.providers {
            if let Err(e) = provider.set(key, value) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Immediate children of `parent_path` across every layer
    pub fn child_keys(&self, parent_path: Option<&str>) -> Vec<String> {
        let keys = self
            .providers
            .iter()
            .fold(Vec::new(), |earlier, provider| provider.child_keys(&earlier, parent_path));
        merge_child_keys(Vec::new(), &keys)
    }

    /// Reload every provider in order
    pub async fn reload(&self) -> ConfigResult<()> {
        for provider in &self.providers {
            provider.load().await?;
        }
        Ok(())
    }

    /// Resolve once any provider reports a change
    ///
    /// Returns immediately when there are no providers.
    pub async fn changed(&self) {
        if self.providers.is_empty() {
            return;
        }
        let tokens: Vec<_> = self.providers.iter().map(|p| p.reload_token()).collect();
        let waits = tokens
            .iter()
            .map(|token| Box::pin(token.changed()))
            .collect::<Vec<_>>();
        select_all(waits).await;
    }
}

impl std::fmt::Debug for ConfigurationRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationRoot")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigError, MemoryConfigurationProvider, ReloadToken};

    struct MemorySource(Vec<(&'static str, &'static str)>);

    impl ConfigurationSource for MemorySource {
        fn build(&self) -> ConfigResult<Arc<dyn ConfigurationProvider>> {
            Ok(Arc::new(MemoryConfigurationProvider::with_values(
                self.0.iter().copied(),
            )))
        }
    }

    #[tokio::test]
    async fn test_last_layer_wins() {
        let root = ConfigurationBuilder::new()
            .add(MemorySource(vec![("level", "info"), ("name", "base")]))
            .add_provider(Arc::new(MemoryConfigurationProvider::with_values([(
                "Level", "debug",
            )])))
            .build()
            .await
            .unwrap();

        assert_eq!(root.providers().len(), 2);
        assert_eq!(root.get("LEVEL"), Some("debug".to_string()));
        assert_eq!(root.get("name"), Some("base".to_string()));
        assert_eq!(root.get("missing"), None);
    }

    #[tokio::test]
    async fn test_child_keys_merge_across_layers() {
        let root = ConfigurationBuilder::new()
            .add(MemorySource(vec![("a:b", "1"), ("a:d", "2")]))
            .add(MemorySource(vec![("A:c:x", "3"), ("a:B", "4"), ("z", "5")]))
            .build()
            .await
            .unwrap();

        // The later layer's spelling wins for keys both layers report
        assert_eq!(root.child_keys(Some("a")), vec!["B", "c", "d"]);
        assert_eq!(root.child_keys(None), vec!["a", "z"]);
    }

    #[tokio::test]
    async fn test_set_reaches_writable_layers() {
        let memory = Arc::new(MemoryConfigurationProvider::new());
        let root = ConfigurationRoot::new(vec![memory.clone() as Arc<dyn ConfigurationProvider>]);

        root.set("k", "v").unwrap();
        assert_eq!(memory.try_get("k"), Some("v".to_string()));
    }

    struct ReadOnlyProvider(MemoryConfigurationProvider);

    #[async_trait::async_trait]
    impl ConfigurationProvider for ReadOnlyProvider {
        fn name(&self) -> &str {
            "read-only"
        }

        async fn load(&self) -> ConfigResult<()> {
            Ok(())
        }

        fn try_get(&self, key: &str) -> Option<String> {
            self.0.try_get(key)
        }

        fn set(&self, _key: &str, _value: &str) -> ConfigResult<()> {
            Err(ConfigError::ReadOnly(self.name().to_string()))
        }

        fn reload_token(&self) -> ReloadToken {
            self.0.reload_token()
        }

        fn child_keys(&self, earlier_keys: &[String], parent_path: Option<&str>) -> Vec<String> {
            self.0.child_keys(earlier_keys, parent_path)
        }
    }

    #[tokio::test]
    async fn test_set_reports_read_only_layer() {
        let memory = Arc::new(MemoryConfigurationProvider::new());
        let read_only = Arc::new(ReadOnlyProvider(MemoryConfigurationProvider::with_values([(
            "k", "v",
        )])));
        let root = ConfigurationRoot::new(vec![
            memory.clone() as Arc<dyn ConfigurationProvider>,
            read_only,
        ]);

        let result = root.set("k", "x");
        assert!(matches!(result, Err(ConfigError::ReadOnly(name)) if name == "read-only"));
        // The writable layer still took the value, but the read-only one shadows it
        assert_eq!(memory.try_get("k"), Some("x".to_string()));
        assert_eq!(root.get("k"), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_changed_resolves_on_any_provider() {
        let first = Arc::new(MemoryConfigurationProvider::new());
        let second = Arc::new(MemoryConfigurationProvider::new());
        let root = ConfigurationRoot::new(vec![
            first as Arc<dyn ConfigurationProvider>,
            second.clone(),
        ]);

        let clearer = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            second.clear();
        });

        tokio::time::timeout(std::time::Duration::from_secs(5), root.changed())
            .await
            .expect("root should observe the change");
        clearer.await.unwrap();
    }

    #[test]
    fn test_read_only_error_message() {
        let err = ConfigError::ReadOnly("mongodb".to_string());
        assert_eq!(err.to_string(), "Setting a key is not supported by mongodb");
    }
}
