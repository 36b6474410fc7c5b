//! In-memory configuration provider

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::path::{child_prefix, child_segment, merge_child_keys};
use super::reload::{ReloadToken, ReloadTrigger};
use super::traits::{ConfigResult, ConfigurationProvider};

/// In-memory configuration layer
///
/// Writable, case-insensitive. Handy as a defaults layer underneath the
/// MongoDB provider and in tests.
#[derive(Debug, Default)]
pub struct MemoryConfigurationProvider {
    // lowercased key -> (original key, value)
    values: RwLock<BTreeMap<String, (String, String)>>,
    trigger: ReloadTrigger,
}

impl MemoryConfigurationProvider {
    /// Create a new empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider with initial values
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let provider = Self::new();
        {
            let mut guard = provider.values.write();
            for (key, value) in values {
                let key = key.into();
                guard.insert(key.to_lowercase(), (key, value.into()));
            }
        }
        provider
    }

    /// Remove every value and fire the reload token
    pub fn clear(&self) {
        self.values.write().clear();
        self.trigger.notify();
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Check if the provider is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConfigurationProvider for MemoryConfigurationProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> ConfigResult<()> {
        Ok(())
    }

    fn try_get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .get(&key.to_lowercase())
            .map(|(_, value)| value.clone())
    }

    fn set(&self, key: &str, value: &str) -> ConfigResult<()> {
        self.values
            .write()
            .insert(key.to_lowercase(), (key.to_string(), value.to_string()));
        Ok(())
    }

    fn reload_token(&self) -> ReloadToken {
        self.trigger.token()
    }

    fn child_keys(&self, earlier_keys: &[String], parent_path: Option<&str>) -> Vec<String> {
        let prefix = child_prefix(parent_path);
        let values = self.values.read();
        let own = values
            .values()
            .filter_map(|(key, _)| child_segment(key, &prefix).map(str::to_string))
            .collect::<Vec<_>>();
        merge_child_keys(own, earlier_keys)
    }
}
