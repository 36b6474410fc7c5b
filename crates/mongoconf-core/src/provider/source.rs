//! Registration of the MongoDB provider with a configuration builder

use std::sync::Arc;

use super::mongo_provider::MongoConfigurationProvider;
use super::options::MongoConfigOptions;
use crate::config::{ConfigResult, ConfigurationBuilder, ConfigurationProvider, ConfigurationSource};
use crate::logging::SharedLogger;
use crate::store::DocumentStore;

/// Builds a [`MongoConfigurationProvider`] from its options
#[derive(Clone)]
pub struct MongoConfigurationSource {
    options: MongoConfigOptions,
    store: Option<Arc<dyn DocumentStore>>,
    logger: Option<SharedLogger>,
}

impl MongoConfigurationSource {
    pub fn new(options: MongoConfigOptions) -> Self {
        Self {
            options,
            store: None,
            logger: None,
        }
    }

    /// Read from this store instead of connecting with the options'
    /// connection string
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn options(&self) -> &MongoConfigOptions {
        &self.options
    }
}

impl std::fmt::Debug for MongoConfigurationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoConfigurationSource")
            .field("options", &self.options)
            .field("store", &self.store.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

impl ConfigurationSource for MongoConfigurationSource {
    fn build(&self) -> ConfigResult<Arc<dyn ConfigurationProvider>> {
        let options = self.options.clone();
        let provider = match &self.store {
            Some(store) => MongoConfigurationProvider::with_store(options, store.clone()),
            None => MongoConfigurationProvider::new(options),
        };
        let provider = match &self.logger {
            Some(logger) => provider.with_logger(logger.clone()),
            None => provider,
        };
        Ok(Arc::new(provider))
    }
}

/// `add_mongo` for [`ConfigurationBuilder`]
pub trait MongoConfigurationBuilderExt {
    /// Add a MongoDB layer on top of the layers registered so far
    fn add_mongo(self, options: MongoConfigOptions) -> Self;
}

impl MongoConfigurationBuilderExt for ConfigurationBuilder {
    fn add_mongo(self, options: MongoConfigOptions) -> Self {
        self.add(MongoConfigurationSource::new(options))
    }
}
