//! Where and how to read configuration documents

use bson::Bson;
use thiserror::Error;

use crate::store::EqualityFilter;

/// Which top-level fields become configuration keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelection {
    /// Every field except `_id`
    ReadAll,
    /// Only fields whose name case-insensitively matches one of these
    DefinedKeys(Vec<String>),
}

impl KeySelection {
    /// Whether a top-level field named `field` is selected
    pub fn includes(&self, field: &str) -> bool {
        match self {
            KeySelection::ReadAll => true,
            KeySelection::DefinedKeys(keys) => {
                let field = field.to_lowercase();
                keys.iter().any(|k| k.to_lowercase() == field)
            }
        }
    }
}

/// How nested documents and arrays are turned into values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NestedValues {
    /// One key per top-level field; nested values become compact JSON text
    #[default]
    Serialize,
    /// Nested documents and arrays expand into `parent:child` / `parent:0` keys
    Expand,
}

/// Errors for invalid option combinations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("Defined-keys mode requires at least one key")]
    EmptyKeySet,

    #[error("Database name is required")]
    MissingDatabase,

    #[error("Collection name is required")]
    MissingCollection,

    #[error("Filter field name is required in filtered mode")]
    EmptyFilterField,
}

pub type OptionsResult<T> = Result<T, OptionsError>;

/// Immutable description of the collection to read and how to read it
///
/// Built through one of the four constructors, one per combination of
/// {all keys, defined keys} x {all documents, filtered documents}.
///
/// # Example
///
/// ```
/// use mongoconf_core::provider::{KeySelection, MongoConfigOptions};
///
/// let options = MongoConfigOptions::defined_keys_filtered_documents(
///     "mongodb://localhost:27017",
///     "myconfigdb",
///     "settings",
///     "environment",
///     "dev",
///     ["key1", "key2", "key9"],
/// )
/// .unwrap()
/// .with_live_reload(false);
///
/// assert!(options.filter().is_some());
/// assert!(matches!(options.key_selection(), KeySelection::DefinedKeys(keys) if keys.len() == 3));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MongoConfigOptions {
    connection_string: String,
    database: String,
    collection: String,
    key_selection: KeySelection,
    filter: Option<EqualityFilter>,
    nested_values: NestedValues,
    live_reload: bool,
}

impl MongoConfigOptions {
    /// Build options from every setting at once
    ///
    /// The four named constructors cover the common cases with
    /// [`NestedValues::Serialize`]; use this one to pick another nested mode.
    pub fn new(
        connection_string: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
        key_selection: KeySelection,
        filter: Option<EqualityFilter>,
        nested_values: NestedValues,
    ) -> OptionsResult<Self> {
        let options = Self {
            connection_string: connection_string.into(),
            database: database.into(),
            collection: collection.into(),
            key_selection,
            filter,
            nested_values,
            live_reload: true,
        };
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> OptionsResult<()> {
        if self.database.trim().is_empty() {
            return Err(OptionsError::MissingDatabase);
        }
        if self.collection.trim().is_empty() {
            return Err(OptionsError::MissingCollection);
        }
        if let KeySelection::DefinedKeys(keys) = &self.key_selection {
            if keys.is_empty() {
                return Err(OptionsError::EmptyKeySet);
            }
        }
        if let Some(filter) = &self.filter {
            if filter.field.is_empty() {
                return Err(OptionsError::EmptyFilterField);
            }
        }
        Ok(())
    }

    /// Every field of every document
    pub fn all_keys_all_documents(
        connection_string: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> OptionsResult<Self> {
        Self::new(
            connection_string,
            database,
            collection,
            KeySelection::ReadAll,
            None,
            NestedValues::Serialize,
        )
    }

    /// Only the listed fields, from every document
    pub fn defined_keys_all_documents<I, S>(
        connection_string: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
        keys: I,
    ) -> OptionsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            connection_string,
            database,
            collection,
            KeySelection::DefinedKeys(keys.into_iter().map(Into::into).collect()),
            None,
            NestedValues::Serialize,
        )
    }

    /// Every field, from documents where `field == value`
    pub fn all_keys_filtered_documents(
        connection_string: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Bson>,
    ) -> OptionsResult<Self> {
        Self::new(
            connection_string,
            database,
            collection,
            KeySelection::ReadAll,
            Some(EqualityFilter::new(field, value)),
            NestedValues::Serialize,
        )
    }

    /// Only the listed fields, from documents where `field == value`
    pub fn defined_keys_filtered_documents<I, S>(
        connection_string: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Bson>,
        keys: I,
    ) -> OptionsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            connection_string,
            database,
            collection,
            KeySelection::DefinedKeys(keys.into_iter().map(Into::into).collect()),
            Some(EqualityFilter::new(field, value)),
            NestedValues::Serialize,
        )
    }

    /// Enable or disable the change watcher (enabled by default)
    pub fn with_live_reload(mut self, enabled: bool) -> Self {
        self.live_reload = enabled;
        self
    }

    /// Toggle live reload in place
    ///
    /// A provider copies the options when it is built; toggling this
    /// afterwards doesn't affect it.
    pub fn set_live_reload(&mut self, enabled: bool) {
        self.live_reload = enabled;
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn key_selection(&self) -> &KeySelection {
        &self.key_selection
    }

    /// The equality predicate, present only in filtered mode
    pub fn filter(&self) -> Option<&EqualityFilter> {
        self.filter.as_ref()
    }

    pub fn nested_values(&self) -> NestedValues {
        self.nested_values
    }

    pub fn live_reload(&self) -> bool {
        self.live_reload
    }
}
