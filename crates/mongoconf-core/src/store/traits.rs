//! Document store abstraction
//!
//! The provider needs three things from the database: fetch every document of
//! the collection (optionally matching one field), and tail the collection for
//! changes. Anything that can do that implements [`DocumentStore`].

use async_trait::async_trait;
use bson::{Bson, Document};

use super::error::StoreResult;

/// Single-field equality predicate (`field == value`)
#[derive(Debug, Clone, PartialEq)]
pub struct EqualityFilter {
    /// Field name, matched case-sensitively like the server does
    pub field: String,
    /// Value the field must equal
    pub value: Bson,
}

impl EqualityFilter {
    /// Create a new filter
    pub fn new(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// The filter as a query document (`{ field: value }`)
    pub fn to_document(&self) -> Document {
        let mut filter = Document::new();
        filter.insert(self.field.clone(), self.value.clone());
        filter
    }

    /// Whether `document` satisfies this filter
    ///
    /// Numbers compare by value across BSON numeric types; arrays match when
    /// any element matches, as the server does for equality on array fields.
    pub fn matches(&self, document: &Document) -> bool {
        match document.get(&self.field) {
            Some(Bson::Array(items)) if !matches!(self.value, Bson::Array(_)) => {
                items.iter().any(|item| values_equal(item, &self.value))
            }
            Some(value) => values_equal(value, &self.value),
            None => matches!(self.value, Bson::Null),
        }
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        // Precision loss above 2^53 is acceptable for a config filter
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Kind of change reported by a tailing subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Replace,
    Delete,
    /// The collection went away or the stream was invalidated
    Invalidate,
    Other(String),
}

/// One change notification
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// `_id` of the affected document, when the store reports it
    pub document_key: Option<Document>,
}

impl ChangeEvent {
    /// Create a change event
    pub fn new(kind: ChangeKind, document_key: Option<Document>) -> Self {
        Self { kind, document_key }
    }
}

/// Most events a single batch drains before it is handed to the watcher
///
/// Under a steady write rate the drain would otherwise never end and the
/// reload would never run.
pub const MAX_BATCH_EVENTS: usize = 1024;

/// A live feed of change batches on one collection
#[async_trait]
pub trait ChangeSubscription: Send {
    /// Wait for the next burst of changes
    ///
    /// Blocks until at least one notification arrives, then drains the
    /// notifications that are already available, up to
    /// [`MAX_BATCH_EVENTS`], so a multi-document write shows up as one batch.
    /// Returns `Ok(None)` once the feed is closed.
    async fn next_batch(&mut self) -> StoreResult<Option<Vec<ChangeEvent>>>;
}

/// Source of configuration documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable name of this store
    fn name(&self) -> &str;

    /// Fetch every document of the collection, in store order
    async fn find_all(&self, filter: Option<&EqualityFilter>) -> StoreResult<Vec<Document>>;

    /// Open a tailing subscription on the collection
    ///
    /// Returns `Err(StoreError::WatchUnsupported)` if the store can't tail.
    async fn watch(&self) -> StoreResult<Box<dyn ChangeSubscription>>;
}
