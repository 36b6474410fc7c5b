//! In-memory document store

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::Document;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::error::{StoreError, StoreResult};
use super::traits::{
    ChangeEvent, ChangeKind, ChangeSubscription, DocumentStore, EqualityFilter, MAX_BATCH_EVENTS,
};

/// In-memory document store for testing and offline use
///
/// Documents keep insertion order. Every mutation publishes one change batch
/// to all open subscriptions, so a `replace_all` behaves like a
/// multi-document transaction: one burst, one reload.
///
/// # Example
///
/// ```
/// use mongoconf_core::store::{DocumentStore, MemoryDocumentStore};
/// use bson::doc;
///
/// let store = MemoryDocumentStore::with_documents(vec![
///     doc! { "_id": 1, "env": "dev", "key1": "A" },
/// ]);
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<Vec<Document>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Vec<ChangeEvent>>>>,
    watch_unsupported: AtomicBool,
    fail_fetch: AtomicBool,
}

impl MemoryDocumentStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with initial documents
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            documents: RwLock::new(documents),
            ..Self::default()
        }
    }

    /// Make `watch` fail the way a server without change streams does
    pub fn set_watch_unsupported(&self, unsupported: bool) {
        self.watch_unsupported.store(unsupported, Ordering::SeqCst);
    }

    /// Make `find_all` fail until switched back
    pub fn set_fetch_failure(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Number of documents held
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of subscriptions still listening
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Append a document and publish an insert
    pub fn insert(&self, document: Document) {
        let key = id_of(&document);
        self.documents.write().push(document);
        self.publish(vec![ChangeEvent::new(ChangeKind::Insert, key)]);
    }

    /// Replace every document in one go and publish a single batch
    pub fn replace_all(&self, documents: Vec<Document>) {
        let events = {
            let mut guard = self.documents.write();
            let mut events: Vec<ChangeEvent> = guard
                .iter()
                .map(|d| ChangeEvent::new(ChangeKind::Delete, id_of(d)))
                .collect();
            events.extend(
                documents
                    .iter()
                    .map(|d| ChangeEvent::new(ChangeKind::Insert, id_of(d))),
            );
            *guard = documents;
            events
        };
        self.publish(events);
    }

    /// Send a batch to every open subscription
    ///
    /// Publishing an empty batch models a server round trip that returned no
    /// changes.
    pub fn publish(&self, batch: Vec<ChangeEvent>) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(batch.clone()).is_ok());
    }

    /// Close every open subscription
    pub fn close_subscriptions(&self) {
        self.subscribers.lock().clear();
    }
}

fn id_of(document: &Document) -> Option<Document> {
    document.get("_id").map(|id| {
        let mut key = Document::new();
        key.insert("_id", id.clone());
        key
    })
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find_all(&self, filter: Option<&EqualityFilter>) -> StoreResult<Vec<Document>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".to_string()));
        }

        let documents = self.documents.read();
        Ok(documents
            .iter()
            .filter(|d| filter.map_or(true, |f| f.matches(d)))
            .cloned()
            .collect())
    }

    async fn watch(&self) -> StoreResult<Box<dyn ChangeSubscription>> {
        if self.watch_unsupported.load(Ordering::SeqCst) {
            return Err(StoreError::watch_unsupported(
                self.name(),
                "The $changeStream stage is only supported on replica sets",
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        Ok(Box::new(MemorySubscription { rx }))
    }
}

struct MemorySubscription {
    rx: mpsc::UnboundedReceiver<Vec<ChangeEvent>>,
}

#[async_trait]
impl ChangeSubscription for MemorySubscription {
    async fn next_batch(&mut self) -> StoreResult<Option<Vec<ChangeEvent>>> {
        let mut batch = match self.rx.recv().await {
            Some(batch) => batch,
            None => return Ok(None),
        };

        // Coalesce whatever else is already queued
        while batch.len() < MAX_BATCH_EVENTS {
            match self.rx.try_recv() {
                Ok(more) => batch.extend(more),
                Err(_) => break,
            }
        }
        Ok(Some(batch))
    }
}
