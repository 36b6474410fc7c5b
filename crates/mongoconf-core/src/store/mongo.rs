//! MongoDB-backed document store

use async_trait::async_trait;
use bson::Document;
use futures::{StreamExt, TryStreamExt};
use mongodb::change_stream::event::{ChangeStreamEvent, OperationType};
use mongodb::change_stream::ChangeStream;
use mongodb::error::ErrorKind;
use mongodb::{Client, Collection};

use super::error::{StoreError, StoreResult};
use super::traits::{
    ChangeEvent, ChangeKind, ChangeSubscription, DocumentStore, EqualityFilter, MAX_BATCH_EVENTS,
};

/// Document store reading one MongoDB collection
///
/// # Example
///
/// ```no_run
/// use mongoconf_core::store::{DocumentStore, MongoDocumentStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MongoDocumentStore::connect(
///     "mongodb://localhost:27017",
///     "myconfigdb",
///     "settings",
/// ).await?;
/// let documents = store.find_all(None).await?;
/// # Ok(())
/// # }
/// ```
pub struct MongoDocumentStore {
    name: String,
    collection: Collection<Document>,
}

impl MongoDocumentStore {
    /// Create a client for `connection_string` and bind to `database.collection`
    ///
    /// The driver connects lazily; an unreachable server shows up on the
    /// first query, a malformed connection string fails here.
    pub async fn connect(
        connection_string: &str,
        database: &str,
        collection: &str,
    ) -> StoreResult<Self> {
        let client = Client::with_uri_str(connection_string).await?;
        Ok(Self::from_collection(
            client.database(database).collection::<Document>(collection),
        ))
    }

    /// Wrap an existing collection handle
    pub fn from_collection(collection: Collection<Document>) -> Self {
        Self {
            name: format!("mongodb:{}", collection.namespace()),
            collection,
        }
    }
}

impl std::fmt::Debug for MongoDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDocumentStore")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_all(&self, filter: Option<&EqualityFilter>) -> StoreResult<Vec<Document>> {
        let query = filter.map(EqualityFilter::to_document).unwrap_or_default();
        let cursor = self.collection.find(query).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents)
    }

    async fn watch(&self) -> StoreResult<Box<dyn ChangeSubscription>> {
        match self.collection.watch().await {
            Ok(stream) => Ok(Box::new(MongoSubscription { stream })),
            Err(e) => Err(map_watch_error(&self.name, e)),
        }
    }
}

/// A server that can't open a change stream answers with a command error
/// (e.g. code 40573 on a standalone server).
fn map_watch_error(store: &str, error: mongodb::error::Error) -> StoreError {
    match error.kind.as_ref() {
        ErrorKind::Command(command) => StoreError::watch_unsupported(
            store,
            format!("{} ({})", command.message, command.code),
        ),
        _ => StoreError::Mongo(error),
    }
}

struct MongoSubscription {
    stream: ChangeStream<ChangeStreamEvent<Document>>,
}

#[async_trait]
impl ChangeSubscription for MongoSubscription {
    async fn next_batch(&mut self) -> StoreResult<Option<Vec<ChangeEvent>>> {
        let first = match self.stream.next().await {
            Some(event) => event?,
            None => return Ok(None),
        };

        let mut batch = vec![to_change_event(first)];
        // next_if_any makes at most one round trip and returns None once the
        // server has nothing more buffered for this burst
        while batch.len() < MAX_BATCH_EVENTS {
            match self.stream.next_if_any().await? {
                Some(event) => batch.push(to_change_event(event)),
                None => break,
            }
        }
        Ok(Some(batch))
    }
}

fn to_change_event(event: ChangeStreamEvent<Document>) -> ChangeEvent {
    ChangeEvent::new(change_kind(&event.operation_type), event.document_key)
}

fn change_kind(operation: &OperationType) -> ChangeKind {
    match operation {
        OperationType::Insert => ChangeKind::Insert,
        OperationType::Update => ChangeKind::Update,
        OperationType::Replace => ChangeKind::Replace,
        OperationType::Delete => ChangeKind::Delete,
        OperationType::Invalidate => ChangeKind::Invalidate,
        OperationType::Other(name) => ChangeKind::Other(name.clone()),
        other => ChangeKind::Other(format!("{:?}", other)),
    }
}
