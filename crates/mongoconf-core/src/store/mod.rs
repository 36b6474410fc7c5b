//! Document store abstractions and implementations
//!
//! - `DocumentStore` / `ChangeSubscription`: what the provider needs from a database
//! - `MongoDocumentStore`: MongoDB collection via the official driver
//! - `MemoryDocumentStore`: in-process store for tests and offline use

mod traits;
mod error;
mod mongo;
mod memory;

pub use traits::{
    ChangeEvent, ChangeKind, ChangeSubscription, DocumentStore, EqualityFilter, MAX_BATCH_EVENTS,
};
pub use error::{StoreError, StoreResult};
pub use mongo::MongoDocumentStore;
pub use memory::MemoryDocumentStore;
