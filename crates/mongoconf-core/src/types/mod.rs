//! Shared runtime types
//!
//! Types used by both the document store layer and the provider layer.

mod cancellation;

pub use cancellation::CancellationToken;
