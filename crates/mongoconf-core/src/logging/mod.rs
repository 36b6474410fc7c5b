//! Logging abstractions for runtime-agnostic logging

mod traits;
mod noop;
mod console;

use std::sync::Arc;

use once_cell::sync::Lazy;

pub use traits::{LogLevel, Logger, SharedLogger};
pub use noop::NoOpLogger;
pub use console::ConsoleLogger;

static DEFAULT_LOGGER: Lazy<SharedLogger> = Lazy::new(|| Arc::new(ConsoleLogger::new()));

/// Process-wide console logger used when a provider isn't given one
pub fn default_logger() -> SharedLogger {
    DEFAULT_LOGGER.clone()
}
