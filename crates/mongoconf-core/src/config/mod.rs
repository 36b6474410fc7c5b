//! Host-side configuration abstractions
//!
//! The pieces a configuration provider plugs into:
//! - `ConfigurationProvider` / `ConfigurationSource`: the provider contract
//! - `ReloadToken` / `ReloadTrigger`: one-shot change notification
//! - `ConfigurationBuilder` / `ConfigurationRoot`: layering of providers
//! - `MemoryConfigurationProvider`: In-memory layer
//! - `path`: key delimiter and key ordering

mod traits;
mod memory;
mod reload;
mod root;
pub mod path;

pub use traits::{ConfigurationProvider, ConfigurationSource, ConfigError, ConfigResult};
pub use memory::MemoryConfigurationProvider;
pub use reload::{ReloadToken, ReloadTrigger};
pub use root::{ConfigurationBuilder, ConfigurationRoot};
pub use path::{compare_keys, KEY_DELIMITER};
