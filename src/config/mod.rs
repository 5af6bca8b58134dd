/// Typed agent configuration loaded from TOML
#[allow(clippy::module_inception)]
pub mod config;

/// Path lookups over the configuration tree
pub mod store;

pub use config::{AgentConfig, Config, OutputConfig};
pub use store::{get_string, lookup, ConfigStore, EmptyStore};

#[cfg(test)]
pub use store::MockConfigStore;
