//! Central configuration for the Sente engine
//!
//! Configuration is read from `sente.toml` (or the path in the
//! SENTE_CONFIG environment variable) with per-field environment variable
//! overrides of the form `SENTE_<SECTION>_<KEY>`. Infeasible settings are
//! rejected synchronously by [`CentralConfig::validate`].

mod defaults;
mod loader;
mod structs;

#[cfg(test)]
mod tests;

pub use loader::{apply_env_overrides, load_config, load_from_path, CONFIG_SEARCH_PATHS};
pub use structs::{CentralConfig, ConfigError, LoggingConfig, NetworkConfig, SearchConfig};
