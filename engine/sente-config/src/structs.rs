//! Configuration struct definitions.
//!
//! All config structs with serde deserialization support and default
//! values, matching `sente.toml`.

use serde::Deserialize;
use thiserror::Error;

use crate::defaults;

fn d_log_level() -> String {
    defaults::log_level().into()
}
fn d_log_format() -> String {
    defaults::log_format().into()
}
fn d_num_threads() -> usize {
    defaults::num_threads()
}
fn d_max_playouts() -> u32 {
    defaults::max_playouts()
}
fn d_max_visits() -> u32 {
    defaults::max_visits()
}
fn d_max_tree_size() -> usize {
    defaults::max_tree_size()
}
fn d_puct() -> f32 {
    defaults::puct()
}
fn d_fpu_reduction() -> f32 {
    defaults::fpu_reduction()
}
fn d_min_psa_ratio() -> f32 {
    defaults::min_psa_ratio()
}
fn d_use_symmetries() -> bool {
    defaults::use_symmetries()
}
fn d_resign_pct() -> i32 {
    defaults::resign_pct()
}
fn d_random_move_count() -> u32 {
    defaults::random_move_count()
}
fn d_time_for_move_ms() -> u64 {
    defaults::time_for_move_ms()
}
fn d_analyze_interval_ms() -> u64 {
    defaults::analyze_interval_ms()
}
fn d_can_accumulate_time() -> bool {
    defaults::can_accumulate_time()
}
fn d_time_management() -> bool {
    defaults::time_management()
}
fn d_batch_size() -> usize {
    defaults::batch_size()
}
fn d_batch_wait_ms() -> u64 {
    defaults::batch_wait_ms()
}
fn d_cache_bytes() -> usize {
    defaults::cache_bytes()
}

/// Infeasible configuration, reported synchronously from validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("search.num_threads must be greater than 0")]
    NoThreads,

    #[error("search.max_tree_size must be greater than 0")]
    NoTree,

    #[error("network.batch_size must be greater than 0")]
    NoBatch,

    #[error("network.cache_bytes of {requested} is below the minimum of {minimum}")]
    CacheTooSmall { requested: usize, minimum: usize },

    #[error("logging.format must be 'text' or 'json', got '{0}'")]
    BadLogFormat(String),
}

/// Root configuration structure matching sente.toml.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CentralConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl CentralConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.num_threads == 0 {
            return Err(ConfigError::NoThreads);
        }
        if self.search.max_tree_size == 0 {
            return Err(ConfigError::NoTree);
        }
        if self.network.batch_size == 0 {
            return Err(ConfigError::NoBatch);
        }
        if self.network.cache_bytes < defaults::min_cache_bytes() {
            return Err(ConfigError::CacheTooSmall {
                requested: self.network.cache_bytes,
                minimum: defaults::min_cache_bytes(),
            });
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::BadLogFormat(self.logging.format.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "d_log_level")]
    pub level: String,
    #[serde(default = "d_log_format")]
    pub format: String,
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: d_log_level(),
            format: d_log_format(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "d_num_threads")]
    pub num_threads: usize,
    #[serde(default = "d_max_playouts")]
    pub max_playouts: u32,
    #[serde(default = "d_max_visits")]
    pub max_visits: u32,
    #[serde(default = "d_max_tree_size")]
    pub max_tree_size: usize,
    #[serde(default = "d_puct")]
    pub puct: f32,
    #[serde(default = "d_fpu_reduction")]
    pub fpu_reduction: f32,
    #[serde(default = "d_fpu_reduction")]
    pub fpu_root_reduction: f32,
    #[serde(default = "d_min_psa_ratio")]
    pub min_psa_ratio: f32,
    #[serde(default = "d_use_symmetries")]
    pub use_symmetries: bool,
    #[serde(default = "d_resign_pct")]
    pub resign_pct: i32,
    #[serde(default = "d_random_move_count")]
    pub random_move_count: u32,
    #[serde(default = "d_time_for_move_ms")]
    pub time_for_move_ms: u64,
    #[serde(default = "d_analyze_interval_ms")]
    pub analyze_interval_ms: u64,
    #[serde(default = "d_can_accumulate_time")]
    pub can_accumulate_time: bool,
    #[serde(default = "d_time_management")]
    pub time_management: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_threads: d_num_threads(),
            max_playouts: d_max_playouts(),
            max_visits: d_max_visits(),
            max_tree_size: d_max_tree_size(),
            puct: d_puct(),
            fpu_reduction: d_fpu_reduction(),
            fpu_root_reduction: d_fpu_reduction(),
            min_psa_ratio: d_min_psa_ratio(),
            use_symmetries: d_use_symmetries(),
            resign_pct: d_resign_pct(),
            random_move_count: d_random_move_count(),
            time_for_move_ms: d_time_for_move_ms(),
            analyze_interval_ms: d_analyze_interval_ms(),
            can_accumulate_time: d_can_accumulate_time(),
            time_management: d_time_management(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "d_batch_size")]
    pub batch_size: usize,
    #[serde(default = "d_batch_wait_ms")]
    pub batch_wait_ms: u64,
    #[serde(default = "d_cache_bytes")]
    pub cache_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            batch_size: d_batch_size(),
            batch_wait_ms: d_batch_wait_ms(),
            cache_bytes: d_cache_bytes(),
        }
    }
}
