//! Configuration loading logic.
//!
//! Handles loading config from files and applying environment variable
//! overrides.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::CentralConfig;

/// Standard locations to search for sente.toml
pub const CONFIG_SEARCH_PATHS: &[&str] = &["sente.toml", "../sente.toml"];

/// Load the central configuration.
///
/// Searches in the following order:
/// 1. Path specified by the SENTE_CONFIG environment variable
/// 2. Current directory (sente.toml)
/// 3. Parent directory (../sente.toml)
///
/// After loading, environment variable overrides are applied.
pub fn load_config() -> CentralConfig {
    if let Ok(path) = std::env::var("SENTE_CONFIG") {
        let path = PathBuf::from(&path);
        if path.exists() {
            info!("loading config from SENTE_CONFIG: {}", path.display());
            return load_from_path(&path);
        }
        warn!(
            "SENTE_CONFIG={} not found, searching defaults",
            path.display()
        );
    }

    for path_str in CONFIG_SEARCH_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("loading config from {}", path.display());
            return load_from_path(&path);
        }
    }

    debug!("no sente.toml found, using built-in defaults");
    apply_env_overrides(CentralConfig::default())
}

/// Load configuration from a specific path.
pub fn load_from_path(path: &Path) -> CentralConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => apply_env_overrides(config),
            Err(e) => {
                warn!("failed to parse {}: {}, using defaults", path.display(), e);
                apply_env_overrides(CentralConfig::default())
            }
        },
        Err(e) => {
            warn!("failed to read {}: {}, using defaults", path.display(), e);
            apply_env_overrides(CentralConfig::default())
        }
    }
}

/// Macro to reduce env override boilerplate
macro_rules! env_override {
    // String field
    ($config:expr, $section:ident . $field:ident, $key:expr) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v;
        }
    };
    // Parseable field (usize, u32, f32, bool, ...)
    ($config:expr, $section:ident . $field:ident, $key:expr, parse) => {
        if let Ok(v) =
            std::env::var($key).and_then(|s| s.parse().map_err(|_| std::env::VarError::NotPresent))
        {
            $config.$section.$field = v;
        }
    };
}

/// Apply environment variable overrides to a configuration.
///
/// Environment variables follow the pattern: SENTE_<SECTION>_<KEY>
pub fn apply_env_overrides(mut config: CentralConfig) -> CentralConfig {
    env_override!(config, logging.level, "SENTE_LOGGING_LEVEL");
    env_override!(config, logging.format, "SENTE_LOGGING_FORMAT");

    env_override!(config, search.num_threads, "SENTE_SEARCH_NUM_THREADS", parse);
    env_override!(
        config,
        search.max_playouts,
        "SENTE_SEARCH_MAX_PLAYOUTS",
        parse
    );
    env_override!(config, search.max_visits, "SENTE_SEARCH_MAX_VISITS", parse);
    env_override!(
        config,
        search.max_tree_size,
        "SENTE_SEARCH_MAX_TREE_SIZE",
        parse
    );
    env_override!(config, search.puct, "SENTE_SEARCH_PUCT", parse);
    env_override!(
        config,
        search.fpu_reduction,
        "SENTE_SEARCH_FPU_REDUCTION",
        parse
    );
    env_override!(
        config,
        search.fpu_root_reduction,
        "SENTE_SEARCH_FPU_ROOT_REDUCTION",
        parse
    );
    env_override!(
        config,
        search.min_psa_ratio,
        "SENTE_SEARCH_MIN_PSA_RATIO",
        parse
    );
    env_override!(
        config,
        search.use_symmetries,
        "SENTE_SEARCH_USE_SYMMETRIES",
        parse
    );
    env_override!(config, search.resign_pct, "SENTE_SEARCH_RESIGN_PCT", parse);
    env_override!(
        config,
        search.random_move_count,
        "SENTE_SEARCH_RANDOM_MOVE_COUNT",
        parse
    );
    env_override!(
        config,
        search.time_for_move_ms,
        "SENTE_SEARCH_TIME_FOR_MOVE_MS",
        parse
    );
    env_override!(
        config,
        search.analyze_interval_ms,
        "SENTE_SEARCH_ANALYZE_INTERVAL_MS",
        parse
    );
    env_override!(
        config,
        search.can_accumulate_time,
        "SENTE_SEARCH_CAN_ACCUMULATE_TIME",
        parse
    );
    env_override!(
        config,
        search.time_management,
        "SENTE_SEARCH_TIME_MANAGEMENT",
        parse
    );

    env_override!(config, network.batch_size, "SENTE_NETWORK_BATCH_SIZE", parse);
    env_override!(
        config,
        network.batch_wait_ms,
        "SENTE_NETWORK_BATCH_WAIT_MS",
        parse
    );
    env_override!(
        config,
        network.cache_bytes,
        "SENTE_NETWORK_CACHE_BYTES",
        parse
    );

    config
}
