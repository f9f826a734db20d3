//! Configuration for the GTP host.
//!
//! Configuration is loaded from sente.toml with environment variable
//! overrides. CLI arguments take highest priority.

use anyhow::{anyhow, Result};
use clap::Parser;
use once_cell::sync::Lazy;
use sente_config::{load_config, CentralConfig};
use sente_search::SearchOptions;
use tracing::level_filters::LevelFilter;

static CENTRAL_CONFIG: Lazy<CentralConfig> = Lazy::new(load_config);

pub fn central() -> &'static CentralConfig {
    &CENTRAL_CONFIG
}

fn default_threads() -> usize {
    CENTRAL_CONFIG.search.num_threads
}

fn default_playouts() -> u32 {
    CENTRAL_CONFIG.search.max_playouts
}

fn default_visits() -> u32 {
    CENTRAL_CONFIG.search.max_visits
}

fn default_time_for_move_ms() -> u64 {
    CENTRAL_CONFIG.search.time_for_move_ms
}

fn default_log_level() -> String {
    CENTRAL_CONFIG.logging.level.clone()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "sente-gtp")]
#[command(about = "Sente - Go Text Protocol engine")]
#[command(
    long_about = "Runs the Sente parallel search engine behind a GTP loop on
stdin/stdout.

Configuration is loaded from sente.toml with environment variable
overrides. CLI arguments take highest priority."
)]
pub struct Config {
    /// Board size
    #[arg(long, default_value_t = 19)]
    pub boardsize: usize,

    /// Komi
    #[arg(long, default_value_t = 7.5)]
    pub komi: f32,

    /// Number of search worker threads
    #[arg(long, default_value_t = default_threads())]
    pub threads: usize,

    /// Playout limit per move
    #[arg(long, default_value_t = default_playouts())]
    pub playouts: u32,

    /// Visit limit per move
    #[arg(long, default_value_t = default_visits())]
    pub visits: u32,

    /// Wall-clock budget per move in milliseconds
    #[arg(long, default_value_t = default_time_for_move_ms())]
    pub time_for_move_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value_t = default_log_level())]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(2..=games_go::MAX_SIZE).contains(&self.boardsize) {
            return Err(anyhow!(
                "unsupported board size {}, expected 2-{}",
                self.boardsize,
                games_go::MAX_SIZE
            ));
        }
        if self.threads == 0 {
            return Err(anyhow!("threads must be greater than 0"));
        }
        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(anyhow!(
                "invalid log level '{}', expected one of trace, debug, info, warn, error",
                self.log_level
            ));
        }
        central().validate()?;
        Ok(())
    }

    /// Search options for one engine instance, merging the central config
    /// with the CLI arguments.
    pub fn search_options(&self) -> SearchOptions {
        let search = &central().search;
        SearchOptions {
            num_threads: self.threads,
            max_tree_size: search.max_tree_size,
            puct: search.puct,
            fpu_reduction: search.fpu_reduction,
            fpu_root_reduction: search.fpu_root_reduction,
            min_psa_ratio: search.min_psa_ratio,
            use_symmetries: search.use_symmetries,
            resign_pct: search.resign_pct,
            random_move_count: search.random_move_count,
            time_for_move_ms: self.time_for_move_ms,
            analyze_interval_ms: search.analyze_interval_ms,
            can_accumulate_time: search.can_accumulate_time,
            time_management: search.time_management,
            ..SearchOptions::default()
        }
        .with_playouts(self.playouts)
        .with_visits(self.visits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            boardsize: 19,
            komi: 7.5,
            threads: 2,
            playouts: 100,
            visits: 100,
            time_for_move_ms: 1000,
            log_level: "info".into(),
        }
    }

    #[test]
    fn validate_accepts_valid_configuration() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_threads() {
        let mut cfg = base_config();
        cfg.threads = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_board_size() {
        let mut cfg = base_config();
        cfg.boardsize = 40;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut cfg = base_config();
        cfg.log_level = "nope".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn search_options_carry_cli_limits() {
        let options = base_config().search_options();
        assert_eq!(options.num_threads, 2);
        assert_eq!(options.max_playouts, 100);
        assert_eq!(options.max_visits, 100);
    }
}
