//! sente-gtp - Go Text Protocol host for the Sente engine
//!
//! A thin host process that:
//! 1. Loads configuration from sente.toml / environment / CLI
//! 2. Instantiates the parallel search engine over the Go rules crate
//! 3. Speaks GTP on stdin/stdout

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod commands;
mod config;

use crate::commands::Gtp;
use crate::config::Config;

/// Initialize tracing. Diagnostics go to stderr so the GTP stream on
/// stdout stays clean; SENTE_LOGGING_FORMAT=json switches to structured
/// output.
fn init_tracing(level: &str, logging: &sente_config::LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.is_json() {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let config = Config::parse();
    config.validate()?;
    init_tracing(&config.log_level, &config::central().logging)?;

    info!(
        boardsize = config.boardsize,
        komi = config.komi,
        threads = config.threads,
        playouts = config.playouts,
        visits = config.visits,
        "engine starting"
    );

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut gtp = Gtp::new(config)?;
    gtp.run(stdin.lock(), stdout.lock())?;

    info!("engine shutting down");
    Ok(())
}
