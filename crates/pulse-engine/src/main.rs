//! Engine binary for the pulse signal network.
//!
//! Loads a level, instantiates it on an authoritative instance and a
//! mirror, and plays its scripted timeline tick by tick, forwarding
//! emitter state from the authority to the mirror as it changes.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the path given as the first argument, or
//!    `pulse-config.yaml`
//! 2. Initialize structured logging (tracing) from `logging`
//! 3. Build the level on both instances
//! 4. Run the tick loop
//! 5. Log the result and check the mirror agrees with the authority

mod error;
mod level;
mod runner;

use std::path::{Path, PathBuf};

use pulse_core::PulseConfig;
use pulse_core::config::{LogFormat, LoggingConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::level::Level;
use crate::runner::LogSink;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "pulse-config.yaml";

/// Application entry point for the pulse engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the run itself fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, loaded) = load_config(&path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!("pulse-engine starting");
    if loaded {
        info!(path = %path.display(), "Configuration loaded");
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
    }
    info!(
        tick_interval_ms = config.scheduler.tick_interval_ms,
        max_ticks = config.scheduler.max_ticks,
        toggle_cooldown_ms = config.emitter.toggle_cooldown_ms,
        timer_mode_duration_ms = config.emitter.timer_mode_duration_ms,
        "Scheduler configured"
    );

    // 3. Build the level.
    let mut level = Level::build(&config.level, &config.emitter)?;

    // 4. Run.
    let result = runner::run(&mut level, &config.scheduler, &mut LogSink).await?;

    // 5. Report.
    if !level.log_final_state() {
        warn!("Mirror state diverged from the authority");
    }
    info!(
        total_ticks = result.total_ticks,
        events = result.events,
        "pulse-engine shutdown complete"
    );
    Ok(())
}

/// Load configuration from `path`, falling back to defaults if the file
/// does not exist. Returns whether the file was read.
fn load_config(path: &Path) -> Result<(PulseConfig, bool), EngineError> {
    if path.exists() {
        Ok((PulseConfig::from_file(path)?, true))
    } else {
        let mut config = PulseConfig::default();
        config.logging.apply_env_overrides();
        Ok((config, false))
    }
}

/// Install the global tracing subscriber.
fn init_logging(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_new(&logging.level).map_err(|e| EngineError::Logging {
        message: format!("invalid log filter {:?}: {e}", logging.level),
    })?;
    match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
    Ok(())
}
