//! Configuration loading and typed config structures for the pulse network.
//!
//! The canonical configuration lives in `pulse-config.yaml` at the project
//! root. It carries scheduler timing, emitter timing defaults, logging, and
//! the level to build: actors, emitters, their wiring, and a scripted
//! interaction timeline. Every field has a default, so an empty file is a
//! valid (if idle) configuration.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use pulse_types::EmitterMode;
use serde::Deserialize;

use crate::emitter::{DEFAULT_TIMER_MODE_DURATION, DEFAULT_TOGGLE_COOLDOWN};

/// Environment variable that overrides `logging.level`.
pub const LOG_LEVEL_ENV: &str = "PULSE_LOG";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but is inconsistent.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PulseConfig {
    /// Scheduler timing.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Emitter timing defaults.
    #[serde(default)]
    pub emitter: EmitterDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// The level to build.
    #[serde(default)]
    pub level: LevelConfig,
}

impl PulseConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// `PULSE_LOG` overrides `logging.level` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.logging.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency: positive tick interval, unique names,
    /// and wiring/timeline references that resolve.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(invalid("scheduler.tick_interval_ms must be at least 1"));
        }

        let mut actors = BTreeSet::new();
        for actor in &self.level.actors {
            if !actors.insert(actor.name.as_str()) {
                return Err(invalid(format!("duplicate actor name: {}", actor.name)));
            }
        }

        let mut emitters = BTreeSet::new();
        for emitter in &self.level.emitters {
            if !emitters.insert(emitter.name.as_str()) {
                return Err(invalid(format!("duplicate emitter name: {}", emitter.name)));
            }
            if let Some(unknown) = emitter
                .connected
                .iter()
                .find(|name| !actors.contains(name.as_str()))
            {
                return Err(invalid(format!(
                    "emitter {} is connected to undeclared actor {unknown}",
                    emitter.name
                )));
            }
        }

        for entry in &self.level.timeline {
            let (known, kind) = if entry.action.targets_emitter() {
                (emitters.contains(entry.target.as_str()), "emitter")
            } else {
                (actors.contains(entry.target.as_str()), "actor")
            };
            if !known {
                return Err(invalid(format!(
                    "timeline entry at tick {} targets unknown {kind} {}",
                    entry.at_tick, entry.target
                )));
            }
            if let Some(actor) = &entry.actor {
                if !actors.contains(actor.as_str()) {
                    return Err(invalid(format!(
                        "timeline entry at tick {} names unknown actor {actor}",
                        entry.at_tick
                    )));
                }
            }
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}

/// Scheduler timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Real-time milliseconds per scheduler tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Number of ticks to run before stopping.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
}

impl SchedulerConfig {
    /// The tick interval as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: default_max_ticks(),
        }
    }
}

/// Timing defaults applied to every emitter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmitterDefaults {
    /// Anti-spam cooldown after a toggle, in milliseconds.
    #[serde(default = "default_toggle_cooldown_ms")]
    pub toggle_cooldown_ms: u64,

    /// Timer-mode countdown, in milliseconds. Zero completes on the next
    /// tick.
    #[serde(default = "default_timer_mode_duration_ms")]
    pub timer_mode_duration_ms: u64,
}

impl EmitterDefaults {
    /// The toggle cooldown as a [`Duration`].
    pub const fn toggle_cooldown(&self) -> Duration {
        Duration::from_millis(self.toggle_cooldown_ms)
    }

    /// The timer-mode countdown as a [`Duration`].
    pub const fn timer_mode_duration(&self) -> Duration {
        Duration::from_millis(self.timer_mode_duration_ms)
    }
}

impl Default for EmitterDefaults {
    fn default() -> Self {
        Self {
            toggle_cooldown_ms: default_toggle_cooldown_ms(),
            timer_mode_duration_ms: default_timer_mode_duration_ms(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Apply the `PULSE_LOG` override, if set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.is_empty() {
                self.level = level;
            }
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// The level to build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LevelConfig {
    /// Actors, some of which own receivers.
    #[serde(default)]
    pub actors: Vec<ActorDef>,

    /// Emitters and their wiring.
    #[serde(default)]
    pub emitters: Vec<EmitterDef>,

    /// Scripted interactions.
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
}

/// An actor in the level.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActorDef {
    /// Unique name.
    pub name: String,

    /// Receiver owned by the actor, if any.
    #[serde(default)]
    pub receiver: Option<ReceiverDef>,
}

/// A receiver owned by an actor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ReceiverDef {
    /// Negate the aggregate.
    #[serde(default)]
    pub invert: bool,

    /// OR-aggregate instead of AND.
    #[serde(default)]
    pub partial: bool,
}

/// An emitter in the level.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmitterDef {
    /// Unique name.
    pub name: String,

    /// Engagement mode.
    #[serde(default)]
    pub mode: EmitterMode,

    /// Signal at spawn.
    #[serde(default)]
    pub starting_signal: bool,

    /// Whether the emitter spawns active.
    #[serde(default = "default_true")]
    pub spawn_active: bool,

    /// Per-emitter override of the timer-mode countdown.
    #[serde(default)]
    pub timer_mode_duration_ms: Option<u64>,

    /// Names of the actors this emitter drives.
    #[serde(default)]
    pub connected: Vec<String>,
}

/// A scripted interaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimelineEntry {
    /// Tick at which the interaction runs.
    pub at_tick: u64,

    /// What to do.
    pub action: TimelineAction,

    /// Emitter or actor name, depending on the action.
    pub target: String,

    /// Actor performing an engagement. Defaults to an anonymous actor.
    #[serde(default)]
    pub actor: Option<String>,
}

/// Kinds of scripted interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineAction {
    /// Engage an emitter.
    Engage,
    /// Disengage an emitter.
    Disengage,
    /// Enable engagement on an emitter.
    Activate,
    /// Disable engagement on an emitter.
    Deactivate,
    /// Destroy an emitter, saving its state.
    DestroyEmitter,
    /// Spawn a destroyed emitter again from its saved state.
    RespawnEmitter,
    /// Mark an actor as initialized.
    BeginPlay,
    /// Destroy an actor and its receiver.
    DestroyActor,
}

impl TimelineAction {
    /// Whether the action's target names an emitter (otherwise an actor).
    pub const fn targets_emitter(self) -> bool {
        !matches!(self, Self::BeginPlay | Self::DestroyActor)
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

const fn default_tick_interval_ms() -> u64 {
    16
}

const fn default_max_ticks() -> u64 {
    600
}

fn default_toggle_cooldown_ms() -> u64 {
    u64::try_from(DEFAULT_TOGGLE_COOLDOWN.as_millis())
        .unwrap_or(u64::MAX)
}

fn default_timer_mode_duration_ms() -> u64 {
    u64::try_from(DEFAULT_TIMER_MODE_DURATION.as_millis())
        .unwrap_or(u64::MAX)
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
