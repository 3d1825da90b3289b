//! Emitters, receivers, timers and propagation for the pulse signal network.
//!
//! Emitters hold one boolean signal behind an engagement state machine;
//! receivers fold the signals of the emitters they observe into a single
//! boolean and announce changes once their owner is ready. The
//! [`PulseNetwork`] owns both and runs every update synchronously.
//!
//! # Modules
//!
//! - [`clock`] -- Scheduler clock (tick counter plus simulated time).
//! - [`config`] -- Configuration loading from `pulse-config.yaml` into
//!   strongly-typed structs.
//! - [`emitter`] -- [`PulseEmitter`] and its per-mode state machine.
//! - [`error`] -- Error types for network operations.
//! - [`network`] -- [`PulseNetwork`], the arena that owns the propagation
//!   graph and performs fan-out.
//! - [`persistence`] -- Snapshot/restore policy and the [`SaveStore`] trait.
//! - [`policy`] -- [`EngagePolicy`] capability hook.
//! - [`receiver`] -- [`PulseReceiver`] aggregation.
//! - [`replication`] -- Outbox of emitter state bound for mirrors.
//! - [`timer`] -- [`TimerService`] trait and [`TickTimerService`].
//!
//! [`PulseEmitter`]: emitter::PulseEmitter
//! [`PulseNetwork`]: network::PulseNetwork
//! [`SaveStore`]: persistence::SaveStore
//! [`EngagePolicy`]: policy::EngagePolicy
//! [`PulseReceiver`]: receiver::PulseReceiver
//! [`TimerService`]: timer::TimerService
//! [`TickTimerService`]: timer::TickTimerService

pub mod clock;
pub mod config;
pub mod emitter;
pub mod error;
pub mod network;
pub mod persistence;
pub mod policy;
pub mod receiver;
pub mod replication;
pub mod timer;

// Re-export primary types at crate root.
pub use config::{ConfigError, PulseConfig};
pub use emitter::{EmitterSettings, PulseEmitter, Transition};
pub use error::NetworkError;
pub use network::{ActorSettings, PulseNetwork};
pub use persistence::{InMemorySaveStore, PersistenceError, SaveStore};
pub use policy::{AllowAll, AllowList, EngagePolicy};
pub use receiver::{PulseReceiver, ReceiverSettings, RecomputeOutcome, SignalSource};
pub use timer::{TickTimerService, TimerService};
