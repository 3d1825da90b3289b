//! Shared type definitions for the pulse signal network.
//!
//! Types defined here are used by both the core library and the engine
//! binary, and the UI-facing ones flow to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for emitters, receivers, actors
//! - [`enums`] -- Emitter modes and network roles
//! - [`structs`] -- Outward events, persisted records, replication payloads

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{EmitterMode, NetRole};
pub use ids::{ActorId, EmitterId, ReceiverId};
pub use structs::{EmitterRecord, PulseEvent, ReplicatedEmitterState, TimerModeState};
