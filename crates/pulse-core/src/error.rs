//! Error types for the `pulse-core` crate.
//!
//! Only misuse of the network API is an error: unknown identities and
//! duplicate spawns. Rejected engagements, writes on mirrors and dangling
//! graph references are expected conditions and are reported through
//! return values and logs instead.

use pulse_types::{ActorId, EmitterId, ReceiverId};

use crate::clock::ClockError;

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// No live emitter has this identity.
    #[error("emitter not found: {0}")]
    EmitterNotFound(EmitterId),

    /// No live receiver has this identity.
    #[error("receiver not found: {0}")]
    ReceiverNotFound(ReceiverId),

    /// No live actor has this identity.
    #[error("actor not found: {0}")]
    ActorNotFound(ActorId),

    /// An emitter with this identity is already spawned.
    #[error("duplicate emitter id: {0}")]
    DuplicateEmitter(EmitterId),

    /// An actor with this identity is already spawned.
    #[error("duplicate actor id: {0}")]
    DuplicateActor(ActorId),

    /// The scheduler clock failed to advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },
}
