//! Replication boundary between the authoritative instance and its mirrors.
//!
//! Replication is state-based: the outbox keeps only the latest
//! [`ReplicatedEmitterState`] per emitter until the transport drains it, so
//! a signal that flips and flips back between drains never reaches mirrors.
//! Mirrors apply what arrives through
//! [`PulseNetwork::apply_replicated`](crate::network::PulseNetwork::apply_replicated),
//! which runs the same fan-out the authority ran locally.

use pulse_types::ReplicatedEmitterState;

/// Pending outbound emitter state, coalesced per emitter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationOutbox {
    pending: Vec<ReplicatedEmitterState>,
}

impl ReplicationOutbox {
    /// Create an empty outbox.
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Queue `state`, replacing any pending state for the same emitter.
    pub fn push(&mut self, state: ReplicatedEmitterState) {
        if let Some(slot) = self
            .pending
            .iter_mut()
            .find(|pending| pending.emitter == state.emitter)
        {
            *slot = state;
        } else {
            self.pending.push(state);
        }
    }

    /// Number of emitters with pending state.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every pending state, in first-queued order.
    pub fn drain(&mut self) -> Vec<ReplicatedEmitterState> {
        std::mem::take(&mut self.pending)
    }
}
