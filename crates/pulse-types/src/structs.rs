//! Payload structs that cross the crate boundary: outward events, the
//! persisted emitter record, and the replication message.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{ActorId, EmitterId, ReceiverId};

/// An event raised by the network for external listeners such as a UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PulseEvent {
    /// An emitter's signal changed.
    EmitterChanged {
        /// The emitter whose signal changed.
        emitter: EmitterId,
        /// The new signal.
        signal: bool,
    },
    /// A receiver's exposed pulse changed while its owner was ready.
    ReceiverPulseUpdated {
        /// The receiver that changed.
        receiver: ReceiverId,
        /// The actor owning the receiver.
        owner: ActorId,
        /// The receiver's pulse after inversion.
        pulse: bool,
    },
    /// Whether an emitter accepts engagement flipped.
    CanEngageChanged {
        /// The emitter concerned.
        emitter: EmitterId,
        /// The new engageability.
        can_engage: bool,
    },
}

/// Stored snapshot of an emitter, written on destruction and read back on
/// reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EmitterRecord {
    /// Live signal at snapshot time.
    pub signal: bool,
    /// Toggle-lock state at snapshot time.
    pub locked: bool,
    /// Whether the emitter was accepting engagement.
    pub active: bool,
}

/// Emitter state pushed from the authoritative instance to its mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ReplicatedEmitterState {
    /// The emitter the state belongs to.
    pub emitter: EmitterId,
    /// Authoritative signal.
    pub signal: bool,
    /// Authoritative toggle-lock state.
    pub locked: bool,
}

/// Progress of a timer-mode countdown, for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TimerModeState {
    /// Whether the countdown is running.
    pub active: bool,
    /// Configured countdown length in milliseconds.
    pub total_duration_ms: u64,
    /// Elapsed fraction of the countdown in `[0, 1]`; zero when idle.
    pub normalized: f32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let emitter = EmitterId::new();
        let event = PulseEvent::EmitterChanged {
            emitter,
            signal: true,
        };
        let value = serde_json::to_value(event).unwrap();
        assert_eq!(value["type"], "emitter_changed");
        assert_eq!(value["signal"], true);
    }

    #[test]
    fn record_defaults_to_all_off() {
        let record = EmitterRecord::default();
        assert!(!record.signal);
        assert!(!record.locked);
        assert!(!record.active);
    }
}
