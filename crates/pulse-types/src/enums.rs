//! Enumeration types for the pulse signal network.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// How an emitter reacts to engagement.
///
/// Fixed at spawn. Selects the legality rules of `can_engage` and what a
/// successful engagement does to the signal.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    TS,
)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum EmitterMode {
    /// Never engageable.
    None,
    /// Each engagement inverts the signal, followed by a short anti-spam
    /// cooldown.
    #[default]
    Toggle,
    /// Engaging turns the signal on until it is explicitly disengaged.
    Hold,
    /// Like [`EmitterMode::Toggle`], but the first engagement locks the
    /// emitter for good.
    ToggleLock,
    /// Engaging turns the signal on and starts a countdown that turns it
    /// back off.
    Timer,
}

impl EmitterMode {
    /// Whether the live signal survives a save/reload cycle in this mode.
    ///
    /// Toggle-style emitters resume where they were left; hold and timer
    /// emitters always come back in their intrinsic default.
    pub const fn persists_signal(self) -> bool {
        matches!(self, Self::Toggle | Self::ToggleLock)
    }
}

impl core::fmt::Display for EmitterMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Toggle => "toggle",
            Self::Hold => "hold",
            Self::ToggleLock => "toggle_lock",
            Self::Timer => "timer",
        };
        f.write_str(name)
    }
}

/// Network role of a simulation instance.
///
/// Exactly one instance holds authority over an emitter's signal; every
/// other instance is a mirror that learns the signal through replication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum NetRole {
    /// The single writer of every emitter signal it hosts.
    #[default]
    Authority,
    /// A read-only copy fed by replication.
    Mirror,
}
