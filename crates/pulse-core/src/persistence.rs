//! Persistence bridge between live emitters and stored records.
//!
//! An emitter is snapshotted into an [`EmitterRecord`] when it is
//! destroyed, before its timers are cancelled. When an emitter with the same
//! identity is spawned again, [`restore`] folds the record into its spawn
//! settings according to the mode:
//!
//! - `Toggle` and `ToggleLock` resume with the saved signal; `ToggleLock`
//!   also keeps its lock.
//! - `Hold` and `Timer` always come back with their configured starting
//!   signal; only activation carries over.
//! - `None` ignores the record.

use std::collections::BTreeMap;

use pulse_types::{EmitterId, EmitterMode, EmitterRecord};

use crate::emitter::{EmitterSettings, PulseEmitter};

/// Errors raised while encoding or decoding a save store.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The JSON payload could not be produced or parsed.
    #[error("save data encoding error: {source}")]
    Json {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },
}

/// Keyed storage for emitter records.
pub trait SaveStore: core::fmt::Debug {
    /// Store `record` for `emitter`, replacing any previous one.
    fn save(&mut self, emitter: EmitterId, record: EmitterRecord);

    /// Fetch the stored record for `emitter`.
    fn load(&self, emitter: EmitterId) -> Option<EmitterRecord>;
}

/// Whether an emitter is written to the save store on destruction.
pub const fn should_persist(_emitter: &PulseEmitter) -> bool {
    true
}

/// Snapshot the live state of `emitter`.
pub const fn snapshot(emitter: &PulseEmitter) -> EmitterRecord {
    emitter.snapshot()
}

/// Fold a stored record into spawn settings using the per-mode policy.
pub const fn restore(settings: &mut EmitterSettings, record: &EmitterRecord) {
    if matches!(settings.mode, EmitterMode::None) {
        return;
    }
    settings.spawn_active = record.active;
    if settings.mode.persists_signal() {
        settings.starting_signal = record.signal;
    }
    if matches!(settings.mode, EmitterMode::ToggleLock) {
        settings.locked = record.locked;
    }
}

/// In-memory [`SaveStore`], exportable to JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemorySaveStore {
    records: BTreeMap<EmitterId, EmitterRecord>,
}

impl InMemorySaveStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Encode every record as a JSON object keyed by emitter ID.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Json`] if encoding fails.
    pub fn to_json(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    /// Decode a store produced by [`InMemorySaveStore::to_json`].
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Json`] if the payload is malformed.
    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        let records = serde_json::from_str(json)?;
        Ok(Self { records })
    }
}

impl SaveStore for InMemorySaveStore {
    fn save(&mut self, emitter: EmitterId, record: EmitterRecord) {
        self.records.insert(emitter, record);
    }

    fn load(&self, emitter: EmitterId) -> Option<EmitterRecord> {
        self.records.get(&emitter).copied()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAVED: EmitterRecord = EmitterRecord {
        signal: true,
        locked: true,
        active: false,
    };

    fn restored(mode: EmitterMode) -> EmitterSettings {
        let mut settings = EmitterSettings::new(EmitterId::new(), "switch", mode);
        restore(&mut settings, &SAVED);
        settings
    }

    #[test]
    fn toggle_resumes_saved_signal() {
        let s = restored(EmitterMode::Toggle);
        assert!(s.starting_signal);
        assert!(!s.spawn_active);
        assert!(!s.locked);
    }

    #[test]
    fn toggle_lock_restores_lock() {
        let s = restored(EmitterMode::ToggleLock);
        assert!(s.starting_signal);
        assert!(s.locked);
        assert!(!s.spawn_active);
    }

    #[test]
    fn hold_and_timer_only_carry_activation() {
        for mode in [EmitterMode::Hold, EmitterMode::Timer] {
            let s = restored(mode);
            assert!(!s.starting_signal);
            assert!(!s.locked);
            assert!(!s.spawn_active);
        }
    }

    #[test]
    fn none_mode_ignores_record() {
        let s = restored(EmitterMode::None);
        assert!(!s.starting_signal);
        assert!(s.spawn_active);
    }

    #[test]
    fn saved_signal_returns_only_for_modes_that_persist_it() {
        for mode in [
            EmitterMode::None,
            EmitterMode::Toggle,
            EmitterMode::Hold,
            EmitterMode::ToggleLock,
            EmitterMode::Timer,
        ] {
            let s = restored(mode);
            assert_eq!(s.starting_signal, mode.persists_signal(), "{mode}");
        }
    }

    #[test]
    fn store_roundtrips_through_json() {
        let mut store = InMemorySaveStore::new();
        let id = EmitterId::new();
        store.save(id, SAVED);
        let json = store.to_json().unwrap();
        let back = InMemorySaveStore::from_json(&json).unwrap();
        assert_eq!(back.load(id), Some(SAVED));
        assert_eq!(back, store);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(InMemorySaveStore::from_json("{not json").is_err());
    }
}
