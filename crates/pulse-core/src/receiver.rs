//! Pulse receiver: folds the signals of its emitters into one boolean.
//!
//! A receiver observes a set of emitters and caches the last aggregate it
//! computed. The aggregate is an AND over all emitters, or an OR when the
//! receiver can be powered partially; inversion is applied only when the
//! value is read. The cached value is always current, but a change event is
//! only produced once the owning actor is ready. A change swallowed before
//! that point is never replayed.

use std::collections::{BTreeMap, BTreeSet};

use pulse_types::{ActorId, EmitterId, ReceiverId};
use tracing::{debug, error, warn};

use crate::emitter::PulseEmitter;

/// Read access to emitter signals by identity.
///
/// `None` means the reference no longer resolves to a live emitter.
pub trait SignalSource {
    /// Current signal of `emitter`, if it is alive.
    fn signal_of(&self, emitter: EmitterId) -> Option<bool>;
}

impl SignalSource for BTreeMap<EmitterId, PulseEmitter> {
    fn signal_of(&self, emitter: EmitterId) -> Option<bool> {
        self.get(&emitter).map(PulseEmitter::signal)
    }
}

/// Spawn-time description of a receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverSettings {
    /// Negate the aggregate before exposing it.
    pub invert: bool,
    /// OR-aggregate (any emitter on) instead of AND (all emitters on).
    pub partial: bool,
}

/// What a recompute pass observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecomputeOutcome {
    /// Whether the aggregate differs from the previous pass.
    pub changed: bool,
    /// The pulse to announce, when the change may be announced.
    pub notify: Option<bool>,
    /// Registered emitters that no longer resolve.
    pub invalid_emitters: usize,
}

/// A live receiver instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseReceiver {
    id: ReceiverId,
    owner: ActorId,
    emitters: BTreeSet<EmitterId>,
    last_aggregate: bool,
    invert: bool,
    partial: bool,
    owner_ready: bool,
    recompute_count: u64,
}

impl PulseReceiver {
    /// Create a receiver owned by `owner`, observing nothing yet.
    pub const fn new(id: ReceiverId, owner: ActorId, settings: ReceiverSettings) -> Self {
        Self {
            id,
            owner,
            emitters: BTreeSet::new(),
            last_aggregate: false,
            invert: settings.invert,
            partial: settings.partial,
            owner_ready: false,
            recompute_count: 0,
        }
    }

    /// Return the receiver's identity.
    pub const fn id(&self) -> ReceiverId {
        self.id
    }

    /// Return the owning actor.
    pub const fn owner(&self) -> ActorId {
        self.owner
    }

    /// Emitters this receiver observes.
    pub const fn emitters(&self) -> &BTreeSet<EmitterId> {
        &self.emitters
    }

    /// Whether the aggregate is an OR.
    pub const fn is_partial(&self) -> bool {
        self.partial
    }

    /// Whether the exposed pulse is inverted.
    pub const fn is_inverted(&self) -> bool {
        self.invert
    }

    /// Whether change events may fire.
    pub const fn is_owner_ready(&self) -> bool {
        self.owner_ready
    }

    /// Number of recompute passes run so far.
    pub const fn recompute_count(&self) -> u64 {
        self.recompute_count
    }

    /// Open or close the notification gate. Opening it never replays a
    /// swallowed change.
    pub const fn set_owner_ready(&mut self, ready: bool) {
        self.owner_ready = ready;
    }

    /// The last aggregate XOR the inversion flag.
    pub const fn pulse(&self) -> bool {
        self.last_aggregate != self.invert
    }

    /// The last aggregate before inversion.
    pub const fn last_aggregate(&self) -> bool {
        self.last_aggregate
    }

    /// Start observing `emitter` and recompute as if it had just changed.
    ///
    /// Returns `None` without touching anything if the emitter does not
    /// resolve. Registering an emitter twice keeps one entry but still runs
    /// a recompute.
    pub fn register(
        &mut self,
        emitter: EmitterId,
        signals: &dyn SignalSource,
    ) -> Option<RecomputeOutcome> {
        if signals.signal_of(emitter).is_none() {
            warn!(receiver = %self.id, %emitter, "refusing to register invalid emitter");
            return None;
        }
        self.emitters.insert(emitter);
        Some(self.recompute(emitter, signals))
    }

    /// Recompute the aggregate after `trigger` changed.
    ///
    /// Every registered emitter is visited even once an AND aggregate is
    /// already false, so a dangling reference is reported on every pass.
    /// The cached aggregate is stored before the readiness gate is
    /// consulted.
    pub fn recompute(
        &mut self,
        trigger: EmitterId,
        signals: &dyn SignalSource,
    ) -> RecomputeOutcome {
        let mut candidate = !self.partial;
        let mut invalid_emitters: usize = 0;

        for &emitter in &self.emitters {
            let Some(signal) = signals.signal_of(emitter) else {
                error!(receiver = %self.id, %emitter, "receiver observes an invalid emitter");
                invalid_emitters = invalid_emitters.saturating_add(1);
                continue;
            };
            if self.partial {
                candidate |= signal;
            } else {
                candidate &= signal;
            }
        }

        let changed = candidate != self.last_aggregate;
        self.last_aggregate = candidate;
        self.recompute_count = self.recompute_count.saturating_add(1);

        let notify = if changed && self.owner_ready {
            Some(self.pulse())
        } else {
            if changed {
                debug!(receiver = %self.id, %trigger, "owner not ready, change not announced");
            }
            None
        };

        RecomputeOutcome {
            changed,
            notify,
            invalid_emitters,
        }
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use pulse_types::{EmitterMode, NetRole};

    use super::*;
    use crate::emitter::EmitterSettings;

    impl SignalSource for BTreeMap<EmitterId, bool> {
        fn signal_of(&self, emitter: EmitterId) -> Option<bool> {
            self.get(&emitter).copied()
        }
    }

    #[test]
    fn emitter_map_resolves_live_signals() {
        let settings = EmitterSettings::new(EmitterId::new(), "lever", EmitterMode::Hold)
            .with_starting_signal(true);
        let mut emitters = BTreeMap::new();
        let emitter = PulseEmitter::spawn(&settings, NetRole::Authority);
        emitters.insert(settings.id, emitter);
        assert_eq!(emitters.signal_of(settings.id), Some(true));
        assert_eq!(emitters.signal_of(EmitterId::new()), None);
        emitters.remove(&settings.id);
        assert_eq!(emitters.signal_of(settings.id), None);
    }

    struct Fixture {
        signals: BTreeMap<EmitterId, bool>,
        ids: Vec<EmitterId>,
    }

    impl Fixture {
        fn new(values: &[bool]) -> Self {
            let ids: Vec<EmitterId> = values.iter().map(|_| EmitterId::new()).collect();
            let signals = ids.iter().copied().zip(values.iter().copied()).collect();
            Self { signals, ids }
        }

        fn set(&mut self, index: usize, value: bool) -> EmitterId {
            let id = self.ids[index];
            self.signals.insert(id, value);
            id
        }
    }

    fn receiver(settings: ReceiverSettings, fixture: &Fixture) -> PulseReceiver {
        let mut r = PulseReceiver::new(ReceiverId::new(), ActorId::new(), settings);
        r.set_owner_ready(true);
        for &id in &fixture.ids {
            assert!(r.register(id, &fixture.signals).is_some());
        }
        r
    }

    #[test]
    fn and_mode_requires_every_emitter() {
        let mut fx = Fixture::new(&[true, true]);
        let mut r = receiver(ReceiverSettings::default(), &fx);
        assert!(r.pulse());

        let id = fx.set(1, false);
        let outcome = r.recompute(id, &fx.signals);
        assert!(outcome.changed);
        assert_eq!(outcome.notify, Some(false));
        assert!(!r.pulse());
    }

    #[test]
    fn or_mode_needs_any_emitter() {
        let mut fx = Fixture::new(&[false, false]);
        let settings = ReceiverSettings {
            partial: true,
            ..ReceiverSettings::default()
        };
        let mut r = receiver(settings, &fx);
        assert!(!r.pulse());

        let id = fx.set(0, true);
        assert_eq!(r.recompute(id, &fx.signals).notify, Some(true));
        assert!(r.pulse());
    }

    #[test]
    fn inversion_negates_exposed_pulse() {
        let mut fx = Fixture::new(&[false]);
        let mut plain = receiver(ReceiverSettings::default(), &fx);
        let mut inverted = receiver(
            ReceiverSettings {
                invert: true,
                partial: false,
            },
            &fx,
        );
        for value in [true, false, true, true, false] {
            let id = fx.set(0, value);
            plain.recompute(id, &fx.signals);
            inverted.recompute(id, &fx.signals);
            assert_eq!(inverted.pulse(), !plain.pulse());
            assert_eq!(inverted.last_aggregate(), plain.last_aggregate());
        }
    }

    #[test]
    fn repeated_recompute_is_silent() {
        let mut fx = Fixture::new(&[false]);
        let mut r = receiver(ReceiverSettings::default(), &fx);
        let id = fx.set(0, true);
        assert!(r.recompute(id, &fx.signals).notify.is_some());
        let second = r.recompute(id, &fx.signals);
        assert!(!second.changed);
        assert_eq!(second.notify, None);
    }

    #[test]
    fn gate_suppresses_but_still_caches() {
        let mut fx = Fixture::new(&[false]);
        let settings = ReceiverSettings::default();
        let mut r = PulseReceiver::new(ReceiverId::new(), ActorId::new(), settings);
        assert!(r.register(fx.ids[0], &fx.signals).is_some());

        let id = fx.set(0, true);
        let outcome = r.recompute(id, &fx.signals);
        assert!(outcome.changed);
        assert_eq!(outcome.notify, None);
        assert!(r.pulse());

        // Opening the gate does not replay the swallowed change.
        r.set_owner_ready(true);
        assert_eq!(r.recompute(id, &fx.signals).notify, None);

        let id = fx.set(0, false);
        assert_eq!(r.recompute(id, &fx.signals).notify, Some(false));
    }

    #[test]
    fn duplicate_registration_keeps_one_entry() {
        let fx = Fixture::new(&[true]);
        let settings = ReceiverSettings::default();
        let mut r = PulseReceiver::new(ReceiverId::new(), ActorId::new(), settings);
        r.set_owner_ready(true);

        let first = r.register(fx.ids[0], &fx.signals);
        assert_eq!(first.map(|o| o.notify), Some(Some(true)));
        let second = r.register(fx.ids[0], &fx.signals);
        assert_eq!(second.map(|o| o.changed), Some(false));
        assert_eq!(r.emitters().len(), 1);
        assert_eq!(r.recompute_count(), 2);
    }

    #[test]
    fn invalid_emitters_are_refused_and_skipped() {
        let mut fx = Fixture::new(&[true, true]);
        let mut r = receiver(ReceiverSettings::default(), &fx);
        assert!(r.register(EmitterId::new(), &fx.signals).is_none());
        assert_eq!(r.emitters().len(), 2);

        let dead = fx.ids[0];
        fx.signals.remove(&dead);
        let id = fx.set(1, true);
        let outcome = r.recompute(id, &fx.signals);
        assert_eq!(outcome.invalid_emitters, 1);
        assert!(r.pulse());
    }
}
