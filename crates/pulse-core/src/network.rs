//! The propagation graph: an arena of emitters, receivers and the actors
//! that own receivers.
//!
//! [`PulseNetwork`] is one instance of the world, either the authority or a
//! mirror. It owns both sides of the bipartite graph (emitter to receivers,
//! receiver to emitters) and keeps them consistent: every wiring call
//! updates both ends. References are plain identities checked for liveness
//! when they are followed, so a despawned node is skipped and logged rather
//! than trusted.
//!
//! All work is synchronous and runs to completion inside the call that
//! started it. A signal change walks every connected receiver before the
//! call returns. Receivers never drive emitters, so fan-out is a single hop
//! and cannot re-enter.

use std::collections::BTreeMap;
use std::time::Duration;

use pulse_types::{
    ActorId, EmitterId, NetRole, PulseEvent, ReceiverId, ReplicatedEmitterState, TimerModeState,
};
use tracing::{debug, error, info, warn};

use crate::emitter::{EmitterSettings, PulseEmitter};
use crate::error::NetworkError;
use crate::persistence::{self, InMemorySaveStore, SaveStore};
use crate::policy::{AllowAll, EngagePolicy};
use crate::receiver::{PulseReceiver, ReceiverSettings};
use crate::replication::ReplicationOutbox;
use crate::timer::{TickTimerService, TimerService};

/// Spawn-time description of an actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorSettings {
    /// Stable identity.
    pub id: ActorId,
    /// Human-readable name for logs.
    pub name: String,
    /// The actor's receiver, if it has the receiver capability.
    pub receiver: Option<ReceiverSettings>,
}

impl ActorSettings {
    /// An actor without a receiver.
    pub fn new(id: ActorId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            receiver: None,
        }
    }

    /// Give the actor a receiver.
    #[must_use]
    pub fn with_receiver(mut self, receiver: ReceiverSettings) -> Self {
        self.receiver = Some(receiver);
        self
    }
}

#[derive(Debug, Clone)]
struct ActorEntry {
    name: String,
    receiver: Option<ReceiverId>,
}

/// One instance of the pulse network.
#[derive(Debug)]
pub struct PulseNetwork<T: TimerService = TickTimerService> {
    role: NetRole,
    emitters: BTreeMap<EmitterId, PulseEmitter>,
    receivers: BTreeMap<ReceiverId, PulseReceiver>,
    actors: BTreeMap<ActorId, ActorEntry>,
    timers: T,
    store: Box<dyn SaveStore>,
    events: Vec<PulseEvent>,
    outbox: ReplicationOutbox,
}

impl PulseNetwork<TickTimerService> {
    /// Create an empty network with the in-process timer service and an
    /// in-memory save store.
    pub fn new(role: NetRole) -> Self {
        Self::with_parts(
            role,
            TickTimerService::new(),
            Box::new(InMemorySaveStore::new()),
        )
    }
}

impl<T: TimerService> PulseNetwork<T> {
    /// Create an empty network over the given collaborators.
    pub fn with_parts(role: NetRole, timers: T, store: Box<dyn SaveStore>) -> Self {
        Self {
            role,
            emitters: BTreeMap::new(),
            receivers: BTreeMap::new(),
            actors: BTreeMap::new(),
            timers,
            store,
            events: Vec::new(),
            outbox: ReplicationOutbox::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Role of this instance.
    pub const fn role(&self) -> NetRole {
        self.role
    }

    /// The timer service.
    pub const fn timers(&self) -> &T {
        &self.timers
    }

    /// The save store.
    pub fn save_store(&self) -> &dyn SaveStore {
        self.store.as_ref()
    }

    /// Look up a live emitter.
    pub fn emitter(&self, id: EmitterId) -> Option<&PulseEmitter> {
        self.emitters.get(&id)
    }

    /// Look up a live receiver.
    pub fn receiver(&self, id: ReceiverId) -> Option<&PulseReceiver> {
        self.receivers.get(&id)
    }

    /// The receiver owned by `actor`, if the actor is alive and has one.
    pub fn receiver_of(&self, actor: ActorId) -> Option<&PulseReceiver> {
        self.actors
            .get(&actor)
            .and_then(|entry| entry.receiver)
            .and_then(|id| self.receivers.get(&id))
    }

    /// Number of live emitters.
    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.receivers.len()
    }

    /// Exposed pulse of a receiver.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ReceiverNotFound`] for an unknown receiver.
    pub fn receiver_pulse(&self, id: ReceiverId) -> Result<bool, NetworkError> {
        self.receivers
            .get(&id)
            .map(PulseReceiver::pulse)
            .ok_or(NetworkError::ReceiverNotFound(id))
    }

    /// Current signal of an emitter.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EmitterNotFound`] for an unknown emitter.
    pub fn emitter_signal(&self, id: EmitterId) -> Result<bool, NetworkError> {
        self.live_emitter(id).map(PulseEmitter::signal)
    }

    /// Whether an emitter would accept an engagement right now.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EmitterNotFound`] for an unknown emitter.
    pub fn can_engage(&self, id: EmitterId) -> Result<bool, NetworkError> {
        Ok(self.live_emitter(id)?.can_engage(&self.timers))
    }

    /// Whether an emitter would accept a disengagement right now.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EmitterNotFound`] for an unknown emitter.
    pub fn can_disengage(&self, id: EmitterId) -> Result<bool, NetworkError> {
        Ok(self.live_emitter(id)?.can_disengage())
    }

    /// Countdown progress of a timer-mode emitter.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EmitterNotFound`] for an unknown emitter.
    pub fn timer_mode_state(&self, id: EmitterId) -> Result<TimerModeState, NetworkError> {
        Ok(self.live_emitter(id)?.timer_mode_state(&self.timers))
    }

    /// Events raised since the last drain, oldest first.
    pub fn pending_events(&self) -> &[PulseEvent] {
        &self.events
    }

    /// Take every event raised since the last drain.
    pub fn drain_events(&mut self) -> Vec<PulseEvent> {
        std::mem::take(&mut self.events)
    }

    /// Take every emitter state queued for mirrors.
    pub fn drain_replication(&mut self) -> Vec<ReplicatedEmitterState> {
        self.outbox.drain()
    }

    // -----------------------------------------------------------------------
    // Actors and receivers
    // -----------------------------------------------------------------------

    /// Spawn an actor, and its receiver if it has one.
    ///
    /// The receiver starts with its owner not ready; call
    /// [`PulseNetwork::begin_play`] once the actor is initialized.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::DuplicateActor`] if the actor already exists.
    pub fn spawn_actor(
        &mut self,
        settings: ActorSettings,
    ) -> Result<Option<ReceiverId>, NetworkError> {
        if self.actors.contains_key(&settings.id) {
            return Err(NetworkError::DuplicateActor(settings.id));
        }
        let receiver = settings.receiver.map(|receiver_settings| {
            let id = ReceiverId::new();
            self.receivers
                .insert(id, PulseReceiver::new(id, settings.id, receiver_settings));
            id
        });
        info!(
            actor = %settings.id,
            name = settings.name,
            has_receiver = receiver.is_some(),
            "Actor spawned"
        );
        self.actors.insert(
            settings.id,
            ActorEntry {
                name: settings.name,
                receiver,
            },
        );
        Ok(receiver)
    }

    /// Mark an actor as initialized, opening its receiver's event gate.
    ///
    /// Changes swallowed before this call are not replayed.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ActorNotFound`] for an unknown actor.
    pub fn begin_play(&mut self, actor: ActorId) -> Result<(), NetworkError> {
        let entry = self
            .actors
            .get(&actor)
            .ok_or(NetworkError::ActorNotFound(actor))?;
        if let Some(receiver) = entry.receiver.and_then(|id| self.receivers.get_mut(&id)) {
            receiver.set_owner_ready(true);
        }
        debug!(%actor, name = entry.name, "Actor began play");
        Ok(())
    }

    /// Despawn an actor together with its receiver.
    ///
    /// Emitters still wired to the receiver skip it on their next fan-out.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ActorNotFound`] for an unknown actor.
    pub fn destroy_actor(&mut self, actor: ActorId) -> Result<(), NetworkError> {
        let entry = self
            .actors
            .remove(&actor)
            .ok_or(NetworkError::ActorNotFound(actor))?;
        if let Some(receiver) = entry.receiver {
            self.receivers.remove(&receiver);
        }
        info!(%actor, name = entry.name, "Actor destroyed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Emitters and wiring
    // -----------------------------------------------------------------------

    /// Spawn an emitter that anyone may engage.
    ///
    /// # Errors
    ///
    /// See [`PulseNetwork::spawn_emitter_with_policy`].
    pub fn spawn_emitter(&mut self, settings: EmitterSettings) -> Result<(), NetworkError> {
        self.spawn_emitter_with_policy(settings, Box::new(AllowAll))
    }

    /// Spawn an emitter with a custom engage policy.
    ///
    /// A record saved under the same identity is folded into the settings
    /// first. The emitter then registers with the receiver of every
    /// connected actor; actors that are gone or have no receiver are logged
    /// and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::DuplicateEmitter`] if the emitter already
    /// exists.
    pub fn spawn_emitter_with_policy(
        &mut self,
        mut settings: EmitterSettings,
        policy: Box<dyn EngagePolicy>,
    ) -> Result<(), NetworkError> {
        let id = settings.id;
        if self.emitters.contains_key(&id) {
            return Err(NetworkError::DuplicateEmitter(id));
        }
        if let Some(record) = self.store.load(id) {
            persistence::restore(&mut settings, &record);
            debug!(emitter = %id, ?record, "Emitter restored from save");
        }

        let emitter = PulseEmitter::spawn_with_policy(&settings, self.role, policy);
        info!(
            emitter = %id,
            name = settings.name,
            mode = %settings.mode,
            signal = emitter.signal(),
            active = emitter.is_active(),
            "Emitter spawned"
        );
        self.emitters.insert(id, emitter);

        for &actor in &settings.connected_actors {
            self.connect(id, actor)?;
        }
        Ok(())
    }

    /// Wire an emitter to the receiver owned by `actor`.
    ///
    /// Returns `false` (after logging an error) if the actor is gone or has
    /// no receiver.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EmitterNotFound`] for an unknown emitter.
    pub fn connect(&mut self, emitter: EmitterId, actor: ActorId) -> Result<bool, NetworkError> {
        let name = self.live_emitter(emitter)?.name().to_owned();
        let Some(entry) = self.actors.get(&actor) else {
            error!(%emitter, name, %actor, "Emitter is connected to an invalid actor");
            return Ok(false);
        };
        let Some(receiver) = entry.receiver else {
            error!(
                %emitter,
                name,
                actor = entry.name,
                "Emitter is connected to an actor without a pulse receiver"
            );
            return Ok(false);
        };
        Ok(self.wire(emitter, receiver))
    }

    /// Make `receiver` observe `emitter`.
    ///
    /// A no-op returning `false` if the emitter does not resolve.
    /// Registering twice keeps a single edge but recomputes again.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ReceiverNotFound`] for an unknown receiver.
    pub fn register_emitter(
        &mut self,
        receiver: ReceiverId,
        emitter: EmitterId,
    ) -> Result<bool, NetworkError> {
        if !self.receivers.contains_key(&receiver) {
            return Err(NetworkError::ReceiverNotFound(receiver));
        }
        if !self.emitters.contains_key(&emitter) {
            warn!(%receiver, %emitter, "Ignoring registration of an invalid emitter");
            return Ok(false);
        }
        Ok(self.wire(emitter, receiver))
    }

    /// Destroy an emitter: snapshot it into the save store, cancel its
    /// timers, then remove it. Receivers observing it skip it from now on.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EmitterNotFound`] for an unknown emitter.
    pub fn destroy_emitter(&mut self, id: EmitterId) -> Result<(), NetworkError> {
        let emitter = self
            .emitters
            .get_mut(&id)
            .ok_or(NetworkError::EmitterNotFound(id))?;
        if persistence::should_persist(emitter) {
            self.store.save(id, persistence::snapshot(emitter));
        }
        emitter.clear_timers(&mut self.timers);
        if let Some(emitter) = self.emitters.remove(&id) {
            info!(emitter = %id, name = emitter.name(), "Emitter destroyed");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Engagement
    // -----------------------------------------------------------------------

    /// Ask an emitter to engage on behalf of `actor`. Returns whether the
    /// engagement was accepted.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EmitterNotFound`] for an unknown emitter.
    pub fn try_engage(&mut self, emitter: EmitterId, actor: ActorId) -> Result<bool, NetworkError> {
        self.mutate_emitter(emitter, |e, timers| {
            let transition = e.try_engage(actor, timers);
            (transition.accepted, transition.pulse_changed)
        })
    }

    /// Ask an emitter to disengage. Returns whether it was accepted.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EmitterNotFound`] for an unknown emitter.
    pub fn try_disengage(&mut self, emitter: EmitterId) -> Result<bool, NetworkError> {
        self.mutate_emitter(emitter, |e, _| {
            let transition = e.try_disengage();
            (transition.accepted, transition.pulse_changed)
        })
    }

    /// Write an emitter's signal directly. A no-op on mirrors and when the
    /// value is unchanged. Returns whether the signal changed.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EmitterNotFound`] for an unknown emitter.
    pub fn set_pulse(&mut self, emitter: EmitterId, on: bool) -> Result<bool, NetworkError> {
        self.mutate_emitter(emitter, |e, _| {
            let changed = e.set_pulse(on);
            (changed, changed)
        })
    }

    /// Enable or disable engagement on an emitter.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EmitterNotFound`] for an unknown emitter.
    pub fn set_active(&mut self, emitter: EmitterId, active: bool) -> Result<(), NetworkError> {
        self.mutate_emitter(emitter, |e, _| {
            e.set_active(active);
            ((), false)
        })
    }

    /// Advance the scheduler by one tick carrying `delta` and run every timer
    /// that came due. Returns how many timers fired.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Clock`] if the scheduler clock overflows.
    pub fn advance(&mut self, delta: Duration) -> Result<usize, NetworkError> {
        self.timers.advance(delta)?;
        let mut fired: usize = 0;
        while let Some(timer) = self.timers.next_due() {
            fired = fired.saturating_add(1);
            let id = timer.callback.emitter;
            // The timer is still pending here, so the engageability snapshot
            // taken before the completion sees it.
            if self.emitters.contains_key(&id) {
                self.mutate_emitter(id, |e, timers| ((), e.timer_countdown_done(timers)))?;
            } else {
                warn!(
                    emitter = %id,
                    kind = ?timer.callback.kind,
                    "Timer fired for a missing emitter"
                );
            }
            self.timers.cancel(timer.handle);
        }
        Ok(fired)
    }

    // -----------------------------------------------------------------------
    // Replication
    // -----------------------------------------------------------------------

    /// Apply emitter state received from the authority.
    ///
    /// On a mirror, a changed signal runs the same fan-out the authority ran,
    /// so receivers attached only to this instance stay consistent. Ignored
    /// on the authority. Returns whether the signal changed.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EmitterNotFound`] if the emitter is not
    /// spawned on this instance.
    pub fn apply_replicated(
        &mut self,
        state: ReplicatedEmitterState,
    ) -> Result<bool, NetworkError> {
        self.mutate_emitter(state.emitter, |e, _| {
            let changed = e.apply_replicated(&state);
            (changed, changed)
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn live_emitter(&self, id: EmitterId) -> Result<&PulseEmitter, NetworkError> {
        self.emitters
            .get(&id)
            .ok_or(NetworkError::EmitterNotFound(id))
    }

    /// Run `op` against an emitter, then fan out a signal change, announce
    /// an engageability flip, and queue replication if the authoritative
    /// state moved.
    fn mutate_emitter<R>(
        &mut self,
        id: EmitterId,
        op: impl FnOnce(&mut PulseEmitter, &mut T) -> (R, bool),
    ) -> Result<R, NetworkError> {
        let emitter = self
            .emitters
            .get_mut(&id)
            .ok_or(NetworkError::EmitterNotFound(id))?;
        let could_engage = emitter.can_engage(&self.timers);
        let before = emitter.replicated_state();

        let (result, pulse_changed) = op(&mut *emitter, &mut self.timers);

        let after = emitter.replicated_state();
        let can_engage = emitter.can_engage(&self.timers);
        let authoritative = emitter.is_authoritative();

        if pulse_changed {
            self.broadcast_pulse(id);
        }
        if can_engage != could_engage {
            self.events.push(PulseEvent::CanEngageChanged {
                emitter: id,
                can_engage,
            });
        }
        if authoritative && after != before {
            self.outbox.push(after);
        }
        Ok(result)
    }

    /// Announce an emitter's signal and recompute every connected receiver.
    ///
    /// The single fan-out routine, shared by the authoritative write path
    /// and replicated-state arrival on mirrors. A receiver that no longer
    /// resolves is skipped without cutting the pass short.
    fn broadcast_pulse(&mut self, id: EmitterId) {
        let Some(emitter) = self.emitters.get(&id) else {
            warn!(emitter = %id, "Fan-out requested for a missing emitter");
            return;
        };
        let signal = emitter.signal();
        let receivers: Vec<ReceiverId> = emitter.receivers().iter().copied().collect();
        debug!(emitter = %id, signal, receivers = receivers.len(), "Pulse updated");

        self.events.push(PulseEvent::EmitterChanged {
            emitter: id,
            signal,
        });

        for receiver_id in receivers {
            let Some(receiver) = self.receivers.get_mut(&receiver_id) else {
                warn!(
                    emitter = %id,
                    receiver = %receiver_id,
                    "Emitter has an invalid connected receiver"
                );
                continue;
            };
            let outcome = receiver.recompute(id, &self.emitters);
            if let Some(pulse) = outcome.notify {
                self.events.push(PulseEvent::ReceiverPulseUpdated {
                    receiver: receiver_id,
                    owner: receiver.owner(),
                    pulse,
                });
            }
        }
    }

    /// Add the edge in both directions and let the receiver recompute.
    fn wire(&mut self, emitter_id: EmitterId, receiver_id: ReceiverId) -> bool {
        let (Some(emitter), Some(receiver)) = (
            self.emitters.get_mut(&emitter_id),
            self.receivers.get_mut(&receiver_id),
        ) else {
            return false;
        };
        emitter.add_receiver(receiver_id);
        let Some(outcome) = receiver.register(emitter_id, &self.emitters) else {
            return false;
        };
        if let Some(pulse) = outcome.notify {
            self.events.push(PulseEvent::ReceiverPulseUpdated {
                receiver: receiver_id,
                owner: receiver.owner(),
                pulse,
            });
        }
        true
    }
}
