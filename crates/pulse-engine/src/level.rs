//! Builds the authority and mirror networks from the configured level and
//! applies scripted timeline entries to them.
//!
//! Both instances host the same actors and emitters under the same
//! identities. Structural actions (spawn, destroy, begin play) run on both;
//! engagement runs on the authority only and reaches the mirror through
//! replication.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use pulse_core::config::{EmitterDefaults, LevelConfig, TimelineAction, TimelineEntry};
use pulse_core::{ActorSettings, EmitterSettings, NetworkError, PulseNetwork, ReceiverSettings};
use pulse_types::{ActorId, EmitterId, NetRole};
use tracing::{debug, info, warn};

/// A level instantiated on an authority and a mirror.
#[derive(Debug)]
pub struct Level {
    /// The instance that owns every emitter signal.
    pub authority: PulseNetwork,
    /// The instance fed by replication.
    pub mirror: PulseNetwork,
    actors: BTreeMap<String, ActorId>,
    emitters: BTreeMap<String, EmitterSettings>,
    timeline: Vec<TimelineEntry>,
    cursor: usize,
    anonymous: ActorId,
}

impl Level {
    /// Spawn every actor and emitter of `config` on both instances.
    ///
    /// Actors begin play once the level is built, except those the timeline
    /// begins explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] if spawning fails.
    pub fn build(config: &LevelConfig, defaults: &EmitterDefaults) -> Result<Self, NetworkError> {
        let mut level = Self {
            authority: PulseNetwork::new(NetRole::Authority),
            mirror: PulseNetwork::new(NetRole::Mirror),
            actors: BTreeMap::new(),
            emitters: BTreeMap::new(),
            timeline: config.timeline.clone(),
            cursor: 0,
            anonymous: ActorId::new(),
        };
        level.timeline.sort_by_key(|entry| entry.at_tick);

        for def in &config.actors {
            let id = ActorId::new();
            let mut settings = ActorSettings::new(id, def.name.clone());
            if let Some(receiver) = def.receiver {
                settings = settings.with_receiver(ReceiverSettings {
                    invert: receiver.invert,
                    partial: receiver.partial,
                });
            }
            level.authority.spawn_actor(settings.clone())?;
            level.mirror.spawn_actor(settings)?;
            level.actors.insert(def.name.clone(), id);
        }

        for def in &config.emitters {
            let mut settings = EmitterSettings::new(EmitterId::new(), def.name.clone(), def.mode)
                .with_starting_signal(def.starting_signal)
                .with_spawn_active(def.spawn_active)
                .with_toggle_cooldown(defaults.toggle_cooldown())
                .with_timer_mode_duration(
                    def.timer_mode_duration_ms
                        .map_or_else(|| defaults.timer_mode_duration(), Duration::from_millis),
                );
            for name in &def.connected {
                match level.actors.get(name) {
                    Some(&actor) => settings = settings.with_connected_actor(actor),
                    None => warn!(emitter = def.name, actor = name, "Unknown connected actor"),
                }
            }
            level.authority.spawn_emitter(settings.clone())?;
            level.mirror.spawn_emitter(settings.clone())?;
            level.emitters.insert(def.name.clone(), settings);
        }

        let deferred: BTreeSet<&str> = level
            .timeline
            .iter()
            .filter(|entry| entry.action == TimelineAction::BeginPlay)
            .map(|entry| entry.target.as_str())
            .collect();
        for (name, &actor) in &level.actors {
            if deferred.contains(name.as_str()) {
                debug!(actor = name, "Begin play deferred to the timeline");
                continue;
            }
            level.authority.begin_play(actor)?;
            level.mirror.begin_play(actor)?;
        }

        // Build-time events describe initial wiring, not interactions.
        level.authority.drain_events();
        level.mirror.drain_events();
        level.authority.drain_replication();

        info!(
            actors = level.actors.len(),
            emitters = level.emitters.len(),
            timeline = level.timeline.len(),
            "Level built"
        );
        Ok(level)
    }

    /// Identity of a named actor.
    pub fn actor_id(&self, name: &str) -> Option<ActorId> {
        self.actors.get(name).copied()
    }

    /// Identity of a named emitter.
    pub fn emitter_id(&self, name: &str) -> Option<EmitterId> {
        self.emitters.get(name).map(|settings| settings.id)
    }

    /// Timeline entries scheduled for `tick` that have not run yet.
    pub fn due_entries(&mut self, tick: u64) -> Vec<TimelineEntry> {
        let start = self.cursor;
        while self
            .timeline
            .get(self.cursor)
            .is_some_and(|entry| entry.at_tick <= tick)
        {
            self.cursor = self.cursor.saturating_add(1);
        }
        self.timeline
            .get(start..self.cursor)
            .map(<[TimelineEntry]>::to_vec)
            .unwrap_or_default()
    }

    /// Apply one timeline entry.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] if the target is not currently spawned.
    pub fn apply(&mut self, entry: &TimelineEntry) -> Result<(), NetworkError> {
        debug!(
            tick = entry.at_tick,
            action = ?entry.action,
            name = entry.target,
            "Timeline entry"
        );
        if entry.action.targets_emitter() {
            self.apply_to_emitter(entry)
        } else {
            self.apply_to_actor(entry)
        }
    }

    fn apply_to_emitter(&mut self, entry: &TimelineEntry) -> Result<(), NetworkError> {
        let Some(settings) = self.emitters.get(&entry.target) else {
            warn!(name = entry.target, "Timeline names an unknown emitter");
            return Ok(());
        };
        let id = settings.id;
        match entry.action {
            TimelineAction::Engage => {
                let actor = entry
                    .actor
                    .as_deref()
                    .and_then(|name| self.actor_id(name))
                    .unwrap_or(self.anonymous);
                let accepted = self.authority.try_engage(id, actor)?;
                info!(emitter = entry.target, accepted, "Engage");
            }
            TimelineAction::Disengage => {
                let accepted = self.authority.try_disengage(id)?;
                info!(emitter = entry.target, accepted, "Disengage");
            }
            TimelineAction::Activate | TimelineAction::Deactivate => {
                let active = entry.action == TimelineAction::Activate;
                self.authority.set_active(id, active)?;
                self.mirror.set_active(id, active)?;
            }
            TimelineAction::DestroyEmitter => {
                self.authority.destroy_emitter(id)?;
                self.mirror.destroy_emitter(id)?;
            }
            TimelineAction::RespawnEmitter => {
                let settings = settings.clone();
                self.authority.spawn_emitter(settings.clone())?;
                self.mirror.spawn_emitter(settings)?;
                // Initial replication of the reloaded authoritative state.
                if let Some(emitter) = self.authority.emitter(id) {
                    self.mirror.apply_replicated(emitter.replicated_state())?;
                }
            }
            TimelineAction::BeginPlay | TimelineAction::DestroyActor => {}
        }
        Ok(())
    }

    fn apply_to_actor(&mut self, entry: &TimelineEntry) -> Result<(), NetworkError> {
        let Some(actor) = self.actor_id(&entry.target) else {
            warn!(name = entry.target, "Timeline names an unknown actor");
            return Ok(());
        };
        match entry.action {
            TimelineAction::BeginPlay => {
                self.authority.begin_play(actor)?;
                self.mirror.begin_play(actor)?;
            }
            TimelineAction::DestroyActor => {
                self.authority.destroy_actor(actor)?;
                self.mirror.destroy_actor(actor)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Receiver pulse of a named actor on each instance, if it has one.
    pub fn receiver_pulses(&self, name: &str) -> Option<(bool, bool)> {
        let actor = self.actor_id(name)?;
        let authority = self.authority.receiver_of(actor)?.pulse();
        let mirror = self.mirror.receiver_of(actor)?.pulse();
        Some((authority, mirror))
    }

    /// Log the final receiver pulses and report whether both instances agree.
    pub fn log_final_state(&self) -> bool {
        let mut consistent = true;
        for name in self.actors.keys() {
            let Some((authority, mirror)) = self.receiver_pulses(name) else {
                continue;
            };
            if authority == mirror {
                info!(actor = name, pulse = authority, "Final receiver pulse");
            } else {
                consistent = false;
                warn!(
                    actor = name,
                    authority,
                    mirror,
                    "Mirror diverged from authority"
                );
            }
        }
        consistent
    }
}
