//! Pulse emitter: one boolean signal behind an engagement state machine.
//!
//! An emitter's state is its [`EmitterMode`] (fixed at spawn), whether it is
//! active, the toggle-lock flag, and the cooldown/countdown timers it owns.
//! Engagement legality per mode:
//!
//! | mode          | `can_engage`                               |
//! |---------------|--------------------------------------------|
//! | `Toggle`      | active and no cooldown running             |
//! | `Hold`        | active and signal off                      |
//! | `ToggleLock`  | active and not locked                      |
//! | `Timer`       | active and no countdown running            |
//! | `None`        | never                                      |
//!
//! The emitter itself never talks to receivers. Every mutating method
//! reports whether the signal changed, and the owning
//! [`PulseNetwork`](crate::network::PulseNetwork) runs the fan-out. Only the
//! authoritative instance mutates the signal; mirrors take it from
//! replication.

use std::collections::BTreeSet;
use std::time::Duration;

use pulse_types::{
    ActorId, EmitterId, EmitterMode, EmitterRecord, NetRole, ReceiverId, ReplicatedEmitterState,
    TimerModeState,
};
use tracing::debug;

use crate::policy::{AllowAll, EngagePolicy};
use crate::timer::{TimerCallback, TimerHandle, TimerKind, TimerService};

/// Hidden anti-spam cooldown applied after every toggle.
pub const DEFAULT_TOGGLE_COOLDOWN: Duration = Duration::from_millis(100);

/// Default countdown length for timer-mode emitters.
pub const DEFAULT_TIMER_MODE_DURATION: Duration = Duration::from_secs(1);

/// Spawn-time description of an emitter.
///
/// These are the values the emitter is initialized from, distinct from its
/// live state. Reload adjusts them through
/// [`persistence::restore`](crate::persistence::restore) before spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitterSettings {
    /// Stable identity, shared by every instance and across reloads.
    pub id: EmitterId,
    /// Human-readable name for logs.
    pub name: String,
    /// Engagement semantics.
    pub mode: EmitterMode,
    /// Signal at spawn.
    pub starting_signal: bool,
    /// Whether the emitter accepts engagement at spawn.
    pub spawn_active: bool,
    /// Toggle-lock state at spawn (only set by a reload).
    pub locked: bool,
    /// Countdown length in timer mode. Zero completes on the next tick.
    pub timer_mode_duration: Duration,
    /// Anti-spam cooldown after a toggle.
    pub toggle_cooldown: Duration,
    /// Actors whose receivers this emitter drives.
    pub connected_actors: Vec<ActorId>,
}

impl EmitterSettings {
    /// Settings for an active emitter with the signal off and default
    /// timings.
    pub fn new(id: EmitterId, name: impl Into<String>, mode: EmitterMode) -> Self {
        Self {
            id,
            name: name.into(),
            mode,
            starting_signal: false,
            spawn_active: true,
            locked: false,
            timer_mode_duration: DEFAULT_TIMER_MODE_DURATION,
            toggle_cooldown: DEFAULT_TOGGLE_COOLDOWN,
            connected_actors: Vec::new(),
        }
    }

    /// Set the spawn signal.
    #[must_use]
    pub fn with_starting_signal(mut self, signal: bool) -> Self {
        self.starting_signal = signal;
        self
    }

    /// Set whether the emitter spawns active.
    #[must_use]
    pub fn with_spawn_active(mut self, active: bool) -> Self {
        self.spawn_active = active;
        self
    }

    /// Set the timer-mode countdown length.
    #[must_use]
    pub fn with_timer_mode_duration(mut self, duration: Duration) -> Self {
        self.timer_mode_duration = duration;
        self
    }

    /// Set the toggle cooldown.
    #[must_use]
    pub fn with_toggle_cooldown(mut self, cooldown: Duration) -> Self {
        self.toggle_cooldown = cooldown;
        self
    }

    /// Connect the emitter to `actor` at spawn.
    #[must_use]
    pub fn with_connected_actor(mut self, actor: ActorId) -> Self {
        self.connected_actors.push(actor);
        self
    }
}

/// Result of an engage or disengage attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transition {
    /// Whether the request passed its guards.
    pub accepted: bool,
    /// Whether the signal changed; the caller must fan out when true.
    pub pulse_changed: bool,
}

impl Transition {
    const fn rejected() -> Self {
        Self {
            accepted: false,
            pulse_changed: false,
        }
    }

    const fn accepted(pulse_changed: bool) -> Self {
        Self {
            accepted: true,
            pulse_changed,
        }
    }
}

/// A live emitter instance.
#[derive(Debug)]
pub struct PulseEmitter {
    id: EmitterId,
    name: String,
    mode: EmitterMode,
    role: NetRole,
    signal: bool,
    locked: bool,
    active: bool,
    starting_signal: bool,
    spawn_active: bool,
    timer_mode_duration: Duration,
    toggle_cooldown: Duration,
    cooldown: Option<TimerHandle>,
    countdown: Option<TimerHandle>,
    receivers: BTreeSet<ReceiverId>,
    policy: Box<dyn EngagePolicy>,
}

impl PulseEmitter {
    /// Spawn an emitter from its settings with the [`AllowAll`] policy.
    pub fn spawn(settings: &EmitterSettings, role: NetRole) -> Self {
        Self::spawn_with_policy(settings, role, Box::new(AllowAll))
    }

    /// Spawn an emitter with a custom engage policy.
    ///
    /// The live signal starts at `starting_signal` and `active` at
    /// `spawn_active`. No fan-out happens here: receivers pick the signal up
    /// when they register.
    pub fn spawn_with_policy(
        settings: &EmitterSettings,
        role: NetRole,
        policy: Box<dyn EngagePolicy>,
    ) -> Self {
        Self {
            id: settings.id,
            name: settings.name.clone(),
            mode: settings.mode,
            role,
            signal: settings.starting_signal,
            locked: settings.locked,
            active: settings.spawn_active,
            starting_signal: settings.starting_signal,
            spawn_active: settings.spawn_active,
            timer_mode_duration: settings.timer_mode_duration,
            toggle_cooldown: settings.toggle_cooldown,
            cooldown: None,
            countdown: None,
            receivers: BTreeSet::new(),
            policy,
        }
    }

    /// Return the emitter's identity.
    pub const fn id(&self) -> EmitterId {
        self.id
    }

    /// Return the emitter's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the engagement mode.
    pub const fn mode(&self) -> EmitterMode {
        self.mode
    }

    /// Whether the emitter runs in `mode`.
    pub fn is_emitter_mode(&self, mode: EmitterMode) -> bool {
        self.mode == mode
    }

    /// Whether this instance may write the signal.
    pub fn is_authoritative(&self) -> bool {
        self.role == NetRole::Authority
    }

    /// Current signal.
    pub const fn signal(&self) -> bool {
        self.signal
    }

    /// True once a toggle-lock emitter has been engaged.
    pub const fn is_toggle_locked(&self) -> bool {
        self.locked
    }

    /// Whether the emitter accepts engagement at all.
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Signal the emitter was spawned with.
    pub const fn starting_signal(&self) -> bool {
        self.starting_signal
    }

    /// Activation the emitter was spawned with.
    pub const fn spawn_active(&self) -> bool {
        self.spawn_active
    }

    /// Receivers this emitter notifies on change.
    pub const fn receivers(&self) -> &BTreeSet<ReceiverId> {
        &self.receivers
    }

    /// Start notifying `receiver`. Returns `false` if it was already wired.
    pub fn add_receiver(&mut self, receiver: ReceiverId) -> bool {
        self.receivers.insert(receiver)
    }

    /// Enable or disable engagement.
    pub const fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Whether the emitter would accept an engagement right now.
    pub fn can_engage(&self, timers: &dyn TimerService) -> bool {
        if !self.active {
            return false;
        }
        match self.mode {
            EmitterMode::Toggle => !is_running(timers, self.cooldown),
            EmitterMode::Hold => !self.signal,
            EmitterMode::ToggleLock => !self.locked,
            EmitterMode::Timer => !is_running(timers, self.countdown),
            EmitterMode::None => false,
        }
    }

    /// Whether a disengage would do anything. Only hold emitters disengage.
    pub const fn can_disengage(&self) -> bool {
        match self.mode {
            EmitterMode::Hold => self.signal,
            EmitterMode::Toggle
            | EmitterMode::ToggleLock
            | EmitterMode::Timer
            | EmitterMode::None => false,
        }
    }

    /// Capability hook: whether `actor` may engage this emitter.
    pub fn can_be_engaged_by(&self, actor: ActorId) -> bool {
        self.policy.can_be_engaged_by(self.id, actor)
    }

    /// Write the signal.
    ///
    /// A no-op on mirrors and when `on` equals the current signal. Returns
    /// whether the signal changed. The replication layer only notifies
    /// mirrors, so when this returns `true` the caller must run the fan-out
    /// itself.
    pub fn set_pulse(&mut self, on: bool) -> bool {
        if !self.is_authoritative() {
            debug!(emitter = %self.id, "ignoring pulse write on mirror");
            return false;
        }
        if on == self.signal {
            return false;
        }
        self.signal = on;
        true
    }

    /// Attempt to engage on behalf of `actor`.
    ///
    /// Fails without side effects unless this instance is authoritative,
    /// the mode guard passes, and the engage policy admits `actor`.
    pub fn try_engage(&mut self, actor: ActorId, timers: &mut dyn TimerService) -> Transition {
        if !self.is_authoritative() {
            debug!(emitter = %self.id, "engage ignored on mirror");
            return Transition::rejected();
        }
        if !self.can_engage(timers) || !self.can_be_engaged_by(actor) {
            debug!(emitter = %self.id, %actor, mode = %self.mode, "engage rejected");
            return Transition::rejected();
        }

        let changed = match self.mode {
            EmitterMode::Toggle => {
                let changed = self.set_pulse(!self.signal);
                self.cooldown = Some(timers.schedule(
                    self.toggle_cooldown,
                    self.callback(TimerKind::ToggleCooldown),
                ));
                changed
            }
            EmitterMode::Hold => self.set_pulse(true),
            EmitterMode::ToggleLock => {
                let changed = self.set_pulse(true);
                self.locked = true;
                changed
            }
            EmitterMode::Timer => {
                let changed = self.set_pulse(true);
                let callback = self.callback(TimerKind::Countdown);
                let handle = if self.timer_mode_duration.is_zero() {
                    timers.schedule_next_tick(callback)
                } else {
                    timers.schedule(self.timer_mode_duration, callback)
                };
                self.countdown = Some(handle);
                changed
            }
            EmitterMode::None => return Transition::rejected(),
        };

        debug!(emitter = %self.id, %actor, mode = %self.mode, signal = self.signal, "engaged");
        Transition::accepted(changed)
    }

    /// Attempt to disengage. Only a hold emitter with its signal on accepts.
    pub fn try_disengage(&mut self) -> Transition {
        if !self.is_authoritative() || !self.can_disengage() {
            return Transition::rejected();
        }
        let changed = self.set_pulse(false);
        debug!(emitter = %self.id, "disengaged");
        Transition::accepted(changed)
    }

    /// Handle completion of a cooldown or countdown.
    ///
    /// In timer mode a completed countdown turns the signal off. Either way
    /// every timer the emitter owns is cleared. Returns whether the signal
    /// changed.
    pub fn timer_countdown_done(&mut self, timers: &mut dyn TimerService) -> bool {
        let mut changed = false;
        if self.mode == EmitterMode::Timer && self.signal {
            changed = self.set_pulse(false);
        }
        self.clear_timers(timers);
        changed
    }

    /// Cancel every pending timer owned by this emitter.
    pub fn clear_timers(&mut self, timers: &mut dyn TimerService) {
        timers.cancel_owner(self.id);
        self.cooldown = None;
        self.countdown = None;
    }

    /// Progress of the timer-mode countdown. All zeros outside timer mode.
    pub fn timer_mode_state(&self, timers: &dyn TimerService) -> TimerModeState {
        if self.mode != EmitterMode::Timer {
            return TimerModeState::default();
        }
        let active = is_running(timers, self.countdown);
        let normalized = match self.countdown.and_then(|handle| timers.elapsed(handle)) {
            Some(elapsed) if active && !self.timer_mode_duration.is_zero() => elapsed
                .div_duration_f32(self.timer_mode_duration)
                .clamp(0.0, 1.0),
            _ => 0.0,
        };
        TimerModeState {
            active,
            total_duration_ms: u64::try_from(self.timer_mode_duration.as_millis())
                .unwrap_or(u64::MAX),
            normalized,
        }
    }

    /// Snapshot of the live state for the save store.
    pub const fn snapshot(&self) -> EmitterRecord {
        EmitterRecord {
            signal: self.signal,
            locked: self.locked,
            active: self.active,
        }
    }

    /// State to push to mirrors.
    pub const fn replicated_state(&self) -> ReplicatedEmitterState {
        ReplicatedEmitterState {
            emitter: self.id,
            signal: self.signal,
            locked: self.locked,
        }
    }

    /// Apply state received from the authoritative instance.
    ///
    /// Ignored on the authority itself. Returns whether the signal changed;
    /// the caller must then run the same fan-out the authority ran.
    pub fn apply_replicated(&mut self, state: &ReplicatedEmitterState) -> bool {
        if self.is_authoritative() {
            debug!(emitter = %self.id, "authority ignores replicated state");
            return false;
        }
        self.locked = state.locked;
        if state.signal == self.signal {
            return false;
        }
        self.signal = state.signal;
        true
    }

    const fn callback(&self, kind: TimerKind) -> TimerCallback {
        TimerCallback {
            emitter: self.id,
            kind,
        }
    }
}

fn is_running(timers: &dyn TimerService, handle: Option<TimerHandle>) -> bool {
    handle.is_some_and(|handle| timers.is_active(handle))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::policy::AllowList;
    use crate::timer::TickTimerService;

    fn settings(mode: EmitterMode) -> EmitterSettings {
        EmitterSettings::new(EmitterId::new(), "lever", mode)
    }

    fn drain(emitter: &mut PulseEmitter, timers: &mut TickTimerService) -> bool {
        let mut changed = false;
        while let Some(fired) = timers.next_due() {
            assert_eq!(fired.callback.emitter, emitter.id());
            changed |= emitter.timer_countdown_done(timers);
            timers.cancel(fired.handle);
        }
        changed
    }

    #[test]
    fn spawn_uses_starting_values() {
        let s = settings(EmitterMode::Toggle)
            .with_starting_signal(true)
            .with_spawn_active(false);
        let emitter = PulseEmitter::spawn(&s, NetRole::Authority);
        assert!(emitter.signal());
        assert!(!emitter.is_active());
        assert!(emitter.starting_signal());
        assert!(!emitter.spawn_active());
    }

    #[test]
    fn toggle_flips_and_cools_down() {
        let mut timers = TickTimerService::new();
        let mut emitter = PulseEmitter::spawn(&settings(EmitterMode::Toggle), NetRole::Authority);
        let actor = ActorId::new();

        let t = emitter.try_engage(actor, &mut timers);
        assert!(t.accepted && t.pulse_changed);
        assert!(emitter.signal());

        // Cooldown blocks a second toggle.
        assert!(!emitter.can_engage(&timers));
        assert!(!emitter.try_engage(actor, &mut timers).accepted);

        timers.advance(Duration::from_millis(100)).unwrap();
        assert!(!drain(&mut emitter, &mut timers));
        assert!(emitter.signal());
        assert!(emitter.can_engage(&timers));

        assert!(emitter.try_engage(actor, &mut timers).pulse_changed);
        assert!(!emitter.signal());
    }

    #[test]
    fn hold_engages_until_disengaged() {
        let mut timers = TickTimerService::new();
        let mut emitter = PulseEmitter::spawn(&settings(EmitterMode::Hold), NetRole::Authority);
        let actor = ActorId::new();

        assert!(!emitter.can_disengage());
        assert!(!emitter.try_disengage().accepted);
        assert!(emitter.try_engage(actor, &mut timers).accepted);
        assert!(emitter.signal());
        assert!(!emitter.can_engage(&timers));
        assert!(emitter.can_disengage());

        let t = emitter.try_disengage();
        assert!(t.accepted && t.pulse_changed);
        assert!(!emitter.signal());
    }

    #[test]
    fn toggle_lock_engages_once() {
        let mut timers = TickTimerService::new();
        let mut emitter =
            PulseEmitter::spawn(&settings(EmitterMode::ToggleLock), NetRole::Authority);
        let actor = ActorId::new();

        assert!(emitter.try_engage(actor, &mut timers).accepted);
        assert!(emitter.is_toggle_locked());
        assert!(emitter.signal());
        for _ in 0..3 {
            assert!(!emitter.try_engage(actor, &mut timers).accepted);
            assert!(emitter.signal());
        }
        assert!(!emitter.try_disengage().accepted);
    }

    #[test]
    fn timer_counts_down_and_turns_off() {
        let mut timers = TickTimerService::new();
        let s = settings(EmitterMode::Timer)
            .with_timer_mode_duration(Duration::from_millis(500));
        let mut emitter = PulseEmitter::spawn(&s, NetRole::Authority);

        assert!(emitter.try_engage(ActorId::new(), &mut timers).accepted);
        assert!(emitter.signal());
        assert!(!emitter.can_engage(&timers));

        timers.advance(Duration::from_millis(250)).unwrap();
        assert!(!drain(&mut emitter, &mut timers));
        let state = emitter.timer_mode_state(&timers);
        assert!(state.active);
        assert_eq!(state.total_duration_ms, 500);
        assert!((state.normalized - 0.5).abs() < f32::EPSILON);

        timers.advance(Duration::from_millis(250)).unwrap();
        assert!(drain(&mut emitter, &mut timers));
        assert!(!emitter.signal());
        assert!(emitter.can_engage(&timers));
        assert!(!emitter.timer_mode_state(&timers).active);
    }

    #[test]
    fn zero_duration_timer_completes_next_tick() {
        let mut timers = TickTimerService::new();
        let s = settings(EmitterMode::Timer)
            .with_timer_mode_duration(Duration::ZERO);
        let mut emitter = PulseEmitter::spawn(&s, NetRole::Authority);

        assert!(emitter.try_engage(ActorId::new(), &mut timers).accepted);
        // Completion is asynchronous: nothing is due before the next tick.
        assert!(!drain(&mut emitter, &mut timers));
        assert!(emitter.signal());
        assert_eq!(emitter.timer_mode_state(&timers).normalized, 0.0);

        timers.advance(Duration::ZERO).unwrap();
        assert!(drain(&mut emitter, &mut timers));
        assert!(!emitter.signal());
    }

    #[test]
    fn none_mode_and_inactive_reject() {
        let mut timers = TickTimerService::new();
        let mut none = PulseEmitter::spawn(&settings(EmitterMode::None), NetRole::Authority);
        assert!(!none.try_engage(ActorId::new(), &mut timers).accepted);
        assert_eq!(none.timer_mode_state(&timers), TimerModeState::default());

        let mut inactive = PulseEmitter::spawn(
            &settings(EmitterMode::Toggle).with_spawn_active(false),
            NetRole::Authority,
        );
        assert!(!inactive.try_engage(ActorId::new(), &mut timers).accepted);
        inactive.set_active(true);
        assert!(inactive.try_engage(ActorId::new(), &mut timers).accepted);
    }

    #[test]
    fn policy_gates_engagement() {
        let mut timers = TickTimerService::new();
        let allowed = ActorId::new();
        let mut emitter = PulseEmitter::spawn_with_policy(
            &settings(EmitterMode::Hold),
            NetRole::Authority,
            Box::new(AllowList::new([allowed])),
        );
        assert!(!emitter.try_engage(ActorId::new(), &mut timers).accepted);
        assert!(!emitter.signal());
        assert!(emitter.try_engage(allowed, &mut timers).accepted);
    }

    #[test]
    fn mirror_never_writes_signal() {
        let mut timers = TickTimerService::new();
        let mut mirror = PulseEmitter::spawn(&settings(EmitterMode::Toggle), NetRole::Mirror);
        assert!(!mirror.set_pulse(true));
        assert!(!mirror.signal());
        assert!(!mirror.try_engage(ActorId::new(), &mut timers).accepted);
        assert_eq!(timers.pending_count(), 0);
    }

    #[test]
    fn set_pulse_reports_only_real_changes() {
        let mut emitter = PulseEmitter::spawn(&settings(EmitterMode::Toggle), NetRole::Authority);
        assert!(!emitter.set_pulse(false));
        assert!(emitter.set_pulse(true));
        assert!(!emitter.set_pulse(true));
    }

    #[test]
    fn mirror_applies_replicated_state() {
        let s = settings(EmitterMode::ToggleLock);
        let mut authority = PulseEmitter::spawn(&s, NetRole::Authority);
        let mut mirror = PulseEmitter::spawn(&s, NetRole::Mirror);
        let mut timers = TickTimerService::new();

        assert!(authority.try_engage(ActorId::new(), &mut timers).accepted);
        let state = authority.replicated_state();
        assert!(mirror.apply_replicated(&state));
        assert!(mirror.signal());
        assert!(mirror.is_toggle_locked());
        // Same state again: no change.
        assert!(!mirror.apply_replicated(&state));
        // Authority ignores replication.
        assert!(!authority.apply_replicated(&ReplicatedEmitterState {
            signal: false,
            ..state
        }));
        assert!(authority.signal());
    }

    #[test]
    fn snapshot_captures_live_state() {
        let mut timers = TickTimerService::new();
        let mut emitter =
            PulseEmitter::spawn(&settings(EmitterMode::ToggleLock), NetRole::Authority);
        assert!(emitter.try_engage(ActorId::new(), &mut timers).accepted);
        emitter.set_active(false);
        assert_eq!(
            emitter.snapshot(),
            EmitterRecord {
                signal: true,
                locked: true,
                active: false,
            }
        );
    }
}
