//! Single-shot timer service used for emitter cooldowns and countdowns.
//!
//! Emitters never hold closures. A timer carries a [`TimerCallback`] that
//! names the owning emitter and the timer's purpose; after each clock
//! advance the network takes every due timer and routes it back into the
//! emitter, so a completion runs the same synchronous path as a direct
//! engagement. A due timer stays pending until the completion has run.
//!
//! [`TickTimerService`] is the in-process implementation, keyed on a
//! [`SchedulerClock`]. Hosts with their own scheduler implement
//! [`TimerService`] instead.

use std::collections::BTreeMap;
use std::time::Duration;

use pulse_types::EmitterId;

use crate::clock::{ClockError, SchedulerClock};

/// Opaque handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

/// What a timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Anti-spam cooldown after a toggle. Completion has no signal effect.
    ToggleCooldown,
    /// Timer-mode countdown that turns the signal back off.
    Countdown,
}

/// Completion target of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerCallback {
    /// Emitter that owns the timer.
    pub emitter: EmitterId,
    /// Purpose of the timer.
    pub kind: TimerKind,
}

/// A timer whose deadline has been reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    /// Handle the timer was scheduled under.
    pub handle: TimerHandle,
    /// Completion target.
    pub callback: TimerCallback,
}

/// A scheduler for single-shot countdowns.
pub trait TimerService {
    /// Schedule `callback` to complete once `duration` of simulated time has
    /// passed.
    fn schedule(&mut self, duration: Duration, callback: TimerCallback) -> TimerHandle;

    /// Schedule `callback` to complete on the next scheduler tick,
    /// regardless of how much time that tick carries.
    fn schedule_next_tick(&mut self, callback: TimerCallback) -> TimerHandle;

    /// Cancel a pending timer. Unknown or completed handles are ignored.
    fn cancel(&mut self, handle: TimerHandle);

    /// Cancel every pending timer owned by `emitter`.
    fn cancel_owner(&mut self, emitter: EmitterId);

    /// Whether `handle` is still pending.
    fn is_active(&self, handle: TimerHandle) -> bool;

    /// Time since `handle` was scheduled, or `None` if it is not pending.
    fn elapsed(&self, handle: TimerHandle) -> Option<Duration>;

    /// Advance the underlying clock by one tick carrying `delta`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError`] if the clock would overflow.
    fn advance(&mut self, delta: Duration) -> Result<(), ClockError>;

    /// The earliest-scheduled due timer, if any. The timer stays pending
    /// until it is cancelled.
    fn next_due(&self) -> Option<FiredTimer>;
}

/// When a pending timer completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Due {
    /// Once the clock's elapsed time reaches this instant.
    At(Duration),
    /// Once the clock's tick counter reaches this tick.
    Tick(u64),
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    callback: TimerCallback,
    scheduled_at: Duration,
    due: Due,
}

impl PendingTimer {
    fn is_due(&self, clock: &SchedulerClock) -> bool {
        match self.due {
            Due::At(at) => clock.elapsed() >= at,
            Due::Tick(tick) => clock.tick() >= tick,
        }
    }
}

/// In-process [`TimerService`] driven by a [`SchedulerClock`].
///
/// Due timers are returned in scheduling order, which keeps completions
/// deterministic across runs.
#[derive(Debug, Default)]
pub struct TickTimerService {
    clock: SchedulerClock,
    next_handle: u64,
    pending: BTreeMap<TimerHandle, PendingTimer>,
}

impl TickTimerService {
    /// Create an empty timer service at tick 0.
    pub const fn new() -> Self {
        Self {
            clock: SchedulerClock::new(),
            next_handle: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Return the underlying clock.
    pub const fn clock(&self) -> &SchedulerClock {
        &self.clock
    }

    /// Number of pending timers.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn insert(&mut self, callback: TimerCallback, due: Due) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.pending.insert(
            handle,
            PendingTimer {
                callback,
                scheduled_at: self.clock.elapsed(),
                due,
            },
        );
        handle
    }
}

impl TimerService for TickTimerService {
    fn schedule(&mut self, duration: Duration, callback: TimerCallback) -> TimerHandle {
        let at = self.clock.elapsed().saturating_add(duration);
        self.insert(callback, Due::At(at))
    }

    fn schedule_next_tick(&mut self, callback: TimerCallback) -> TimerHandle {
        let tick = self.clock.tick().saturating_add(1);
        self.insert(callback, Due::Tick(tick))
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.pending.remove(&handle);
    }

    fn cancel_owner(&mut self, emitter: EmitterId) {
        self.pending.retain(|_, timer| timer.callback.emitter != emitter);
    }

    fn is_active(&self, handle: TimerHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    fn elapsed(&self, handle: TimerHandle) -> Option<Duration> {
        self.pending
            .get(&handle)
            .map(|timer| self.clock.since(timer.scheduled_at))
    }

    fn advance(&mut self, delta: Duration) -> Result<(), ClockError> {
        self.clock.advance(delta)?;
        Ok(())
    }

    fn next_due(&self) -> Option<FiredTimer> {
        self.pending
            .iter()
            .find(|(_, timer)| timer.is_due(&self.clock))
            .map(|(&handle, timer)| FiredTimer {
                handle,
                callback: timer.callback,
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn callback(emitter: EmitterId, kind: TimerKind) -> TimerCallback {
        TimerCallback { emitter, kind }
    }

    fn drain(timers: &mut TickTimerService) -> Vec<FiredTimer> {
        std::iter::from_fn(|| {
            let fired = timers.next_due()?;
            timers.cancel(fired.handle);
            Some(fired)
        })
        .collect()
    }

    #[test]
    fn duration_timer_fires_once_time_has_passed() {
        let mut timers = TickTimerService::new();
        let emitter = EmitterId::new();
        let handle = timers.schedule(
            Duration::from_millis(100),
            callback(emitter, TimerKind::Countdown),
        );

        timers.advance(Duration::from_millis(60)).unwrap();
        assert!(drain(&mut timers).is_empty());
        assert!(timers.is_active(handle));
        assert_eq!(timers.elapsed(handle), Some(Duration::from_millis(60)));

        timers.advance(Duration::from_millis(40)).unwrap();
        let fired = drain(&mut timers);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].handle, handle);
        assert!(!timers.is_active(handle));
        assert_eq!(timers.elapsed(handle), None);
    }

    #[test]
    fn next_tick_timer_ignores_elapsed_time() {
        let mut timers = TickTimerService::new();
        let emitter = EmitterId::new();
        let handle = timers.schedule_next_tick(callback(emitter, TimerKind::Countdown));

        assert!(drain(&mut timers).is_empty());
        timers.advance(Duration::ZERO).unwrap();
        let fired = drain(&mut timers);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].handle, handle);
    }

    #[test]
    fn cancel_and_cancel_owner() {
        let mut timers = TickTimerService::new();
        let a = EmitterId::new();
        let b = EmitterId::new();
        let h1 = timers.schedule(
            Duration::from_millis(10),
            callback(a, TimerKind::ToggleCooldown),
        );
        let h2 = timers.schedule_next_tick(callback(a, TimerKind::Countdown));
        let h3 = timers.schedule(Duration::from_millis(10), callback(b, TimerKind::Countdown));

        timers.cancel(h1);
        assert!(!timers.is_active(h1));
        timers.cancel_owner(a);
        assert!(!timers.is_active(h2));
        assert!(timers.is_active(h3));
        assert_eq!(timers.pending_count(), 1);
    }

    #[test]
    fn due_timer_stays_pending_until_cancelled() {
        let mut timers = TickTimerService::new();
        let emitter = EmitterId::new();
        let handle = timers.schedule(Duration::ZERO, callback(emitter, TimerKind::ToggleCooldown));

        let due = timers.next_due().unwrap();
        assert_eq!(due.handle, handle);
        assert!(timers.is_active(handle));
        assert_eq!(timers.next_due(), Some(due));

        timers.cancel(handle);
        assert_eq!(timers.next_due(), None);
    }

    #[test]
    fn due_timers_pop_in_scheduling_order() {
        let mut timers = TickTimerService::new();
        let a = EmitterId::new();
        let b = EmitterId::new();
        timers.schedule(Duration::from_millis(5), callback(a, TimerKind::Countdown));
        timers.schedule(Duration::from_millis(1), callback(b, TimerKind::Countdown));
        timers.advance(Duration::from_millis(10)).unwrap();
        let fired = drain(&mut timers);
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].callback.emitter, a);
        assert_eq!(fired[1].callback.emitter, b);
    }
}
