//! Scheduler clock: the time base the timer service counts against.
//!
//! The clock tracks two things that move together: a tick counter, which
//! next-tick timers key on, and the accumulated simulated time, which
//! duration timers key on. Each call to [`SchedulerClock::advance`] is one
//! scheduler tick carrying whatever time delta the host measured, so a
//! next-tick timer completes on the following advance even when the delta
//! is zero.

use std::time::Duration;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// Accumulated time would overflow.
    #[error("elapsed time overflow: cannot advance beyond Duration::MAX")]
    ElapsedOverflow,
}

/// Monotonic clock advanced once per scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerClock {
    /// Number of completed ticks.
    tick: u64,

    /// Simulated time accumulated over all ticks.
    elapsed: Duration,
}

impl SchedulerClock {
    /// Create a clock at tick 0 with no elapsed time.
    pub const fn new() -> Self {
        Self {
            tick: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Restore a clock from explicit parts.
    pub const fn from_parts(tick: u64, elapsed: Duration) -> Self {
        Self { tick, elapsed }
    }

    /// Advance by one tick carrying `delta` of simulated time. Returns the
    /// new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] or [`ClockError::ElapsedOverflow`]
    /// if either counter would overflow. The clock is unchanged on error.
    pub fn advance(&mut self, delta: Duration) -> Result<u64, ClockError> {
        let tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        let elapsed = self
            .elapsed
            .checked_add(delta)
            .ok_or(ClockError::ElapsedOverflow)?;
        self.tick = tick;
        self.elapsed = elapsed;
        Ok(tick)
    }

    /// Return the current tick number.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Return the simulated time accumulated so far.
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Time elapsed since `since`, saturating at zero.
    pub fn since(&self, since: Duration) -> Duration {
        self.elapsed.saturating_sub(since)
    }
}
