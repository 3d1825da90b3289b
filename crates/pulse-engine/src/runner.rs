//! Tick loop driving a [`Level`].
//!
//! Each tick, in order:
//!
//! 1. Apply the timeline entries due at this tick
//! 2. Advance both instances' schedulers and run due timers
//! 3. Forward the authority's replicated emitter state to the mirror
//! 4. Hand each instance's events to the [`EventSink`]
//! 5. Sleep for the tick interval

use pulse_core::NetworkError;
use pulse_core::config::SchedulerConfig;
use pulse_types::{NetRole, PulseEvent};
use tracing::{debug, info, warn};

use crate::level::Level;

/// Errors that can occur during the run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Advancing a network failed.
    #[error("network error: {source}")]
    Network {
        /// The underlying network error.
        #[from]
        source: NetworkError,
    },
}

/// Result of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Ticks executed.
    pub total_ticks: u64,
    /// Timeline entries applied.
    pub entries_applied: usize,
    /// Timers that completed, across both instances.
    pub timers_fired: usize,
    /// Emitter states forwarded to the mirror.
    pub replicated: usize,
    /// Events handed to the sink, across both instances.
    pub events: usize,
}

/// Receives the events raised during each tick.
pub trait EventSink: Send {
    /// Called once per instance per tick with that tick's events.
    fn on_events(&mut self, tick: u64, role: NetRole, events: &[PulseEvent]);
}

/// Sink that writes every event to the log.
pub struct LogSink;

impl EventSink for LogSink {
    fn on_events(&mut self, tick: u64, role: NetRole, events: &[PulseEvent]) {
        for event in events {
            match event {
                PulseEvent::EmitterChanged { emitter, signal } => {
                    info!(tick, ?role, %emitter, signal, "Emitter changed");
                }
                PulseEvent::ReceiverPulseUpdated {
                    receiver,
                    owner,
                    pulse,
                } => {
                    info!(tick, ?role, %receiver, %owner, pulse, "Receiver pulse updated");
                }
                PulseEvent::CanEngageChanged {
                    emitter,
                    can_engage,
                } => {
                    debug!(tick, ?role, %emitter, can_engage, "Engageability changed");
                }
            }
        }
    }
}

/// Run `level` for `scheduler.max_ticks` ticks.
///
/// A timeline entry whose target is no longer spawned is logged and
/// skipped.
///
/// # Errors
///
/// Returns [`RunnerError`] if a scheduler clock overflows.
pub async fn run(
    level: &mut Level,
    scheduler: &SchedulerConfig,
    sink: &mut dyn EventSink,
) -> Result<RunResult, RunnerError> {
    let mut result = RunResult::default();
    let interval = scheduler.tick_interval();

    info!(
        max_ticks = scheduler.max_ticks,
        tick_interval_ms = scheduler.tick_interval_ms,
        "Run starting"
    );

    for tick in 0..scheduler.max_ticks {
        // --- Timeline ---
        for entry in level.due_entries(tick) {
            match level.apply(&entry) {
                Ok(()) => result.entries_applied = result.entries_applied.saturating_add(1),
                Err(e) => warn!(tick, error = %e, action = ?entry.action, "Timeline entry skipped"),
            }
        }

        // --- Timers ---
        let fired = level
            .authority
            .advance(interval)?
            .saturating_add(level.mirror.advance(interval)?);
        result.timers_fired = result.timers_fired.saturating_add(fired);

        // --- Replication ---
        for state in level.authority.drain_replication() {
            match level.mirror.apply_replicated(state) {
                Ok(_) => result.replicated = result.replicated.saturating_add(1),
                Err(e) => warn!(tick, error = %e, "Replicated state dropped"),
            }
        }

        // --- Events ---
        for (role, events) in [
            (NetRole::Authority, level.authority.drain_events()),
            (NetRole::Mirror, level.mirror.drain_events()),
        ] {
            if !events.is_empty() {
                result.events = result.events.saturating_add(events.len());
                sink.on_events(tick, role, &events);
            }
        }

        result.total_ticks = result.total_ticks.saturating_add(1);

        // --- Sleep for tick interval ---
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    info!(
        total_ticks = result.total_ticks,
        entries_applied = result.entries_applied,
        timers_fired = result.timers_fired,
        replicated = result.replicated,
        events = result.events,
        "Run finished"
    );
    Ok(result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pulse_core::PulseConfig;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        events: Vec<(u64, NetRole, PulseEvent)>,
    }

    impl EventSink for RecordingSink {
        fn on_events(&mut self, tick: u64, role: NetRole, events: &[PulseEvent]) {
            self.events
                .extend(events.iter().map(|event| (tick, role, *event)));
        }
    }

    impl RecordingSink {
        fn receiver_pulses(&self, role: NetRole) -> Vec<(u64, bool)> {
            self.events
                .iter()
                .filter(|(_, r, _)| *r == role)
                .filter_map(|(tick, _, event)| match event {
                    PulseEvent::ReceiverPulseUpdated { pulse, .. } => Some((*tick, *pulse)),
                    _ => None,
                })
                .collect()
        }
    }

    const LEVEL: &str = r"
scheduler:
  tick_interval_ms: 10
  max_ticks: 12
level:
  actors:
    - name: door
      receiver: {}
  emitters:
    - name: plate
      mode: timer
      timer_mode_duration_ms: 50
      connected: [door]
  timeline:
    - { at_tick: 2, action: engage, target: plate }
    - { at_tick: 3, action: engage, target: plate }
    - { at_tick: 9, action: destroy_emitter, target: plate }
    - { at_tick: 10, action: destroy_emitter, target: plate }
";

    #[tokio::test]
    async fn timer_emitter_round_trips_through_the_mirror() {
        let config = PulseConfig::parse(LEVEL).unwrap();
        let mut level = Level::build(&config.level, &config.emitter).unwrap();
        let mut sink = RecordingSink::default();

        let result = run(&mut level, &config.scheduler, &mut sink).await.unwrap();

        assert_eq!(result.total_ticks, 12);
        // The engage at tick 3 is rejected but still applied; the second
        // destroy fails because the emitter is gone.
        assert_eq!(result.entries_applied, 3);
        assert_eq!(result.timers_fired, 1);
        assert_eq!(result.replicated, 2);

        // Engaged at tick 2; the 50ms countdown completes during tick 6.
        let expected = vec![(2, true), (6, false)];
        assert_eq!(sink.receiver_pulses(NetRole::Authority), expected);
        assert_eq!(sink.receiver_pulses(NetRole::Mirror), expected);
    }
}
