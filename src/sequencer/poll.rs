//! The loop that checks for due events at a fixed rate.
use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::action::invoke;
use super::event_set::EventSet;
use super::policy::{Outcome, Policy};
use crate::time::{Millis, TimeSource};

/// What happened during a single tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct TickReport {
    pub attempted: usize,
    pub failed: usize,
    pub removed: usize,
}

/// Fire every event that is due at `now`, in order.
pub(super) fn tick(events: &EventSet, now: Millis, policy: Policy) -> TickReport {
    let mut report = TickReport::default();

    for mut event in events.due_events(now) {
        let success = invoke(event.action.as_mut());
        let outcome = policy.outcome(success);

        debug!(
            "{now}: event @{} {}, {outcome:?}",
            event.handle.timestamp(),
            if success { "succeeded" } else { "failed" }
        );

        report.attempted += 1;
        if !success {
            report.failed += 1;
        }
        if outcome == Outcome::Remove {
            report.removed += 1;
        }

        events.complete(event, outcome);
    }

    report
}

pub(super) struct PollLoop {
    pub events: Arc<EventSet>,
    pub time_source: Arc<dyn TimeSource>,
    pub policy: watch::Receiver<Policy>,
    pub tick_interval: Duration,
}

impl PollLoop {
    /// Tick at a fixed rate until `stop` is cancelled.
    ///
    /// The interval is anchored to when the loop started, so time spent firing
    /// actions is taken off the next wait. Ticks that are missed entirely are
    /// skipped.
    pub async fn run(self, stop: CancellationToken) {
        let mut interval = time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            select! {
                biased;
                () = stop.cancelled() => {
                    debug!("poll loop stopped");
                    break;
                }
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
    }

    fn tick(&self) {
        let started = Instant::now();
        let policy = *self.policy.borrow();
        let now = self.time_source.current_time();

        let report = tick(&self.events, now, policy);

        let elapsed = started.elapsed();
        if report.attempted > 0 {
            debug!("{now}: tick took {elapsed:?}, {report:?}");
        }
        if elapsed > self.tick_interval {
            warn!(
                "{now}: tick took {elapsed:?}, longer than the interval of {:?}",
                self.tick_interval
            );
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::sequencer::action::SequencedAction;

    const REMOVE_ONCE: Policy = Policy {
        remove_events_when_complete: true,
        retry_failed_events: false,
    };
    const REMOVE_RETRY: Policy = Policy {
        remove_events_when_complete: true,
        retry_failed_events: true,
    };
    const KEEP_RETRY: Policy = Policy {
        remove_events_when_complete: false,
        retry_failed_events: true,
    };
    const KEEP_ONCE: Policy = Policy {
        remove_events_when_complete: false,
        retry_failed_events: false,
    };

    /// An action that records its id and then fails `failures` times.
    fn recording(
        log: &Arc<Mutex<Vec<usize>>>,
        id: usize,
        failures: usize,
    ) -> Box<dyn SequencedAction> {
        let log = log.clone();
        let mut remaining = failures;
        Box::new(move || {
            log.lock().unwrap().push(id);
            if remaining > 0 {
                remaining -= 1;
                false
            } else {
                true
            }
        })
    }

    fn counting(count: &Arc<AtomicUsize>, result: bool) -> Box<dyn SequencedAction> {
        let count = count.clone();
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
            result
        })
    }

    #[test]
    fn test_fires_in_order() {
        let events = EventSet::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        // (timestamp, id); ids for equal timestamps are in insertion order.
        let inserts = [(500, 5), (100, 0), (300, 3), (100, 1), (300, 4), (200, 2)];
        for (timestamp, id) in inserts {
            events.add(timestamp, recording(&log, id, 0));
        }

        let report = tick(&events, 250, REMOVE_ONCE);
        assert_eq!(report.attempted, 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);

        tick(&events, 1000, REMOVE_ONCE);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(events.len(), 0);
    }

    #[test]
    fn test_never_fires_early() {
        let events = EventSet::default();
        let count = Arc::new(AtomicUsize::new(0));
        events.add(1000, counting(&count, true));

        for now in (0..1000).step_by(100) {
            assert_eq!(tick(&events, now, REMOVE_ONCE).attempted, 0);
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tick(&events, 1000, REMOVE_ONCE);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_at_most_once() {
        let events = EventSet::default();
        let succeeds = Arc::new(AtomicUsize::new(0));
        let fails = Arc::new(AtomicUsize::new(0));
        events.add(100, counting(&succeeds, true));
        events.add(100, counting(&fails, false));

        for now in (100..1000).step_by(100) {
            tick(&events, now, REMOVE_ONCE);
        }
        assert_eq!(succeeds.load(Ordering::SeqCst), 1);
        assert_eq!(fails.load(Ordering::SeqCst), 1);
        assert!(events.snapshot().is_empty());
    }

    #[test]
    fn test_retry_until_success() {
        let events = EventSet::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = events.add(100, recording(&log, 7, 3));

        for now in [100, 200, 300] {
            let report = tick(&events, now, REMOVE_RETRY);
            assert_eq!(report.failed, 1);
            let view = events.get(handle).unwrap();
            assert!(view.failed);
            assert!(!view.fired);
        }

        let report = tick(&events, 400, REMOVE_RETRY);
        assert_eq!(report.removed, 1);
        assert!(events.snapshot().is_empty());

        tick(&events, 500, REMOVE_RETRY);
        assert_eq!(log.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_sticky_failure() {
        let events = EventSet::default();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = events.add(100, counting(&count, false));

        for (i, now) in (100..=1000).step_by(100).enumerate() {
            tick(&events, now, KEEP_RETRY);
            assert_eq!(count.load(Ordering::SeqCst), i + 1);
        }

        let view = events.get(handle).unwrap();
        assert!(view.failed);
        assert!(!view.fired);
    }

    #[test]
    fn test_success_is_sticky() {
        let events = EventSet::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = events.add(100, recording(&log, 1, 1));

        tick(&events, 100, KEEP_RETRY);
        tick(&events, 200, KEEP_RETRY);
        tick(&events, 300, KEEP_RETRY);

        assert_eq!(log.lock().unwrap().len(), 2);
        let view = events.get(handle).unwrap();
        assert!(view.fired);
        assert!(!view.failed);
    }

    #[test]
    fn test_attempted_once_and_recorded() {
        let events = EventSet::default();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = events.add(100, counting(&count, false));

        tick(&events, 150, KEEP_ONCE);
        let view = events.get(handle).unwrap();
        assert!(view.fired);
        assert!(view.failed);

        tick(&events, 250, KEEP_ONCE);
        tick(&events, 350, KEEP_ONCE);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_does_not_stop_tick() {
        let events = EventSet::default();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = events.add(100, Box::new(|| -> bool { panic!("broken action") }));
        events.add(200, counting(&count, true));

        let report = tick(&events, 200, KEEP_ONCE);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let view = events.get(handle).unwrap();
        assert!(view.fired);
        assert!(view.failed);
    }

    #[test]
    fn test_action_can_add_events() {
        let events = Arc::new(EventSet::default());
        let count = Arc::new(AtomicUsize::new(0));

        let action = {
            let events = events.clone();
            let count = count.clone();
            move || {
                events.add(100, counting(&count, true));
                true
            }
        };
        events.add(100, Box::new(action));

        let report = tick(&events, 100, REMOVE_ONCE);
        assert_eq!(report.attempted, 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let report = tick(&events, 100, REMOVE_ONCE);
        assert_eq!(report.attempted, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
