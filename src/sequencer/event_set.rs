//! Ordered set of pending events.
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::action::SequencedAction;
use super::policy::Outcome;
use crate::time::Millis;

/// Identifies an event in a sequencer.
///
/// Handles order by timestamp, then by insertion order, so two events at the
/// same time are always distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EventHandle {
    timestamp: Millis,
    sequence: u64,
}

impl EventHandle {
    /// The time at which the event should happen.
    #[must_use]
    pub const fn timestamp(&self) -> Millis {
        self.timestamp
    }
}

/// A read only copy of an event's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventView {
    /// The handle of the event.
    pub handle: EventHandle,

    /// The time at which the event should happen.
    pub timestamp: Millis,

    /// Whether the event has finished being attempted.
    pub fired: bool,

    /// Whether the last attempt failed.
    pub failed: bool,
}

struct Slot {
    /// Taken while the action is running.
    action: Option<Box<dyn SequencedAction>>,
    fired: bool,
    failed: bool,
}

#[derive(Default)]
struct Inner {
    events: BTreeMap<EventHandle, Slot>,
    next_sequence: u64,
}

/// An event taken out of the set to be fired.
pub(super) struct DueEvent {
    pub handle: EventHandle,
    pub action: Box<dyn SequencedAction>,
}

/// Pending events, ordered by timestamp then insertion order.
#[derive(Default)]
pub(super) struct EventSet {
    inner: Mutex<Inner>,
}

impl EventSet {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, timestamp: Millis, action: Box<dyn SequencedAction>) -> EventHandle {
        let mut inner = self.lock();
        let handle = EventHandle {
            timestamp,
            sequence: inner.next_sequence,
        };
        inner.next_sequence += 1;
        inner.events.insert(
            handle,
            Slot {
                action: Some(action),
                fired: false,
                failed: false,
            },
        );
        handle
    }

    /// Remove an event. Returns false if it was already gone.
    pub fn remove(&self, handle: EventHandle) -> bool {
        self.lock().events.remove(&handle).is_some()
    }

    pub fn get(&self, handle: EventHandle) -> Option<EventView> {
        self.lock()
            .events
            .get(&handle)
            .map(|slot| view(handle, slot))
    }

    pub fn snapshot(&self) -> Vec<EventView> {
        self.lock()
            .events
            .iter()
            .map(|(handle, slot)| view(*handle, slot))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// Iterate over events that are due at `now`.
    ///
    /// Only events added before this call are considered; anything added while
    /// iterating waits for the next scan.
    pub fn due_events(&self, now: Millis) -> DueEvents<'_> {
        let horizon = self.lock().next_sequence;
        DueEvents {
            set: self,
            now,
            horizon,
            cursor: None,
        }
    }

    /// Put a fired event back according to its outcome.
    ///
    /// Does nothing if the event was removed while its action was running.
    pub fn complete(&self, event: DueEvent, outcome: Outcome) {
        let mut inner = self.lock();
        match outcome {
            Outcome::Remove => {
                inner.events.remove(&event.handle);
            }
            Outcome::Retain { fired, failed } => {
                if let Some(slot) = inner.events.get_mut(&event.handle) {
                    slot.action = Some(event.action);
                    slot.fired = fired;
                    slot.failed = failed;
                }
            }
        }
    }
}

const fn view(handle: EventHandle, slot: &Slot) -> EventView {
    EventView {
        handle,
        timestamp: handle.timestamp,
        fired: slot.fired,
        failed: slot.failed,
    }
}

/// A single pass over the due events of an [`EventSet`].
///
/// The lock is only held while looking for the next event, so actions are free
/// to use the set.
pub(super) struct DueEvents<'a> {
    set: &'a EventSet,
    now: Millis,
    horizon: u64,
    cursor: Option<EventHandle>,
}

impl Iterator for DueEvents<'_> {
    type Item = DueEvent;

    fn next(&mut self) -> Option<DueEvent> {
        let lower = self.cursor.map_or(Bound::Unbounded, Bound::Excluded);
        let (now, horizon) = (self.now, self.horizon);

        let mut inner = self.set.lock();
        let (handle, action) = inner
            .events
            .range_mut((lower, Bound::Unbounded))
            .take_while(|(handle, _)| handle.timestamp <= now)
            .filter(|(handle, slot)| handle.sequence < horizon && !slot.fired)
            .find_map(|(handle, slot)| slot.action.take().map(|action| (*handle, action)))?;
        drop(inner);

        self.cursor = Some(handle);
        Some(DueEvent { handle, action })
    }
}
