//! What happens to an event after it has been attempted.
use serde::{Deserialize, Serialize};

/// Settings governing an event's lifecycle after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Remove events from the sequencer when they are complete.
    ///
    /// Failed events are only removed if `retry_failed_events` is false.
    pub remove_events_when_complete: bool,

    /// Retry failed events on the next tick.
    pub retry_failed_events: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            remove_events_when_complete: true,
            retry_failed_events: false,
        }
    }
}

/// The state of an event after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The event is removed and never revisited.
    Remove,

    /// The event stays in the sequencer with these flags.
    Retain {
        /// Attempts have stopped.
        fired: bool,
        /// The last attempt failed.
        failed: bool,
    },
}

impl Policy {
    /// Decide what happens to an event whose action returned `success`.
    #[must_use]
    pub const fn outcome(&self, success: bool) -> Outcome {
        if self.remove_events_when_complete && (success || !self.retry_failed_events) {
            Outcome::Remove
        } else if self.retry_failed_events {
            Outcome::Retain {
                fired: success,
                failed: !success,
            }
        } else {
            Outcome::Retain {
                fired: true,
                failed: !success,
            }
        }
    }
}
