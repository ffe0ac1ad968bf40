//! Actions that can be sequenced.
use std::any::Any;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

/// Something the sequencer can trigger at a specific time.
///
/// Returns `true` if the action succeeded.
pub trait SequencedAction: Send + 'static {
    /// Perform the sequenced action.
    fn perform(&mut self) -> bool;
}

impl<F> SequencedAction for F
where
    F: FnMut() -> bool + Send + 'static,
{
    fn perform(&mut self) -> bool {
        self()
    }
}

/// Adapt a closure that returns a `Result` into a [`SequencedAction`].
///
/// Errors are logged and reported to the sequencer as a failed attempt.
pub fn fallible<F, E>(mut f: F) -> impl SequencedAction
where
    F: FnMut() -> Result<(), E> + Send + 'static,
    E: Display,
{
    move || match f() {
        Ok(()) => true,
        Err(err) => {
            warn!("Sequenced action failed: {err}");
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Run an action, treating a panic as a failure.
pub(super) fn invoke(action: &mut dyn SequencedAction) -> bool {
    match catch_unwind(AssertUnwindSafe(|| action.perform())) {
        Ok(success) => success,
        Err(payload) => {
            warn!("Sequenced action panicked: {}", panic_message(payload.as_ref()));
            false
        }
    }
}
