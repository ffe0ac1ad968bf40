//! Fire actions when a pluggable clock reaches their target time.
#![warn(missing_docs)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod sequencer;
pub mod time;

pub use sequencer::{EventHandle, EventView, Policy, SequencedAction, Sequencer};
pub use time::{Millis, TimeSource, Timecode};

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawn a task and automatically monitor its execution.
///
/// The returned handle completes once the monitored task has finished.
pub fn spawn<T>(name: &'static str, future: T) -> JoinHandle<()>
where
    T: Future + Send + 'static,
    T::Output: Send + 'static,
{
    let task = tokio::spawn(future);

    tokio::spawn(async move {
        let rc = task.await;

        match rc {
            Ok(_rc) => {
                debug!("{name}: the task terminated normally");
            }
            Err(err) if err.is_cancelled() => {
                debug!("{name}: the task was cancelled");
            }
            Err(err) => {
                error!("{name}: the task aborted with error: {err}");
            }
        };
    })
}
