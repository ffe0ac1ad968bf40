//! Fire events at specific times, sequencing actions into a stream.
//!
//! A [`Sequencer`] holds a set of events, each an action with the time it
//! should happen. Once started, it checks a [`TimeSource`] every tick and
//! fires every event whose time has been reached, in time order. Events at the
//! same time fire in the order they were added.
//!
//! The accuracy of the triggers depends on the tick interval: if actions never
//! need to happen more than once a second, a tick of about a second is fine.
//! Actions run on the tick task, so a slow action delays every event after it
//! and the next tick.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::SequencerConfig;
use crate::spawn;
use crate::time::{Millis, TimeSource, Timecode};

mod action;
mod event_set;
mod policy;
mod poll;

pub use action::{fallible, SequencedAction};
pub use event_set::{EventHandle, EventView};
pub use policy::{Outcome, Policy};

use event_set::EventSet;
use poll::PollLoop;

/// Check for due events every second unless told otherwise.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// An error from the sequencer.
#[derive(Error, Debug)]
pub enum Error {
    /// The sequencer was given invalid settings.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The sequencer has already been started.
    #[error("The sequencer is already running")]
    AlreadyRunning,

    /// The sequencer can only be started inside a tokio runtime.
    #[error("No tokio runtime: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

struct Running {
    stop: CancellationToken,
    poll: JoinHandle<()>,
    clock: JoinHandle<()>,
}

enum State {
    Stopped,
    Running(Running),
}

/// Builder for a [`Sequencer`].
#[derive(Default)]
#[must_use]
pub struct SequencerBuilder {
    time_source: Option<Arc<dyn TimeSource>>,
    tick_interval: Option<Duration>,
    policy: Policy,
}

impl SequencerBuilder {
    /// The clock that decides when events are due.
    pub fn time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// How often to check for due events.
    pub fn tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = Some(tick_interval);
        self
    }

    /// What to do with events after they are attempted.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Create the sequencer.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfiguration` if there is no time source or the
    /// tick interval is zero.
    pub fn build(self) -> Result<Sequencer, Error> {
        let time_source = self
            .time_source
            .ok_or_else(|| Error::InvalidConfiguration("no time source".to_string()))?;

        let tick_interval = self.tick_interval.unwrap_or(DEFAULT_TICK_INTERVAL);
        if tick_interval.is_zero() {
            return Err(Error::InvalidConfiguration(
                "tick interval must be greater than zero".to_string(),
            ));
        }

        let (policy, _) = watch::channel(self.policy);

        Ok(Sequencer {
            events: Arc::new(EventSet::default()),
            time_source,
            tick_interval,
            policy,
            state: Mutex::new(State::Stopped),
        })
    }
}

/// Fires events when a time source reaches their time.
pub struct Sequencer {
    events: Arc<EventSet>,
    time_source: Arc<dyn TimeSource>,
    tick_interval: Duration,
    policy: watch::Sender<Policy>,
    state: Mutex<State>,
}

impl Sequencer {
    /// Create a sequencer that checks for due events every `tick_interval`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfiguration` if the tick interval is zero.
    pub fn new(time_source: Arc<dyn TimeSource>, tick_interval: Duration) -> Result<Self, Error> {
        Self::builder()
            .time_source(time_source)
            .tick_interval(tick_interval)
            .build()
    }

    /// Start building a sequencer.
    pub fn builder() -> SequencerBuilder {
        SequencerBuilder::default()
    }

    /// Create a sequencer from its configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfiguration` if the tick interval is zero.
    pub fn from_config(
        config: &SequencerConfig,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self, Error> {
        Self::builder()
            .time_source(time_source)
            .tick_interval(config.tick_interval)
            .policy(config.policy)
            .build()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an event that should happen at `timestamp` milliseconds.
    pub fn add_event(&self, timestamp: Millis, action: impl SequencedAction) -> EventHandle {
        self.events.add(timestamp, Box::new(action))
    }

    /// Add an event that should happen at a timecode.
    pub fn add_event_at(
        &self,
        timecode: &impl Timecode,
        action: impl SequencedAction,
    ) -> EventHandle {
        self.add_event(timecode.to_millis(), action)
    }

    /// Remove an event. Returns false if it was already gone.
    ///
    /// If the event's action is running it completes, but the event is not
    /// put back.
    pub fn remove_event(&self, handle: EventHandle) -> bool {
        self.events.remove(handle)
    }

    /// Get the current state of an event, if it is still in the sequencer.
    #[must_use]
    pub fn event(&self, handle: EventHandle) -> Option<EventView> {
        self.events.get(handle)
    }

    /// Get a copy of all events in the sequencer, in firing order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EventView> {
        self.events.snapshot()
    }

    /// The number of events in the sequencer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Are there no events in the sequencer?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the time source and begin checking for events.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyRunning` if the sequencer has already been started,
    /// or `Error::NoRuntime` if called outside a tokio runtime.
    pub fn start(&self) -> Result<(), Error> {
        Handle::try_current()?;

        let mut state = self.lock_state();
        if matches!(*state, State::Running(_)) {
            return Err(Error::AlreadyRunning);
        }

        let stop = CancellationToken::new();

        let clock = {
            let time_source = self.time_source.clone();
            let stop = stop.clone();
            spawn("time source", async move { time_source.run(stop).await })
        };

        let poll_loop = PollLoop {
            events: self.events.clone(),
            time_source: self.time_source.clone(),
            policy: self.policy.subscribe(),
            tick_interval: self.tick_interval,
        };
        let poll = spawn("poll loop", poll_loop.run(stop.clone()));

        *state = State::Running(Running { stop, poll, clock });
        drop(state);

        info!(
            "Sequencer started with tick interval {:?} and {} events",
            self.tick_interval,
            self.len()
        );
        Ok(())
    }

    /// Stop checking for events and stop the time source.
    ///
    /// Once this returns there are no further ticks. Does nothing if the
    /// sequencer is not running.
    pub async fn stop(&self) {
        let state = std::mem::replace(&mut *self.lock_state(), State::Stopped);
        let State::Running(running) = state else {
            return;
        };

        running.stop.cancel();
        for (name, handle) in [("poll loop", running.poll), ("time source", running.clock)] {
            if let Err(err) = handle.await {
                error!("Error waiting for {name} to stop: {err}");
            }
        }
        info!("Sequencer stopped with {} events", self.len());
    }

    /// Is the sequencer running?
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(*self.lock_state(), State::Running(_))
    }

    /// Set whether failed events are retried on the next tick.
    pub fn set_retry_failed_events(&self, retry: bool) {
        self.policy.send_modify(|policy| policy.retry_failed_events = retry);
    }

    /// Set whether events are removed once complete.
    ///
    /// Removing events keeps each tick fast but loses their state. To keep a
    /// record, take a [`snapshot`](Self::snapshot) before starting. Failed
    /// events are only removed if retrying is off.
    pub fn set_remove_events_when_complete(&self, remove: bool) {
        self.policy
            .send_modify(|policy| policy.remove_events_when_complete = remove);
    }

    /// The current policy. Changes take effect from the next tick.
    #[must_use]
    pub fn policy(&self) -> Policy {
        *self.policy.borrow()
    }

    /// How often the sequencer checks for due events.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// The clock driving this sequencer.
    #[must_use]
    pub fn time_source(&self) -> &Arc<dyn TimeSource> {
        &self.time_source
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let State::Running(running) = state {
            running.stop.cancel();
        }
    }
}
