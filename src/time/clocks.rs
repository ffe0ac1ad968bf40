//! Clocks that can drive a sequencer.
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::timecode::{check_fps, frames_to_millis};
use super::{Millis, TimeSource, Timecode, TimecodeError};

/// Wall clock time, in milliseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeSource for SystemClock {
    fn current_time(&self) -> Millis {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Default)]
struct ElapsedState {
    base: Millis,
    running_since: Option<Instant>,
}

impl ElapsedState {
    fn now(&self) -> Millis {
        let running = self
            .running_since
            .map_or(0, |since| since.elapsed().to_millis());
        self.base.saturating_add(running)
    }
}

/// Real time elapsed since the clock was started, excluding time spent paused.
///
/// The clock starts counting when the sequencer starts it, and freezes when the
/// sequencer is stopped.
#[derive(Debug, Default)]
pub struct ElapsedClock {
    state: Mutex<ElapsedState>,
}

impl ElapsedClock {
    /// Create a new clock, paused at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ElapsedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start counting time, if not already.
    pub fn resume(&self) {
        let mut state = self.lock();
        if state.running_since.is_none() {
            state.running_since = Some(Instant::now());
        }
    }

    /// Stop counting time, keeping the current position.
    pub fn pause(&self) {
        let mut state = self.lock();
        state.base = state.now();
        state.running_since = None;
    }

    /// Jump to a given time.
    ///
    /// Seeking backwards breaks the monotonic guarantee; events that already
    /// fired are not fired again.
    pub fn seek(&self, millis: Millis) {
        let mut state = self.lock();
        state.base = millis;
        if state.running_since.is_some() {
            state.running_since = Some(Instant::now());
        }
    }

    /// Jump back to zero.
    pub fn reset(&self) {
        self.seek(0);
    }

    /// Is the clock counting?
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().running_since.is_some()
    }
}

#[async_trait]
impl TimeSource for ElapsedClock {
    fn current_time(&self) -> Millis {
        self.lock().now()
    }

    async fn run(&self, stop: CancellationToken) {
        self.resume();
        stop.cancelled().await;
        self.pause();
        debug!("elapsed clock paused at {}", self.current_time());
    }
}

/// A media clock that counts frames at a fixed frame rate.
///
/// Frames only advance while the clock is running.
#[derive(Debug)]
pub struct FrameClock {
    fps: u32,
    frames: AtomicU64,
    paused: AtomicBool,
}

impl FrameClock {
    /// Create a new clock at frame zero.
    ///
    /// # Errors
    ///
    /// If the frame rate is zero or above [`MAX_FPS`](super::MAX_FPS).
    pub fn new(fps: u32) -> Result<Self, TimecodeError> {
        let fps = check_fps(fps)?;
        Ok(Self {
            fps,
            frames: AtomicU64::new(0),
            paused: AtomicBool::new(false),
        })
    }

    /// The frame rate in frames per second.
    #[must_use]
    pub const fn fps(&self) -> u32 {
        self.fps
    }

    /// The current frame number.
    #[must_use]
    pub fn current_frame(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Stop advancing frames.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    /// Continue advancing frames.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    /// Jump to a frame.
    pub fn seek_frame(&self, frame: u64) {
        self.frames.store(frame, Ordering::Relaxed);
    }
}

#[async_trait]
impl TimeSource for FrameClock {
    fn current_time(&self) -> Millis {
        frames_to_millis(self.current_frame(), self.fps)
    }

    async fn run(&self, stop: CancellationToken) {
        let period = Duration::from_secs(1) / self.fps;
        let mut interval = time::interval(period);

        // The first tick is immediate and is frame zero.
        interval.tick().await;

        loop {
            select! {
                biased;
                () = stop.cancelled() => {
                    debug!("frame clock stopped at frame {}", self.current_frame());
                    break;
                }
                _ = interval.tick() => {
                    if !self.paused.load(Ordering::Relaxed) {
                        self.frames.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }
}

/// A clock that only moves when told to.
///
/// Useful for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a new clock at the given time.
    #[must_use]
    pub const fn new(start: Millis) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Move the clock to `millis`. Earlier times are ignored.
    pub fn set(&self, millis: Millis) {
        self.now.fetch_max(millis, Ordering::SeqCst);
    }

    /// Move the clock forward by `millis`. Negative values are ignored.
    pub fn advance(&self, millis: Millis) {
        self.now.fetch_add(millis.max(0), Ordering::SeqCst);
    }
}

#[async_trait]
impl TimeSource for ManualClock {
    fn current_time(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}
