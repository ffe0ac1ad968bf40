//! Time sources and timecodes that drive a sequencer.
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

mod clocks;
mod timecode;

pub use clocks::{ElapsedClock, FrameClock, ManualClock, SystemClock};
pub use timecode::{FrameNumberTimecode, HmsfTimecode, Timecode, TimecodeError, MAX_FPS};

/// A point in time, in milliseconds.
pub type Millis = i64;

/// Something that can tell the current time.
///
/// Implementations must be monotonically non-decreasing while they are running.
#[async_trait]
pub trait TimeSource: Send + Sync + 'static {
    /// Get the current time in milliseconds.
    fn current_time(&self) -> Millis;

    /// Run the clock until `stop` is cancelled.
    ///
    /// The sequencer spawns this as its own task when it is started. Clocks that
    /// have no background work can keep the default, which just waits.
    async fn run(&self, stop: CancellationToken) {
        stop.cancelled().await;
    }
}
