//! Domain specific representations of time.
use std::{fmt, time::Duration};

use chrono::TimeDelta;
use thiserror::Error;

use super::Millis;

/// A time value that can be converted to milliseconds.
pub trait Timecode {
    /// Get the time in milliseconds.
    fn to_millis(&self) -> Millis;
}

impl Timecode for Millis {
    fn to_millis(&self) -> Millis {
        *self
    }
}

impl Timecode for Duration {
    fn to_millis(&self) -> Millis {
        Millis::try_from(self.as_millis()).unwrap_or(Millis::MAX)
    }
}

impl Timecode for TimeDelta {
    fn to_millis(&self) -> Millis {
        self.num_milliseconds()
    }
}

/// An error that can occur when creating or parsing a timecode.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimecodeError {
    /// The frame rate must be at least one frame per second.
    #[error("Frame rate must not be zero")]
    ZeroFrameRate,

    /// The frame rate is faster than the clock can tick.
    #[error("Frame rate {0} is too high")]
    FrameRateTooHigh(u32),

    /// Minutes overflow
    #[error("Minutes overflow: {0}")]
    MinutesOverflow(u32),

    /// Seconds overflow
    #[error("Seconds overflow: {0}")]
    SecondsOverflow(u32),

    /// The frame number is not valid for the frame rate.
    #[error("Frames overflow: {frames} at {fps} fps")]
    FramesOverflow {
        /// The frame number given.
        frames: u32,
        /// The frame rate.
        fps: u32,
    },

    /// The timecode could not be parsed.
    #[error("Invalid timecode {0:?}")]
    InvalidTimecode(String),
}

/// The fastest supported frame rate, one frame per millisecond.
pub const MAX_FPS: u32 = 1000;

pub(super) fn check_fps(fps: u32) -> Result<u32, TimecodeError> {
    match fps {
        0 => Err(TimecodeError::ZeroFrameRate),
        fps if fps > MAX_FPS => Err(TimecodeError::FrameRateTooHigh(fps)),
        fps => Ok(fps),
    }
}

/// Convert a frame number to milliseconds, rounding down.
pub(super) fn frames_to_millis(frame: u64, fps: u32) -> Millis {
    let millis = u128::from(frame) * 1000 / u128::from(fps);
    Millis::try_from(millis).unwrap_or(Millis::MAX)
}

/// Find the frame that is showing at `millis`.
fn millis_to_frames(millis: Millis, fps: u32) -> u64 {
    let Ok(unsigned) = u64::try_from(millis) else {
        return 0;
    };
    let frame = u128::from(unsigned) * u128::from(fps) / 1000;
    let frame = u64::try_from(frame).unwrap_or(u64::MAX);

    // frames_to_millis rounds down, so the next frame may already have started.
    if frame < u64::MAX && frames_to_millis(frame + 1, fps) <= millis {
        frame + 1
    } else {
        frame
    }
}

/// A timecode that is a frame number at a given frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameNumberTimecode {
    frame: u64,
    fps: u32,
}

impl FrameNumberTimecode {
    /// Create a new frame number timecode.
    ///
    /// # Errors
    ///
    /// If the frame rate is zero or above [`MAX_FPS`].
    pub fn new(frame: u64, fps: u32) -> Result<Self, TimecodeError> {
        let fps = check_fps(fps)?;
        Ok(Self { frame, fps })
    }

    /// The frame number.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// The frame rate in frames per second.
    #[must_use]
    pub const fn fps(&self) -> u32 {
        self.fps
    }
}

impl Timecode for FrameNumberTimecode {
    fn to_millis(&self) -> Millis {
        frames_to_millis(self.frame, self.fps)
    }
}

impl From<HmsfTimecode> for FrameNumberTimecode {
    fn from(tc: HmsfTimecode) -> Self {
        Self {
            frame: tc.total_frames(),
            fps: tc.fps,
        }
    }
}

/// A timecode in hours, minutes, seconds and frames, e.g. `01:02:03:04`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HmsfTimecode {
    hours: u32,
    minutes: u32,
    seconds: u32,
    frames: u32,
    fps: u32,
}

impl HmsfTimecode {
    /// Create a new timecode.
    ///
    /// # Errors
    ///
    /// If the frame rate is zero or above [`MAX_FPS`], or the minutes, seconds or
    /// frames are out of range.
    pub const fn try_new(
        hours: u32,
        minutes: u32,
        seconds: u32,
        frames: u32,
        fps: u32,
    ) -> Result<Self, TimecodeError> {
        if fps == 0 {
            return Err(TimecodeError::ZeroFrameRate);
        }
        if fps > MAX_FPS {
            return Err(TimecodeError::FrameRateTooHigh(fps));
        }
        if minutes > 59 {
            return Err(TimecodeError::MinutesOverflow(minutes));
        }
        if seconds > 59 {
            return Err(TimecodeError::SecondsOverflow(seconds));
        }
        if frames >= fps {
            return Err(TimecodeError::FramesOverflow { frames, fps });
        }
        Ok(Self {
            hours,
            minutes,
            seconds,
            frames,
            fps,
        })
    }

    /// Parse a timecode of the form `HH:MM:SS:FF` or `HH:MM:SS`.
    ///
    /// # Errors
    ///
    /// If the string is not a valid timecode for this frame rate.
    pub fn parse(s: &str, fps: u32) -> Result<Self, TimecodeError> {
        let invalid = || TimecodeError::InvalidTimecode(s.to_string());

        let splits = s
            .trim()
            .split(':')
            .map(|part| part.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<u32>, TimecodeError>>()?;

        match splits.as_slice() {
            [hours, minutes, seconds] => Self::try_new(*hours, *minutes, *seconds, 0, fps),
            [hours, minutes, seconds, frames] => {
                Self::try_new(*hours, *minutes, *seconds, *frames, fps)
            }
            _ => Err(invalid()),
        }
    }

    /// Get the timecode showing at a time in milliseconds.
    ///
    /// Negative times are clamped to zero.
    ///
    /// # Errors
    ///
    /// If the frame rate is zero.
    pub fn from_millis(millis: Millis, fps: u32) -> Result<Self, TimecodeError> {
        let fps = check_fps(fps)?;
        let total = millis_to_frames(millis, fps);
        let per_second = u64::from(fps);

        let frames = total % per_second;
        let total_seconds = total / per_second;
        let seconds = total_seconds % 60;
        let minutes = (total_seconds / 60) % 60;
        let hours = total_seconds / 3600;

        let narrow = |value: u64| u32::try_from(value).unwrap_or(u32::MAX);
        Ok(Self {
            hours: narrow(hours),
            minutes: narrow(minutes),
            seconds: narrow(seconds),
            frames: narrow(frames),
            fps,
        })
    }

    /// Total number of frames from zero.
    #[must_use]
    pub fn total_frames(&self) -> u64 {
        let seconds = (u64::from(self.hours) * 60 + u64::from(self.minutes)) * 60
            + u64::from(self.seconds);
        seconds * u64::from(self.fps) + u64::from(self.frames)
    }

    /// The hours, minutes, seconds and frames.
    #[must_use]
    pub const fn hmsf(&self) -> (u32, u32, u32, u32) {
        (self.hours, self.minutes, self.seconds, self.frames)
    }

    /// The frame rate in frames per second.
    #[must_use]
    pub const fn fps(&self) -> u32 {
        self.fps
    }
}

impl Timecode for HmsfTimecode {
    fn to_millis(&self) -> Millis {
        frames_to_millis(self.total_frames(), self.fps)
    }
}

impl fmt::Display for HmsfTimecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}
