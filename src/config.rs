//! Serializable sequencer settings.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sequencer::{Policy, DEFAULT_TICK_INTERVAL};

const fn default_tick_interval() -> Duration {
    DEFAULT_TICK_INTERVAL
}

/// Settings for a [`Sequencer`](crate::Sequencer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// How often to check for due events.
    #[serde(with = "with_duration", default = "default_tick_interval")]
    pub tick_interval: Duration,

    /// What to do with events after they are attempted.
    #[serde(flatten)]
    pub policy: Policy,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            policy: Policy::default(),
        }
    }
}

/// Read a duration as either a number of milliseconds or a string accepted by
/// [`duration::from_str`], and write it back as a string.
pub mod with_duration {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    /// Deserialize a duration.
    ///
    /// # Errors
    ///
    /// If the duration is invalid.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<super::Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(millis) => Ok(super::Duration::from_millis(millis)),
            Raw::Text(text) => super::duration::from_str(&text).map_err(serde::de::Error::custom),
        }
    }

    /// Serialize a duration.
    ///
    /// # Errors
    ///
    /// If the serializer fails.
    pub fn serialize<S>(duration: &super::Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::duration::to_string(duration))
    }
}

/// `Duration` helpers
pub mod duration {
    use std::time::Duration;
    use thiserror::Error;

    /// An error that can occur when parsing a `Duration`.
    #[derive(Error, Debug, PartialEq, Eq)]
    pub enum DurationParseError {
        /// The text is not a duration.
        #[error("Invalid duration {0:?}")]
        InvalidDuration(String),

        /// A minutes or seconds field is 60 or more.
        #[error("Field out of range in duration {0:?}")]
        OutOfRange(String),
    }

    /// Turn a string into a `Duration`.
    ///
    /// Accepts `HH:MM`, `HH:MM:SS`, `<n>ms` or `<n>s`.
    ///
    /// # Errors
    ///
    /// If the string is not a valid `Duration`.
    pub fn from_str(s: &str) -> Result<Duration, DurationParseError> {
        let s = s.trim();
        let invalid = || DurationParseError::InvalidDuration(s.to_string());
        let parse = |part: &str| part.trim().parse::<u64>().map_err(|_| invalid());

        if let Some(millis) = s.strip_suffix("ms") {
            return parse(millis).map(Duration::from_millis);
        }
        if let Some(seconds) = s.strip_suffix('s') {
            return parse(seconds).map(Duration::from_secs);
        }

        let (hours, minutes, seconds) = match s.split(':').collect::<Vec<_>>().as_slice() {
            [h, m] => (parse(h)?, parse(m)?, 0),
            [h, m, sec] => (parse(h)?, parse(m)?, parse(sec)?),
            _ => return Err(invalid()),
        };
        if minutes > 59 || seconds > 59 {
            return Err(DurationParseError::OutOfRange(s.to_string()));
        }

        hours
            .checked_mul(3600)
            .and_then(|x| x.checked_add(minutes * 60 + seconds))
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    }

    /// Turn a duration into a string.
    ///
    /// Durations with a fractional second are written in milliseconds.
    #[must_use]
    pub fn to_string(duration: &Duration) -> String {
        if duration.subsec_millis() != 0 {
            return format!("{}ms", duration.as_millis());
        }

        let secs = duration.as_secs();
        let (minutes, seconds) = (secs / 60, secs % 60);
        let (hours, minutes) = (minutes / 60, minutes % 60);
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_duration_from_str() {
        assert_eq!(duration::from_str("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(duration::from_str("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(duration::from_str("01:02").unwrap(), Duration::from_secs(3720));
        assert_eq!(
            duration::from_str("01:02:03").unwrap(),
            Duration::from_secs(3723)
        );
        assert_eq!(
            duration::from_str("00:61:00").unwrap_err(),
            duration::DurationParseError::OutOfRange("00:61:00".to_string())
        );
        assert_eq!(
            duration::from_str(" soon ").unwrap_err(),
            duration::DurationParseError::InvalidDuration("soon".to_string())
        );
        assert!(duration::from_str("ms").is_err());
        assert!(duration::from_str("1").is_err());
        assert!(duration::from_str("-5s").is_err());
    }

    #[test]
    fn test_duration_to_string() {
        assert_eq!(duration::to_string(&Duration::from_millis(250)), "250ms");
        assert_eq!(duration::to_string(&Duration::from_millis(1500)), "1500ms");
        assert_eq!(duration::to_string(&Duration::from_secs(3723)), "01:02:03");
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = "
tick_interval: 100ms
retry_failed_events: true
";
        let config: SequencerConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(
            config.policy,
            Policy {
                remove_events_when_complete: true,
                retry_failed_events: true,
            }
        );
    }

    #[test]
    fn test_config_tick_interval_forms() {
        let config: SequencerConfig = serde_yml::from_str("tick_interval: 250").unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(250));

        let err = serde_yml::from_str::<SequencerConfig>("tick_interval: '00:99'")
            .unwrap_err()
            .to_string();
        assert!(err.contains("Field out of range in duration \"00:99\""), "{err}");
    }

    #[test]
    fn test_config_defaults() {
        let config: SequencerConfig = serde_yml::from_str("{}").unwrap();
        assert_eq!(config, SequencerConfig::default());
    }

    #[test]
    fn test_config_round_trip() {
        let config = SequencerConfig {
            tick_interval: Duration::from_millis(40),
            policy: Policy {
                remove_events_when_complete: false,
                retry_failed_events: false,
            },
        };
        let yaml = serde_yml::to_string(&config).unwrap();
        let value: serde_yml::Value = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(value["tick_interval"].as_str(), Some("40ms"));
        let parsed: SequencerConfig = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
