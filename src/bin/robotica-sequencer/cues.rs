use robotica_sequencer::sequencer::fallible;
use robotica_sequencer::time::{HmsfTimecode, TimecodeError};
use robotica_sequencer::{EventHandle, Millis, SequencedAction, Sequencer, Timecode};
use serde::Deserialize;
use tap::Pipe;
use tracing::info;

/// When a cue should happen.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum CueTime {
    /// Milliseconds from zero.
    Millis(Millis),

    /// A `HH:MM:SS:FF` timecode at the clock's frame rate.
    Timecode(String),
}

/// A message to log at a given time.
#[derive(Deserialize, Debug, Clone)]
pub struct CueConfig {
    pub at: CueTime,

    pub message: String,

    /// Fail this many attempts before succeeding.
    #[serde(default)]
    pub fail_times: u32,
}

impl CueConfig {
    pub fn timestamp(&self, fps: u32) -> Result<Millis, TimecodeError> {
        match &self.at {
            CueTime::Millis(millis) => Ok(*millis),
            CueTime::Timecode(tc) => HmsfTimecode::parse(tc, fps)?.to_millis().pipe(Ok),
        }
    }

    fn action(&self, timecode: HmsfTimecode) -> impl SequencedAction {
        let message = self.message.clone();
        let mut remaining = self.fail_times;

        fallible(move || {
            if remaining > 0 {
                remaining -= 1;
                return Err(format!("{timecode} {message}: not ready, {remaining} failures left"));
            }
            info!("{timecode} {message}");
            Ok(())
        })
    }
}

/// Add every cue to the sequencer.
pub fn add_cues(
    sequencer: &Sequencer,
    cues: &[CueConfig],
    fps: u32,
) -> Result<Vec<EventHandle>, TimecodeError> {
    cues.iter()
        .map(|cue| {
            let timestamp = cue.timestamp(fps)?;
            let timecode = HmsfTimecode::from_millis(timestamp, fps)?;
            Ok(sequencer.add_event(timestamp, cue.action(timecode)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use std::sync::Arc;
    use std::time::Duration;

    use robotica_sequencer::time::ManualClock;

    use super::*;

    fn parse(yaml: &str) -> Vec<CueConfig> {
        serde_yml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_cues() {
        let cues = parse(
            "
- at: 1500
  message: first
- at: '00:00:02:10'
  message: second
  fail_times: 2
",
        );
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].at, CueTime::Millis(1500));
        assert_eq!(cues[0].fail_times, 0);
        assert_eq!(cues[1].at, CueTime::Timecode("00:00:02:10".to_string()));
        assert_eq!(cues[1].fail_times, 2);

        assert_eq!(cues[0].timestamp(25).unwrap(), 1500);
        assert_eq!(cues[1].timestamp(25).unwrap(), 2400);
        assert!(cues[1].timestamp(10).is_err());
    }

    #[test]
    fn test_cue_action_fails_then_succeeds() {
        let cue = CueConfig {
            at: CueTime::Millis(0),
            message: "test".to_string(),
            fail_times: 2,
        };
        let mut action = cue.action(HmsfTimecode::from_millis(0, 25).unwrap());
        assert!(!action.perform());
        assert!(!action.perform());
        assert!(action.perform());
        assert!(action.perform());
    }

    #[test]
    fn test_add_cues() {
        let sequencer = Sequencer::new(Arc::new(ManualClock::new(0)), Duration::from_millis(40))
            .unwrap();
        let cues = parse(
            "
- at: '00:00:01:00'
  message: later
- at: 500
  message: sooner
",
        );

        let handles = add_cues(&sequencer, &cues, 25).unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].timestamp(), 1000);
        assert_eq!(handles[1].timestamp(), 500);

        let order: Vec<EventHandle> = sequencer.snapshot().iter().map(|e| e.handle).collect();
        assert_eq!(order, vec![handles[1], handles[0]]);
    }

    #[test]
    fn test_add_cues_bad_timecode() {
        let sequencer = Sequencer::new(Arc::new(ManualClock::new(0)), Duration::from_millis(40))
            .unwrap();
        let cues = parse(
            "
- at: 'soon'
  message: broken
",
        );
        assert!(matches!(
            add_cues(&sequencer, &cues, 25),
            Err(TimecodeError::InvalidTimecode(_))
        ));
    }
}
