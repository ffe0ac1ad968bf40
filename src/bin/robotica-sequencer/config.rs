use std::path::{Path, PathBuf};
use std::sync::Arc;

use envconfig::Envconfig;
use robotica_sequencer::config::SequencerConfig;
use robotica_sequencer::time::{ElapsedClock, FrameClock, TimecodeError};
use robotica_sequencer::TimeSource;
use serde::Deserialize;
use serde_yml::Value;
use thiserror::Error;

use crate::{cues, logging};

/// Frame rate used for timecodes when the clock does not have one.
pub const DEFAULT_FPS: u32 = 25;

#[derive(Envconfig)]
pub struct Environment {
    #[envconfig(from = "SEQUENCER_CONFIG_FILE")]
    pub config_file: PathBuf,

    #[envconfig(from = "SEQUENCER_OVERRIDE_FILE")]
    pub override_file: Option<PathBuf>,
}

fn load_file(filename: &Path) -> Result<Value, Error> {
    let f = std::fs::File::open(filename).map_err(|e| Error::File(filename.to_path_buf(), e))?;
    let config: Value =
        serde_yml::from_reader(f).map_err(|e| Error::Yaml(filename.to_path_buf(), e))?;

    Ok(config)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

/// Lay `over` on top of `base`.
///
/// Mappings merge key by key. A null in `over` keeps the base value, any other
/// value replaces it if both are the same kind.
fn overlay(base: Value, over: Value, path: &str) -> Result<Value, Error> {
    match (base, over) {
        (Value::Mapping(mut base), Value::Mapping(over)) => {
            for (key, value) in over {
                let child = format!("{path}.{}", key.as_str().unwrap_or("?"));
                let merged = match base.remove(key.clone()) {
                    Some(existing) => overlay(existing, value, &child)?,
                    None => value,
                };
                base.insert(key, merged);
            }
            Ok(Value::Mapping(base))
        }
        (base, Value::Null) => Ok(base),
        (Value::Null, over) => Ok(over),
        (base, over) if kind(&base) == kind(&over) => Ok(over),
        (base, over) => Err(Error::Merge {
            path: path.to_string(),
            base: kind(&base),
            over: kind(&over),
        }),
    }
}

impl Environment {
    pub fn config(&self) -> Result<Config, Error> {
        let config = load_file(&self.config_file)?;

        let config = if let Some(override_file) = &self.override_file {
            let overrides = load_file(override_file)?;
            overlay(config, overrides, "config")?
        } else {
            config
        };

        let config: Config =
            serde_yml::from_value(config).map_err(|e| Error::Yaml(self.config_file.clone(), e))?;

        Ok(config)
    }

    /// Load the environment from the environment variables.
    pub fn load() -> Result<Self, envconfig::Error> {
        Self::init_from_env()
    }
}

/// The clock driving the cues.
///
/// Written as `clock: {type: frames, fps: 25}` in the config file.
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClockConfig {
    /// Real time since the sequencer started.
    #[default]
    Elapsed,

    /// A media clock counting frames.
    Frames { fps: u32 },
}

impl ClockConfig {
    pub const fn fps(self) -> u32 {
        match self {
            Self::Elapsed => DEFAULT_FPS,
            Self::Frames { fps } => fps,
        }
    }

    pub fn build(self) -> Result<Arc<dyn TimeSource>, TimecodeError> {
        let clock: Arc<dyn TimeSource> = match self {
            Self::Elapsed => Arc::new(ElapsedClock::new()),
            Self::Frames { fps } => Arc::new(FrameClock::new(fps)?),
        };
        Ok(clock)
    }
}

#[derive(Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sequencer: SequencerConfig,

    #[serde(default)]
    pub clock: ClockConfig,

    #[serde(default)]
    pub logging: logging::Config,

    #[serde(default)]
    pub cues: Vec<cues::CueConfig>,
}

/// An error loading the Config
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading the file
    #[error("Error reading file {0}: {1}")]
    File(PathBuf, std::io::Error),

    /// Error parsing the file
    #[error("Error parsing file {0}: {1}")]
    Yaml(PathBuf, serde_yml::Error),

    /// The override file has a different kind of value at `path`.
    #[error("Error merging override at {path}: expected {base}, got {over}")]
    Merge {
        /// Where the values differ, e.g. `config.sequencer.tick_interval`.
        path: String,
        /// The kind of value in the main file.
        base: &'static str,
        /// The kind of value in the override file.
        over: &'static str,
    },
}
