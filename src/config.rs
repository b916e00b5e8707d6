//! Configuration: loaded from ~/.pianola/config.yaml.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::file::CreationOptions;
use crate::midi::MidiConfig;
use crate::playback::MetronomeConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The bounded set of playback speeds: `min..=max` in steps of `step`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl SpeedConfig {
    /// Clamp `speed` into range and round it to the nearest step.
    ///
    /// Never panics, even on a range that failed [`validate`](Self::validate);
    /// the lower bound wins when the bounds cross.
    pub fn snap(&self, speed: f64) -> f64 {
        let clamped = speed.min(self.max).max(self.min);
        if self.step.is_nan() || self.step <= 0.0 {
            return clamped;
        }
        let steps = ((clamped - self.min) / self.step).round();
        // Trim float noise such as 1.0500000000000003.
        let snapped = ((self.min + steps * self.step) * 1e6).round() / 1e6;
        snapped.min(self.max).max(self.min)
    }

    /// `0 < min <= max`, all finite; `step` finite and not negative.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min.is_finite() && self.max.is_finite() && self.min > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "speed range {}..{} must be finite and positive",
                self.min, self.max
            )));
        }
        if self.min > self.max {
            return Err(ConfigError::Invalid(format!(
                "speed min {} is above max {}",
                self.min, self.max
            )));
        }
        if !(self.step.is_finite() && self.step >= 0.0) {
            return Err(ConfigError::Invalid(format!("speed step {} must be >= 0", self.step)));
        }
        Ok(())
    }

    /// The speed `steps` steps away from `speed`.
    pub fn offset(&self, speed: f64, steps: i32) -> f64 {
        self.snap(speed + f64::from(steps) * self.step)
    }
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            min: 0.25,
            max: 4.0,
            step: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the MIDI files.
    #[serde(default = "Config::default_data_dir")]
    pub data_dir: PathBuf,
    /// Virtual time before musical time zero, in milliseconds.
    #[serde(default = "Config::default_lead_in_ms")]
    pub lead_in_ms: f64,
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub metronome: MetronomeConfig,
    #[serde(default)]
    pub speed: SpeedConfig,
    /// Tempo and meter of new recordings.
    #[serde(default)]
    pub recording: CreationOptions,
}

impl Config {
    /// Default config file path (~/.pianola/config.yaml).
    pub fn default_path() -> PathBuf {
        home_dir().join("config.yaml")
    }

    /// Load from the default path. A missing file gives the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Load from `path`. A missing file gives the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.speed.validate()?;
        if !(self.lead_in_ms.is_finite() && self.lead_in_ms >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "lead_in_ms {} must be finite and >= 0",
                self.lead_in_ms
            )));
        }
        let rec = &self.recording;
        if rec.ticks_per_beat == 0 {
            return Err(ConfigError::Invalid("recording.ticks_per_beat must be positive".into()));
        }
        if !(rec.bpm.is_finite() && rec.bpm > 0.0) {
            return Err(ConfigError::Invalid(format!("recording.bpm {} must be positive", rec.bpm)));
        }
        if rec.numerator == 0 || !rec.denominator.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "recording time signature {}/{} is not a valid meter",
                rec.numerator, rec.denominator
            )));
        }
        Ok(())
    }

    fn default_data_dir() -> PathBuf {
        home_dir().join("midi")
    }

    fn default_lead_in_ms() -> f64 {
        100.0
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            lead_in_ms: Self::default_lead_in_ms(),
            midi: MidiConfig::default(),
            metronome: MetronomeConfig::default(),
            speed: SpeedConfig::default(),
            recording: CreationOptions::default(),
        }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pianola")
}
