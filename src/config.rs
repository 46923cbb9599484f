//! Engine configuration.
//!
//! All fields have defaults so an empty JSON object is a valid configuration.

use crate::error::InitError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default size of the preallocated voice pool.
pub const DEFAULT_MAX_VOICES: usize = 64;

/// Default capacity of the control → render command queue.
pub const DEFAULT_COMMAND_CAPACITY: usize = 1024;

/// Default linear output gain.
pub const DEFAULT_GAIN: f32 = 0.5;

/// Supported sample rate range in Hz.
const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8000..=192_000;

/// Settings fixed for the lifetime of one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz. Immutable once the engine is built.
    pub sample_rate: u32,

    /// Number of voices allocated up front for the render context.
    pub max_voices: usize,

    /// Number of commands the control context can queue ahead of the renderer.
    pub command_capacity: usize,

    /// Linear gain applied before the first `set_gain` call.
    pub default_gain: f32,

    /// SoundFont file to load as the default bank.
    /// None uses the built-in sine bank.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_soundfont: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_voices: DEFAULT_MAX_VOICES,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            default_gain: DEFAULT_GAIN,
            default_soundfont: None,
        }
    }
}

impl EngineConfig {
    /// Creates a default configuration with the given sample rate.
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    /// Parses a configuration from JSON bytes. Empty input yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `InitError::InvalidConfig` if the JSON is malformed or the
    /// resulting values fail validation.
    pub fn from_json(bytes: &[u8]) -> Result<Self, InitError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let config: Self =
            serde_json::from_slice(bytes).map_err(|e| InitError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file (JSON).
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a valid configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, InitError> {
        let bytes = fs::read(path.as_ref()).map_err(|e| {
            InitError::InvalidConfig(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json(&bytes)
    }

    /// Checks that every value is usable by the engine.
    ///
    /// # Errors
    ///
    /// Returns `InitError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<(), InitError> {
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            return Err(InitError::InvalidConfig(format!(
                "sample_rate {} outside {}..={} Hz",
                self.sample_rate,
                SAMPLE_RATE_RANGE.start(),
                SAMPLE_RATE_RANGE.end()
            )));
        }
        if self.max_voices == 0 {
            return Err(InitError::InvalidConfig(
                "max_voices must be at least 1".to_string(),
            ));
        }
        if self.command_capacity == 0 {
            return Err(InitError::InvalidConfig(
                "command_capacity must be at least 1".to_string(),
            ));
        }
        if !self.default_gain.is_finite() || self.default_gain < 0.0 {
            return Err(InitError::InvalidConfig(format!(
                "default_gain {} must be a non-negative number",
                self.default_gain
            )));
        }
        Ok(())
    }
}
