//! # Tuner Configuration
//!
//! Runtime parameters for the detection pipeline, loadable from and savable
//! to JSON so the reference frequency survives restarts.

use crate::engine::{Algorithm, EngineSetup};
use crate::error::{Result, TunerError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

/// Default concert pitch for A4.
pub const DEFAULT_REFERENCE_HZ: u16 = 440;

/// Reference frequencies a user may select.
pub const REFERENCE_RANGE: RangeInclusive<u16> = 430..=450;

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Frequency assigned to A4, in Hz
    pub reference_hz: u16,
    pub algorithm: Algorithm,
    /// Estimates below this are reported as "no pitch"
    pub min_pitch_hz: f32,
    /// Samples per capture callback chunk
    pub chunk_size: usize,
    /// Samples per analysis window; a multiple of `chunk_size`
    pub big_window_size: usize,
    pub small_window_size: usize,
    pub power_threshold: f32,
    pub clarity_threshold: f32,
    /// Capacity of the candidate channel from the audio thread
    pub channel_capacity: usize,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            reference_hz: DEFAULT_REFERENCE_HZ,
            algorithm: Algorithm::default(),
            // Tuned for the low brass/woodwind range.
            min_pitch_hz: 140.0,
            chunk_size: 128,
            big_window_size: 4096,
            small_window_size: 2048,
            power_threshold: 5.0,
            clarity_threshold: 0.7,
            channel_capacity: 64,
        }
    }
}

/// Checks a reference frequency against [`REFERENCE_RANGE`].
pub fn validate_reference(reference_hz: u16) -> Result<()> {
    if REFERENCE_RANGE.contains(&reference_hz) {
        Ok(())
    } else {
        Err(TunerError::InvalidConfig(format!(
            "reference frequency {reference_hz} Hz outside {}..={} Hz",
            REFERENCE_RANGE.start(),
            REFERENCE_RANGE.end()
        )))
    }
}

impl TunerConfig {
    pub fn validate(&self) -> Result<()> {
        validate_reference(self.reference_hz)?;

        if self.chunk_size == 0 {
            return Err(TunerError::InvalidConfig("chunk size must be positive".into()));
        }
        if self.big_window_size == 0 || self.big_window_size % self.chunk_size != 0 {
            return Err(TunerError::InvalidConfig(format!(
                "analysis window ({}) must be a positive multiple of the chunk size ({})",
                self.big_window_size, self.chunk_size
            )));
        }
        if self.small_window_size == 0 || self.small_window_size > self.big_window_size {
            return Err(TunerError::InvalidConfig(format!(
                "small window ({}) must be in 1..={}",
                self.small_window_size, self.big_window_size
            )));
        }
        if !(0.0..=1.0).contains(&self.clarity_threshold) {
            return Err(TunerError::InvalidConfig(format!(
                "clarity threshold {} outside 0..=1",
                self.clarity_threshold
            )));
        }
        if self.channel_capacity == 0 {
            return Err(TunerError::InvalidConfig("channel capacity must be positive".into()));
        }
        Ok(())
    }

    /// Engine parameters for a stream running at `sample_rate`.
    pub fn engine_setup(&self, sample_rate: u32) -> EngineSetup {
        EngineSetup {
            big_window_size: self.big_window_size,
            small_window_size: self.small_window_size,
            sample_rate,
            algorithm: self.algorithm,
            min_pitch_hz: self.min_pitch_hz,
            power_threshold: self.power_threshold,
            clarity_threshold: self.clarity_threshold,
        }
    }

    /// Loads a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let config: TunerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config, falling back to defaults when the file is missing
    /// or unusable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(TunerError::ConfigIo(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(e) => {
                log::warn!(target: "config", "ignoring {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Restores the default reference frequency, keeping other settings.
    pub fn reset_reference(&mut self) {
        self.reference_hz = DEFAULT_REFERENCE_HZ;
    }
}
