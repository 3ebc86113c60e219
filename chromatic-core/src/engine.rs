//! # Pitch Estimation Engine
//!
//! The numeric pitch estimators live in the `pitch_detection` crate. This
//! module wraps them behind a narrow two-call contract so the accumulator
//! never depends on a particular algorithm:
//!
//! - `init` sizes the engine for one window geometry and sample rate and
//!   reports how many pitch values each call writes.
//! - `compute_pitches` reads one analysis window and fills the output slots.
//!   The last slot is the primary estimate for the whole window; a value of
//!   0 means "no pitch".

use crate::error::{Result, TunerError};
use log::{debug, info};
use pitch_detection::detector::PitchDetector;
use pitch_detection::detector::autocorrelation::AutocorrelationDetector;
use pitch_detection::detector::mcleod::McLeodDetector;
use pitch_detection::detector::yin::YINDetector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;

/// Pitch estimation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Autocorrelation,
    #[default]
    Mcleod,
    Yin,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::Autocorrelation, Algorithm::Mcleod, Algorithm::Yin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Autocorrelation => "autocorrelation",
            Algorithm::Mcleod => "mcleod",
            Algorithm::Yin => "yin",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = TunerError;

    fn from_str(s: &str) -> Result<Self> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TunerError::InvalidConfig(format!("unknown algorithm '{s}'")))
    }
}

/// Everything an engine needs to size itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSetup {
    pub big_window_size: usize,
    pub small_window_size: usize,
    pub sample_rate: u32,
    pub algorithm: Algorithm,
    pub min_pitch_hz: f32,
    pub power_threshold: f32,
    pub clarity_threshold: f32,
}

/// Seam between the accumulator and a pitch estimator.
pub trait PitchEngine: Send {
    /// Prepares the engine and returns the number of pitch values written
    /// by each `compute_pitches` call.
    fn init(&mut self, setup: &EngineSetup) -> Result<usize>;

    /// Estimates pitches for one full analysis window.
    ///
    /// `output` has exactly the length returned by `init`; its last slot
    /// receives the primary estimate. Failures cost only this call.
    fn compute_pitches(&mut self, input: &[f32], output: &mut [f32]) -> Result<()>;

    /// Releases whatever `init` allocated. Safe to call repeatedly.
    fn release(&mut self) {}
}

/// Detector from `pitch_detection`, movable to the audio thread.
struct SendDetector(Box<dyn PitchDetector<f32>>);

// SAFETY: the detectors keep their scratch buffers behind `Rc`, which makes
// them !Send. Each detector is owned by exactly one engine, no `Rc` handle
// escapes a `get_pitch` call, and the engine is used from one thread at a
// time, so moving the whole detector between threads is sound.
unsafe impl Send for SendDetector {}

impl SendDetector {
    fn new(algorithm: Algorithm, size: usize) -> Self {
        let padding = size / 2;
        let detector: Box<dyn PitchDetector<f32>> = match algorithm {
            Algorithm::Autocorrelation => Box::new(AutocorrelationDetector::new(size, padding)),
            Algorithm::Mcleod => Box::new(McLeodDetector::new(size, padding)),
            Algorithm::Yin => Box::new(YINDetector::new(size, padding)),
        };
        SendDetector(detector)
    }
}

struct Detectors {
    setup: EngineSetup,
    small: SendDetector,
    big: SendDetector,
    n_small: usize,
}

impl Detectors {
    /// Runs one detector, turning panics, non-finite results and pitches
    /// below the configured minimum into "no pitch" or an error.
    fn estimate(setup: &EngineSetup, detector: &mut SendDetector, signal: &[f32]) -> Result<f32> {
        let sample_rate = setup.sample_rate as usize;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            detector.0.get_pitch(
                signal,
                sample_rate,
                setup.power_threshold,
                setup.clarity_threshold,
            )
        }))
        .map_err(|_| TunerError::TransientCompute(format!("{} detector panicked", setup.algorithm)))?;

        Ok(match result {
            Some(pitch) if pitch.frequency.is_finite() && pitch.frequency >= setup.min_pitch_hz => {
                pitch.frequency
            }
            _ => 0.0,
        })
    }
}

/// `PitchEngine` backed by the `pitch_detection` detectors.
///
/// Emits one estimate per disjoint small window followed by the estimate for
/// the whole big window, so `n_pitches = big / small + 1`.
#[derive(Default)]
pub struct DetectorEngine {
    detectors: Option<Detectors>,
}

impl DetectorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.detectors.is_some()
    }
}

impl PitchEngine for DetectorEngine {
    fn init(&mut self, setup: &EngineSetup) -> Result<usize> {
        validate_setup(setup)?;

        let n_small = setup.big_window_size / setup.small_window_size;
        self.detectors = Some(Detectors {
            setup: *setup,
            small: SendDetector::new(setup.algorithm, setup.small_window_size),
            big: SendDetector::new(setup.algorithm, setup.big_window_size),
            n_small,
        });

        info!(
            target: "engine",
            "{} engine ready: window {}/{}, {} Hz, min pitch {} Hz",
            setup.algorithm,
            setup.big_window_size,
            setup.small_window_size,
            setup.sample_rate,
            setup.min_pitch_hz
        );
        Ok(n_small + 1)
    }

    fn compute_pitches(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        let detectors = self
            .detectors
            .as_mut()
            .ok_or_else(|| TunerError::TransientCompute("engine not initialized".into()))?;
        let setup = detectors.setup;

        if input.len() != setup.big_window_size || output.len() != detectors.n_small + 1 {
            return Err(TunerError::TransientCompute(format!(
                "buffer size mismatch: input {}, output {}",
                input.len(),
                output.len()
            )));
        }

        let (primary, partial) = output
            .split_last_mut()
            .ok_or_else(|| TunerError::TransientCompute("empty output buffer".into()))?;
        for (slot, window) in partial.iter_mut().zip(input.chunks_exact(setup.small_window_size)) {
            *slot = Detectors::estimate(&setup, &mut detectors.small, window)?;
        }
        *primary = Detectors::estimate(&setup, &mut detectors.big, input)?;
        Ok(())
    }

    fn release(&mut self) {
        if self.detectors.take().is_some() {
            debug!(target: "engine", "detectors released");
        }
    }
}

fn validate_setup(setup: &EngineSetup) -> Result<()> {
    let fail = |msg: String| Err(TunerError::EngineInit(msg));
    if setup.sample_rate == 0 {
        return fail("sample rate must be positive".into());
    }
    if setup.small_window_size < 2 || setup.big_window_size < 2 {
        return fail("window sizes must be at least 2 samples".into());
    }
    if setup.small_window_size > setup.big_window_size {
        return fail(format!(
            "small window ({}) larger than big window ({})",
            setup.small_window_size, setup.big_window_size
        ));
    }
    if !setup.min_pitch_hz.is_finite() || setup.min_pitch_hz < 0.0 {
        return fail(format!("invalid minimum pitch {}", setup.min_pitch_hz));
    }
    Ok(())
}
