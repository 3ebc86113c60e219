// chromatic-core/src/lib.rs

//! The core logic for the chromatic tuner.
//! This crate is responsible for audio capture, pitch detection,
//! stabilization and note mapping. It is completely headless
//! and contains no GUI code.

pub mod accumulator;
pub mod buffers;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod notes;
pub mod pipeline;
pub mod stabilizer;

pub use config::TunerConfig;
pub use engine::{Algorithm, PitchEngine};
pub use error::{Result, TunerError};
pub use feedback::{FeedbackState, Mood};
pub use notes::{NoteMapper, NoteReading};
pub use pipeline::{FrameSink, PitchPipeline};

/// Represents the result of one stabilization cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TunerUpdate {
    /// The stabilized frequency in Hz, 0 when nothing is detected.
    pub pitch: f32,
    /// False when the pitch repeats the previous non-zero pitch.
    pub is_new: bool,
    /// Nearest note and its deviation.
    pub reading: NoteReading,
    /// Needle angle and mood for the display.
    pub feedback: FeedbackState,
}
