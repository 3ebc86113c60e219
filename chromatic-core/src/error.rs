//! # Error Types
//!
//! Failures of the pitch pipeline. `PermissionDenied` and `EngineInit` are
//! fatal to one pipeline instance; `TransientCompute` only ever costs a
//! single analysis cycle and is recovered inside the accumulator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TunerError {
    /// Microphone access was refused or no input device exists.
    #[error("microphone access denied")]
    PermissionDenied,

    /// The pitch estimation engine could not be initialized.
    #[error("pitch engine failed to initialize: {0}")]
    EngineInit(String),

    /// One analysis cycle failed inside the engine.
    #[error("pitch computation failed: {0}")]
    TransientCompute(String),

    /// The audio device failed in a way other than refusing access.
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config file i/o: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("config file format: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    #[error("pitch detection is already running")]
    AlreadyRunning,
}

impl TunerError {
    /// True for errors that end the pipeline instance.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TunerError::TransientCompute(_))
    }
}

pub type Result<T> = std::result::Result<T, TunerError>;
