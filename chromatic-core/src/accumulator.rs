//! # Audio Accumulator
//!
//! Bridges the capture callback, which delivers small fixed-size chunks,
//! and the pitch engine, which needs one large analysis window.
//!
//! Each chunk is auto-gained by its own peak and copied into the next slot
//! of the window. When the window is full the engine runs synchronously,
//! the window is zeroed and filling starts over (disjoint hops, no overlap).
//!
//! Everything here runs on the audio thread: after `start` no method
//! allocates or blocks.

use crate::buffers::EngineBuffers;
use crate::config::TunerConfig;
use crate::engine::{EngineSetup, PitchEngine};
use crate::error::{Result, TunerError};
use log::{info, warn};

pub struct AudioAccumulator {
    engine: Box<dyn PitchEngine>,
    config: TunerConfig,
    buffers: Option<EngineBuffers>,
    chunk_index: usize,
    n_pitches: usize,
    failed_cycles: u64,
}

impl AudioAccumulator {
    pub fn new(engine: Box<dyn PitchEngine>, config: &TunerConfig) -> Self {
        Self {
            engine,
            config: config.clone(),
            buffers: None,
            chunk_index: 0,
            n_pitches: 0,
            failed_cycles: 0,
        }
    }

    fn chunks_per_window(&self) -> usize {
        self.config.big_window_size / self.config.chunk_size
    }

    /// Initializes the engine and allocates the window and output buffers.
    ///
    /// Returns the number of pitch candidates the engine emits per window.
    /// A running accumulator is stopped first.
    pub fn start(&mut self, sample_rate: u32) -> Result<usize> {
        self.stop();

        let (chunk_size, window_size) = (self.config.chunk_size, self.config.big_window_size);
        if chunk_size == 0 || window_size % chunk_size != 0 {
            return Err(TunerError::EngineInit(format!(
                "window of {window_size} samples is not a whole number of {chunk_size}-sample chunks"
            )));
        }

        // Dropped on any early return below.
        let mut buffers = EngineBuffers::with_window(window_size);

        let setup: EngineSetup = self.config.engine_setup(sample_rate);
        let n_pitches = self.engine.init(&setup)?;
        if n_pitches == 0 {
            self.engine.release();
            return Err(TunerError::EngineInit("engine emits no pitches".into()));
        }
        buffers.allocate_output(n_pitches);

        self.buffers = Some(buffers);
        self.chunk_index = 0;
        self.n_pitches = n_pitches;
        self.failed_cycles = 0;
        info!(
            target: "accumulator",
            "started at {sample_rate} Hz: {} chunks per window, {n_pitches} pitches per window",
            self.chunks_per_window()
        );
        Ok(n_pitches)
    }

    pub fn is_running(&self) -> bool {
        self.buffers.is_some()
    }

    /// Number of pitch values the engine writes per window, 0 when stopped.
    pub fn n_pitches(&self) -> usize {
        self.n_pitches
    }

    /// Windows whose engine call failed since `start`.
    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles
    }

    /// Chunks already copied into the current window.
    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    /// Current window contents, for inspection.
    pub fn window(&self) -> Option<&[f32]> {
        self.buffers.as_ref().map(EngineBuffers::window)
    }

    /// Copies one chunk into the window.
    ///
    /// Returns the engine's primary estimate when this chunk completes a
    /// window (0 when no pitch was found or the engine call failed), `None`
    /// otherwise or when stopped. Short chunks are zero-padded and long ones
    /// truncated to the chunk size.
    pub fn on_audio_frame(&mut self, frame: &[f32]) -> Option<f32> {
        let chunk_size = self.config.chunk_size;
        let chunks_per_window = self.chunks_per_window();
        let buffers = self.buffers.as_mut()?;

        // Per-chunk auto-gain: each chunk is scaled by its own peak, so quiet
        // chunks reach full scale too. An all-zero chunk stays zero.
        let peak = frame.iter().fold(0.0_f32, |max, s| max.max(s.abs()));
        let slot = buffers.chunk_mut(self.chunk_index, chunk_size);
        slot.fill(0.0);
        if peak > 0.0 {
            for (dst, &sample) in slot.iter_mut().zip(frame) {
                *dst = sample / peak;
            }
        }

        self.chunk_index += 1;
        if self.chunk_index < chunks_per_window {
            return None;
        }

        let (input, output) = buffers.split();
        let pitch = match self.engine.compute_pitches(input, output) {
            Ok(()) => output.last().copied().unwrap_or(0.0),
            Err(e) => {
                self.failed_cycles += 1;
                warn!(target: "accumulator", "analysis cycle dropped: {e}");
                0.0
            }
        };

        self.chunk_index = 0;
        buffers.clear_window();
        Some(pitch)
    }

    /// Releases the engine and all buffers. Safe to call at any time,
    /// including repeatedly or after a failed `start`.
    pub fn stop(&mut self) {
        let was_running = self.buffers.take().is_some();
        self.engine.release();
        self.chunk_index = 0;
        self.n_pitches = 0;
        if was_running {
            info!(target: "accumulator", "stopped after {} failed cycles", self.failed_cycles);
        }
    }
}

impl Drop for AudioAccumulator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every window it sees and replies with a scripted pitch.
    #[derive(Clone, Default)]
    struct ScriptedEngine {
        windows: Arc<Mutex<Vec<Vec<f32>>>>,
        fail_next: Arc<Mutex<bool>>,
        released: Arc<Mutex<usize>>,
        init_error: bool,
    }

    impl PitchEngine for ScriptedEngine {
        fn init(&mut self, _setup: &EngineSetup) -> Result<usize> {
            if self.init_error {
                return Err(TunerError::EngineInit("scripted failure".into()));
            }
            Ok(2)
        }

        fn compute_pitches(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
            self.windows.lock().unwrap().push(input.to_vec());
            if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
                return Err(TunerError::TransientCompute("scripted failure".into()));
            }
            output[0] = 1.0;
            output[1] = 261.63;
            Ok(())
        }

        fn release(&mut self) {
            *self.released.lock().unwrap() += 1;
        }
    }

    fn small_config() -> TunerConfig {
        TunerConfig {
            chunk_size: 4,
            big_window_size: 12,
            small_window_size: 4,
            ..TunerConfig::default()
        }
    }

    #[test]
    fn frames_before_start_are_ignored() {
        let mut acc = AudioAccumulator::new(Box::new(ScriptedEngine::default()), &small_config());
        assert_eq!(acc.on_audio_frame(&[1.0; 4]), None);
        assert!(!acc.is_running());
    }

    #[test]
    fn engine_runs_once_per_full_window() {
        let engine = ScriptedEngine::default();
        let windows = engine.windows.clone();
        let mut acc = AudioAccumulator::new(Box::new(engine), &small_config());
        assert_eq!(acc.start(48000).unwrap(), 2);

        assert_eq!(acc.on_audio_frame(&[0.5, -0.25, 0.0, 0.25]), None);
        assert_eq!(acc.on_audio_frame(&[0.0; 4]), None);
        assert_eq!(acc.chunk_index(), 2);
        assert_eq!(acc.on_audio_frame(&[2.0, -4.0, 1.0, 0.0]), Some(261.63));
        assert_eq!(acc.chunk_index(), 0);

        let windows = windows.lock().unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(
            windows[0],
            vec![1.0, -0.5, 0.0, 0.5, 0.0, 0.0, 0.0, 0.0, 0.5, -1.0, 0.25, 0.0]
        );
    }

    #[test]
    fn window_is_zeroed_between_cycles() {
        let mut acc = AudioAccumulator::new(Box::new(ScriptedEngine::default()), &small_config());
        acc.start(48000).unwrap();
        for _ in 0..3 {
            acc.on_audio_frame(&[0.1, 0.2, 0.3, 0.4]);
        }
        assert!(acc.window().unwrap().iter().all(|&s| s == 0.0));

        // A short frame after the reset leaves the rest of its slot at zero.
        acc.on_audio_frame(&[0.3]);
        assert_eq!(&acc.window().unwrap()[..4], &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn near_silent_chunks_are_amplified_to_full_scale() {
        let mut acc = AudioAccumulator::new(Box::new(ScriptedEngine::default()), &small_config());
        acc.start(48000).unwrap();
        acc.on_audio_frame(&[1e-6, -2e-6, 0.0, 0.0]);
        assert_eq!(&acc.window().unwrap()[..4], &[0.5, -1.0, 0.0, 0.0]);
    }

    #[test]
    fn failed_cycle_reports_no_pitch_and_continues() {
        let engine = ScriptedEngine::default();
        let fail_next = engine.fail_next.clone();
        let mut acc = AudioAccumulator::new(Box::new(engine), &small_config());
        acc.start(44100).unwrap();

        *fail_next.lock().unwrap() = true;
        let results: Vec<_> = (0..6).filter_map(|_| acc.on_audio_frame(&[0.5; 4])).collect();
        assert_eq!(results, vec![0.0, 261.63]);
        assert_eq!(acc.failed_cycles(), 1);
        assert!(acc.is_running());
    }

    #[test]
    fn init_failure_leaves_nothing_allocated() {
        let engine = ScriptedEngine {
            init_error: true,
            ..ScriptedEngine::default()
        };
        let mut acc = AudioAccumulator::new(Box::new(engine), &small_config());
        assert!(matches!(acc.start(44100), Err(TunerError::EngineInit(_))));
        assert!(!acc.is_running());
        assert!(acc.window().is_none());
        acc.stop();
    }

    #[test]
    fn ragged_window_is_rejected() {
        let config = TunerConfig {
            big_window_size: 10,
            ..small_config()
        };
        let mut acc = AudioAccumulator::new(Box::new(ScriptedEngine::default()), &config);
        assert!(matches!(acc.start(44100), Err(TunerError::EngineInit(_))));
    }

    #[test]
    fn stop_is_idempotent_and_releases_the_engine() {
        let engine = ScriptedEngine::default();
        let released = engine.released.clone();
        let mut acc = AudioAccumulator::new(Box::new(engine), &small_config());

        acc.stop();
        acc.start(44100).unwrap();
        acc.on_audio_frame(&[0.5; 4]);
        acc.stop();
        acc.stop();

        assert!(!acc.is_running());
        assert_eq!(acc.n_pitches(), 0);
        assert_eq!(acc.on_audio_frame(&[0.5; 4]), None);
        // One release per stop plus the one `start` performs first.
        assert_eq!(*released.lock().unwrap(), 4);
    }
}
