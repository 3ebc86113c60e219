//! # Detection Pipeline
//!
//! Wires the pieces together across two threads:
//!
//! - **Audio thread**: a [`FrameSink`] owns the accumulator and the producer
//!   side of a bounded candidate channel. It never blocks: when the channel
//!   is full the candidate is dropped.
//! - **Consumer thread**: owns the stabilizer and the note mapper, reads the
//!   live reference frequency, and publishes one [`TunerUpdate`] per
//!   stabilization cycle on a bounded queue. Updates nobody reads are
//!   dropped once the queue is full.
//!
//! Only pitch candidates cross the thread boundary; the analysis window
//! stays with the accumulator.

use crate::accumulator::AudioAccumulator;
use crate::capture::{self, CaptureWorker};
use crate::config::{TunerConfig, validate_reference};
use crate::engine::{DetectorEngine, PitchEngine};
use crate::error::{Result, TunerError};
use crate::feedback::FeedbackState;
use crate::notes::{NoteMapper, NoteReading};
use crate::stabilizer::{PitchStabilizer, Stabilized};
use crate::TunerUpdate;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, error, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

/// Updates kept for a reader that falls behind.
pub const UPDATE_QUEUE_CAPACITY: usize = 64;

/// Builds a fresh engine for every run.
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn PitchEngine> + Send + Sync>;

/// State read by the display and written by the pipeline threads.
#[derive(Debug)]
struct Shared {
    reference_hz: AtomicU16,
    current_pitch_bits: AtomicU32,
    dropped_candidates: AtomicU64,
}

impl Shared {
    fn new(reference_hz: u16) -> Self {
        Self {
            reference_hz: AtomicU16::new(reference_hz),
            current_pitch_bits: AtomicU32::new(0.0_f32.to_bits()),
            dropped_candidates: AtomicU64::new(0),
        }
    }

    fn set_current_pitch(&self, pitch: f32) {
        self.current_pitch_bits.store(pitch.to_bits(), Ordering::Relaxed);
    }

    fn current_pitch(&self) -> f32 {
        f32::from_bits(self.current_pitch_bits.load(Ordering::Relaxed))
    }
}

/// Audio-thread end of the pipeline.
///
/// Feed it every captured chunk; it accumulates windows, runs the engine and
/// forwards candidates to the consumer thread.
///
/// Once the run is stopped the next `push` releases the engine and buffers
/// and every later one is ignored.
pub struct FrameSink {
    accumulator: AudioAccumulator,
    candidates: Sender<f32>,
    shared: Arc<Shared>,
    stopped: Arc<AtomicBool>,
}

impl FrameSink {
    pub fn push(&mut self, frame: &[f32]) {
        if self.stopped.load(Ordering::Acquire) {
            self.release();
            return;
        }
        let Some(pitch) = self.accumulator.on_audio_frame(frame) else {
            return;
        };
        match self.candidates.try_send(pitch) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.shared.dropped_candidates.fetch_add(1, Ordering::Relaxed);
            }
            // Consumer gone; stop is under way.
            Err(TrySendError::Disconnected(_)) => self.release(),
        }
    }

    fn release(&mut self) {
        if self.accumulator.is_running() {
            self.accumulator.stop();
        }
    }

    /// False once the run this sink belongs to has stopped.
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire) && self.accumulator.is_running()
    }

    /// Pitch values the engine emits per window.
    pub fn n_pitches(&self) -> usize {
        self.accumulator.n_pitches()
    }
}

struct Running {
    capture: Option<CaptureWorker>,
    stopped: Arc<AtomicBool>,
    shutdown_tx: Sender<()>,
    consumer: JoinHandle<Vec<f32>>,
    n_pitches: usize,
}

/// Start/stop surface of the pitch detector.
pub struct PitchPipeline {
    config: TunerConfig,
    engine_factory: EngineFactory,
    shared: Arc<Shared>,
    updates_tx: Sender<TunerUpdate>,
    updates_rx: Receiver<TunerUpdate>,
    running: Option<Running>,
}

impl PitchPipeline {
    /// A pipeline using the `pitch_detection` engine.
    pub fn new(config: TunerConfig) -> Self {
        Self::with_engine_factory(
            config,
            Arc::new(|| Box::new(DetectorEngine::new()) as Box<dyn PitchEngine>),
        )
    }

    pub fn with_engine_factory(config: TunerConfig, engine_factory: EngineFactory) -> Self {
        let (updates_tx, updates_rx) = crossbeam_channel::bounded(UPDATE_QUEUE_CAPACITY);
        let shared = Arc::new(Shared::new(config.reference_hz));
        Self {
            config,
            engine_factory,
            shared,
            updates_tx,
            updates_rx,
            running: None,
        }
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Pitch values per analysis window of the current run, 0 when stopped.
    pub fn n_pitches(&self) -> usize {
        self.running.as_ref().map_or(0, |r| r.n_pitches)
    }

    /// Latest stabilized pitch in Hz; 0 when nothing is detected.
    pub fn current_pitch(&self) -> f32 {
        self.shared.current_pitch()
    }

    /// Candidates dropped because the consumer fell behind.
    pub fn dropped_candidates(&self) -> u64 {
        self.shared.dropped_candidates.load(Ordering::Relaxed)
    }

    /// Receiver of per-cycle updates. Clones share one queue of at most
    /// [`UPDATE_QUEUE_CAPACITY`] updates.
    pub fn updates(&self) -> Receiver<TunerUpdate> {
        self.updates_rx.clone()
    }

    /// Changes the reference frequency; takes effect from the next cycle.
    pub fn set_reference(&mut self, reference_hz: u16) -> Result<()> {
        validate_reference(reference_hz)?;
        self.config.reference_hz = reference_hz;
        self.shared.reference_hz.store(reference_hz, Ordering::Relaxed);
        Ok(())
    }

    /// Opens the microphone and starts detecting.
    ///
    /// Returns the number of pitch values the engine emits per window.
    pub fn start(&mut self) -> Result<usize> {
        self.ensure_stopped()?;

        let config = self.config.clone();
        let factory = self.engine_factory.clone();
        let shared = self.shared.clone();
        let stopped = Arc::new(AtomicBool::new(false));
        let sink_stopped = stopped.clone();
        let (candidates_tx, candidates_rx) = crossbeam_channel::bounded(config.channel_capacity);

        let chunk_size = config.chunk_size;
        let started = capture::start_capture(chunk_size, move |sample_rate| {
            let mut sink = build_sink(
                &config,
                factory(),
                candidates_tx,
                shared,
                sink_stopped,
                sample_rate,
            )?;
            let n_pitches = sink.n_pitches();
            Ok((move |frame: &[f32]| sink.push(frame), n_pitches))
        });

        let (worker, n_pitches) = match started {
            Ok(started) => started,
            Err(e) => {
                error!(target: "pipeline", "failed to start pitch detection: {e}");
                return Err(e);
            }
        };

        info!(target: "pipeline", "capturing at {} Hz", worker.sample_rate());
        self.spawn_consumer(candidates_rx, Some(worker), stopped, n_pitches)?;
        Ok(n_pitches)
    }

    /// Starts detecting from frames the caller pushes into the returned sink,
    /// for sources other than the default microphone.
    pub fn start_with_sink(&mut self, sample_rate: u32) -> Result<FrameSink> {
        self.ensure_stopped()?;

        let stopped = Arc::new(AtomicBool::new(false));
        let (candidates_tx, candidates_rx) = crossbeam_channel::bounded(self.config.channel_capacity);
        let sink = build_sink(
            &self.config,
            (self.engine_factory)(),
            candidates_tx,
            self.shared.clone(),
            stopped.clone(),
            sample_rate,
        )?;
        self.spawn_consumer(candidates_rx, None, stopped, sink.n_pitches())?;
        Ok(sink)
    }

    /// Stops capture and the consumer, and returns the pitch trace: every
    /// distinct non-zero stabilized pitch seen during the run, in order.
    ///
    /// Microphone runs release the engine before this returns. A sink from
    /// [`start_with_sink`](Self::start_with_sink) releases it on its next
    /// `push` or when dropped. Calling it while stopped returns an empty trace.
    pub fn stop(&mut self) -> Vec<f32> {
        let Some(mut running) = self.running.take() else {
            return Vec::new();
        };
        running.stopped.store(true, Ordering::Release);

        // Dropping the stream releases the device and the accumulator buffers.
        if let Some(mut capture) = running.capture.take() {
            capture.stop();
        }
        let _ = running.shutdown_tx.send(());

        let trace = running.consumer.join().unwrap_or_else(|_| {
            error!(target: "pipeline", "consumer thread panicked");
            Vec::new()
        });
        self.shared.set_current_pitch(0.0);
        info!(target: "pipeline", "stopped with {} traced pitches", trace.len());
        trace
    }

    fn ensure_stopped(&self) -> Result<()> {
        if self.running.is_some() {
            return Err(TunerError::AlreadyRunning);
        }
        self.config.validate()
    }

    /// On failure `capture` is dropped, which stops it.
    fn spawn_consumer(
        &mut self,
        candidates: Receiver<f32>,
        capture: Option<CaptureWorker>,
        stopped: Arc<AtomicBool>,
        n_pitches: usize,
    ) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let shared = self.shared.clone();
        let updates = self.updates_tx.clone();
        self.shared.dropped_candidates.store(0, Ordering::Relaxed);

        let consumer = thread::Builder::new()
            .name("chromatic-consumer".into())
            .spawn(move || run_consumer(candidates, shutdown_rx, shared, updates))
            .map_err(|e| TunerError::AudioDevice(format!("failed to spawn consumer thread: {e}")))?;

        info!(target: "pipeline", "pitch detection running ({n_pitches} pitches per window)");
        self.running = Some(Running {
            capture,
            stopped,
            shutdown_tx,
            consumer,
            n_pitches,
        });
        Ok(())
    }
}

impl Drop for PitchPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_sink(
    config: &TunerConfig,
    engine: Box<dyn PitchEngine>,
    candidates: Sender<f32>,
    shared: Arc<Shared>,
    stopped: Arc<AtomicBool>,
    sample_rate: u32,
) -> Result<FrameSink> {
    let mut accumulator = AudioAccumulator::new(engine, config);
    accumulator.start(sample_rate)?;
    Ok(FrameSink {
        accumulator,
        candidates,
        shared,
        stopped,
    })
}

/// Consumer loop: stabilizes candidates until shutdown or until the audio
/// side goes away, then returns the pitch trace.
fn run_consumer(
    candidates: Receiver<f32>,
    shutdown: Receiver<()>,
    shared: Arc<Shared>,
    updates: Sender<TunerUpdate>,
) -> Vec<f32> {
    let mut mapper = NoteMapper::new(f32::from(shared.reference_hz.load(Ordering::Relaxed)));
    let mut stabilizer = PitchStabilizer::new();

    loop {
        crossbeam_channel::select! {
            recv(candidates) -> msg => match msg {
                Ok(candidate) => {
                    let reference_hz = f32::from(shared.reference_hz.load(Ordering::Relaxed));
                    if reference_hz != mapper.reference_hz() {
                        mapper.update_reference(reference_hz);
                        debug!(target: "pipeline", "reference changed to {reference_hz} Hz");
                    }

                    if let Some(stabilized) = stabilizer.push(candidate) {
                        shared.set_current_pitch(stabilized.pitch);
                        let update = TunerUpdate::from_stabilized(stabilized, &mapper);
                        debug!(
                            target: "pipeline",
                            "pitch {:.2} Hz -> {:?} {:+.2} cents",
                            update.pitch, update.reading.note_name, update.reading.cents
                        );
                        publish(&updates, update);
                    }
                }
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }

    stabilizer.clear();
    shared.set_current_pitch(0.0);
    publish(&updates, TunerUpdate::rest());
    stabilizer.take_trace()
}

/// Queues an update, dropping it when nobody is reading.
fn publish(updates: &Sender<TunerUpdate>, update: TunerUpdate) {
    if let Err(TrySendError::Full(_)) = updates.try_send(update) {
        debug!(target: "pipeline", "update queue full, update dropped");
    }
}

impl TunerUpdate {
    fn from_stabilized(stabilized: Stabilized, mapper: &NoteMapper) -> Self {
        let reading = mapper.map(stabilized.pitch);
        let feedback = if reading.is_silent() {
            FeedbackState::rest()
        } else {
            FeedbackState::from_cents(reading.cents)
        };
        Self {
            pitch: stabilized.pitch,
            is_new: stabilized.is_new,
            reading,
            feedback,
        }
    }

    /// The idle display: no pitch, no note, needle centred.
    pub fn rest() -> Self {
        Self {
            pitch: 0.0,
            is_new: true,
            reading: NoteReading::silent(),
            feedback: FeedbackState::rest(),
        }
    }
}
