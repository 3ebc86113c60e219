//! # Chromatic Tuner - GUI
//!
//! Desktop front end for `chromatic-core`. It starts and stops the detection
//! pipeline, lets the user pick the reference frequency and shows the latest
//! note, cents deviation and needle.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme
//! - **Pipeline Threads**: capture and stabilization, owned by `PitchPipeline`
//! - **Communication**: per-cycle `TunerUpdate`s over a crossbeam channel
//! - **Updates**: 60 FPS polling via the subscription system

mod ui;

use anyhow::Context;
use chromatic_core::{Algorithm, PitchPipeline, TunerConfig, TunerError, TunerUpdate};
use crossbeam_channel::Receiver;
use iced::{Element, Subscription, Theme};
use log::{error, info, warn};
use ui::main_display::create_main_view;

/// Where the reference frequency and detector settings persist.
const CONFIG_PATH: &str = "tuner_config.json";

pub fn main() -> anyhow::Result<()> {
    env_logger::init();
    info!(target: "main", "starting chromatic tuner");

    iced::application("Chromatic Tuner", TunerApp::update, TunerApp::view)
        .subscription(TunerApp::subscription)
        .theme(TunerApp::theme)
        .run()
        .context("running the tuner window")?;

    info!(target: "main", "tuner closed");
    Ok(())
}

#[derive(Debug, Clone)]
pub enum Message {
    ToggleDetection,
    ReferenceChanged(u16),
    ResetReference,
    AlgorithmSelected(Algorithm),
    /// Timer tick for polling pipeline updates
    Tick,
}

/// UI-specific data needed for rendering the interface.
#[derive(Debug, Clone)]
pub struct AppDisplayData {
    pub running: bool,
    pub last_update: TunerUpdate,
    pub current_pitch: f32,
    pub reference_hz: u16,
    pub algorithm: Algorithm,
    /// Distinct pitches of the last finished run
    pub last_trace: Vec<f32>,
    /// Error or notice shown under the readout
    pub status: Option<String>,
}

struct TunerApp {
    pipeline: PitchPipeline,
    updates: Receiver<TunerUpdate>,
    display_data: AppDisplayData,
}

impl Default for TunerApp {
    fn default() -> Self {
        let config = TunerConfig::load_or_default(CONFIG_PATH);
        info!(
            target: "main",
            "reference A4 = {} Hz, algorithm {}",
            config.reference_hz, config.algorithm
        );

        let display_data = AppDisplayData {
            running: false,
            last_update: TunerUpdate::rest(),
            current_pitch: 0.0,
            reference_hz: config.reference_hz,
            algorithm: config.algorithm,
            last_trace: Vec::new(),
            status: None,
        };
        let pipeline = PitchPipeline::new(config);
        let updates = pipeline.updates();
        Self {
            pipeline,
            updates,
            display_data,
        }
    }
}

impl TunerApp {
    fn update(&mut self, message: Message) {
        match message {
            Message::ToggleDetection => {
                if self.pipeline.is_running() {
                    self.stop_detection();
                } else {
                    self.start_detection();
                }
            }
            Message::ReferenceChanged(reference_hz) => {
                self.apply_reference(reference_hz);
            }
            Message::ResetReference => {
                let mut config = self.pipeline.config().clone();
                config.reset_reference();
                self.apply_reference(config.reference_hz);
            }
            Message::AlgorithmSelected(algorithm) => {
                if self.pipeline.is_running() || algorithm == self.display_data.algorithm {
                    return;
                }
                let config = TunerConfig {
                    algorithm,
                    ..self.pipeline.config().clone()
                };
                self.pipeline = PitchPipeline::new(config);
                self.updates = self.pipeline.updates();
                self.display_data.algorithm = algorithm;
                self.persist_config();
            }
            Message::Tick => {
                // Only the latest update matters for the display.
                if let Some(update) = self.updates.try_iter().last() {
                    self.display_data.last_update = update;
                }
                self.display_data.current_pitch = self.pipeline.current_pitch();
            }
        }
    }

    fn start_detection(&mut self) {
        match self.pipeline.start() {
            Ok(n_pitches) => {
                info!(target: "main", "detection started ({n_pitches} pitches per window)");
                self.display_data.running = true;
                self.display_data.status = None;
            }
            Err(TunerError::PermissionDenied) => {
                error!(target: "main", "microphone access denied");
                self.display_data.status =
                    Some("Microphone access denied. Check your input device.".to_string());
            }
            Err(e) => {
                error!(target: "main", "could not start detection: {e}");
                self.display_data.status = Some(format!("Could not start: {e}"));
            }
        }
    }

    fn stop_detection(&mut self) {
        let trace = self.pipeline.stop();
        info!(target: "main", "detection stopped, {} distinct pitches", trace.len());
        let dropped = self.pipeline.dropped_candidates();
        if dropped > 0 {
            warn!(target: "main", "{dropped} pitch candidates dropped during the run");
        }
        self.display_data.running = false;
        self.display_data.last_update = TunerUpdate::rest();
        self.display_data.current_pitch = 0.0;
        self.display_data.last_trace = trace;
    }

    fn apply_reference(&mut self, reference_hz: u16) {
        if let Err(e) = self.pipeline.set_reference(reference_hz) {
            warn!(target: "main", "{e}");
            return;
        }
        self.display_data.reference_hz = reference_hz;
        self.persist_config();
    }

    fn persist_config(&self) {
        if let Err(e) = save_config(self.pipeline.config()) {
            warn!(target: "main", "{e:#}");
        }
    }

    fn view(&self) -> Element<'_, Message> {
        create_main_view(&self.display_data)
    }

    /// Fires every 16ms (60 FPS) to poll the pipeline.
    fn subscription(&self) -> Subscription<Message> {
        iced::time::every(std::time::Duration::from_millis(16)).map(|_| Message::Tick)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn save_config(config: &TunerConfig) -> anyhow::Result<()> {
    config
        .save(CONFIG_PATH)
        .with_context(|| format!("saving settings to {CONFIG_PATH}"))
}
