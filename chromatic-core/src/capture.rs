//! # Audio Capture Module
//!
//! This module handles real-time microphone capture using CPAL (Cross-Platform Audio Library).
//! It owns the input stream on a dedicated thread and hands fixed-size mono chunks to a
//! per-chunk handler running on the device's audio callback.
//!
//! ## Features
//! - Default input device selection
//! - Float input format with the fewest channels, closest to 44.1 kHz
//! - Re-chunking of device callbacks into fixed-size mono chunks without allocation
//! - Device refusal reported as `PermissionDenied`

use crate::error::{Result, TunerError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::Sender;
use log::{error, info, warn};
use std::thread::{self, JoinHandle};

/// Sample rate requested from the device when it offers a choice.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Handle to the capture thread. Dropping it stops capture.
#[derive(Debug)]
pub struct CaptureWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl CaptureWorker {
    /// Rate the device was opened at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stops the stream, releases the device and joins the capture thread.
    ///
    /// The chunk handler is dropped on the capture thread before this returns.
    pub fn stop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.shutdown_tx.send(());
            if handle.join().is_err() {
                error!(target: "capture", "capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Opens the default input device and starts streaming on a capture thread.
///
/// `prepare` runs on the capture thread once the sample rate is known; it
/// returns the handler invoked with every `chunk_size`-sample mono chunk and
/// a value passed back to the caller. If `prepare` fails, the device is
/// released and its error returned.
pub fn start_capture<P, H, T>(chunk_size: usize, prepare: P) -> Result<(CaptureWorker, T)>
where
    P: FnOnce(u32) -> Result<(H, T)> + Send + 'static,
    H: FnMut(&[f32]) + Send + 'static,
    T: Send + 'static,
{
    if chunk_size == 0 {
        return Err(TunerError::AudioDevice("chunk size must be positive".into()));
    }

    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(u32, T)>>(1);
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

    let thread_handle = thread::Builder::new()
        .name("chromatic-capture".into())
        .spawn(move || {
            let stream = match open_stream(chunk_size, prepare) {
                Ok((stream, sample_rate, value)) => {
                    let _ = ready_tx.send(Ok((sample_rate, value)));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            // Runs until a shutdown signal arrives or the worker is dropped.
            let _ = shutdown_rx.recv();

            info!(target: "capture", "stopping input stream");
            if let Err(e) = stream.pause() {
                warn!(target: "capture", "error pausing stream: {e}");
            }
            drop(stream);
        })
        .map_err(|e| TunerError::AudioDevice(format!("failed to spawn capture thread: {e}")))?;

    let mut worker = CaptureWorker {
        shutdown_tx,
        thread_handle: Some(thread_handle),
        sample_rate: 0,
    };

    match ready_rx.recv() {
        Ok(Ok((sample_rate, value))) => {
            worker.sample_rate = sample_rate;
            Ok((worker, value))
        }
        Ok(Err(e)) => {
            worker.stop();
            Err(e)
        }
        Err(_) => {
            worker.stop();
            Err(TunerError::AudioDevice("capture thread exited during startup".into()))
        }
    }
}

fn open_stream<P, H, T>(chunk_size: usize, prepare: P) -> Result<(cpal::Stream, u32, T)>
where
    P: FnOnce(u32) -> Result<(H, T)>,
    H: FnMut(&[f32]) + Send + 'static,
{
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(TunerError::PermissionDenied)?;

    info!(
        target: "capture",
        "using audio input device: {}",
        device.name().unwrap_or_else(|_| "<unnamed>".into())
    );

    let configs = device
        .supported_input_configs()
        .map_err(|e| match e {
            cpal::SupportedStreamConfigsError::DeviceNotAvailable => TunerError::PermissionDenied,
            other => TunerError::AudioDevice(other.to_string()),
        })?
        .collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| TunerError::AudioDevice("no suitable f32 input format found".into()))?;

    let rate = TARGET_SAMPLE_RATE.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config: cpal::StreamConfig = supported_config
        .with_sample_rate(cpal::SampleRate(rate))
        .into();
    let channels = usize::from(config.channels.max(1));
    info!(target: "capture", "selected {rate} Hz, {channels} channel(s)");

    let (mut on_chunk, value) = prepare(rate)?;

    // Allocated once; the callback only copies into it.
    let mut chunk = vec![0.0_f32; chunk_size];
    let mut filled = 0;

    let err_fn = |err| error!(target: "capture", "an error occurred on the audio stream: {err}");

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // First channel only.
                for frame in data.chunks(channels) {
                    chunk[filled] = frame[0];
                    filled += 1;
                    if filled == chunk_size {
                        on_chunk(&chunk);
                        filled = 0;
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => TunerError::PermissionDenied,
            other => TunerError::AudioDevice(other.to_string()),
        })?;

    stream.play().map_err(|e| match e {
        cpal::PlayStreamError::DeviceNotAvailable => TunerError::PermissionDenied,
        other => TunerError::AudioDevice(other.to_string()),
    })?;

    Ok((stream, rate, value))
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Only 32-bit float formats are considered. Fewer channels win first, then
/// the range closest to `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let rate_distance = if (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_rate) {
                0
            } else {
                let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
                let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
                min_diff.min(max_diff)
            };
            (c.channels(), rate_distance)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleFormat, SampleRate, SupportedBufferSize};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn prefers_mono_float_covering_the_target() {
        let configs = vec![
            range(2, 44100, 48000, SampleFormat::F32),
            range(1, 8000, 16000, SampleFormat::F32),
            range(1, 44100, 96000, SampleFormat::F32),
            range(1, 44100, 48000, SampleFormat::I16),
        ];
        let best = find_supported_config(configs, 44100).unwrap();
        assert_eq!(best.channels(), 1);
        assert_eq!(best.max_sample_rate(), SampleRate(96000));
    }

    #[test]
    fn falls_back_to_closest_rate() {
        let configs = vec![
            range(1, 8000, 16000, SampleFormat::F32),
            range(1, 48000, 48000, SampleFormat::F32),
        ];
        let best = find_supported_config(configs, 44100).unwrap();
        assert_eq!(best.min_sample_rate(), SampleRate(48000));
    }

    #[test]
    fn integer_only_devices_are_rejected() {
        let configs = vec![range(1, 44100, 48000, SampleFormat::I16)];
        assert!(find_supported_config(configs, 44100).is_none());
    }

    #[test]
    fn zero_chunk_size_is_rejected_before_touching_the_device() {
        let result = start_capture(0, |_| Ok((|_: &[f32]| {}, ())));
        assert!(matches!(result, Err(TunerError::AudioDevice(_))));
    }
}
