//! Audio capture module using cpal

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::AudioConfig;
use crate::error::{HandError, HandResult};

/// Receiving end of a running capture stream.
///
/// The cpal stream itself is !Send, so it is leaked to keep it alive for
/// the life of the process while this handle crosses into the VAD worker.
pub struct AudioCapture {
    rx: Receiver<Vec<i16>>,
}

impl AudioCapture {
    /// Open the input device and start delivering fixed-size i16 frames.
    ///
    /// Device-open failure is fatal to the audio worker; stream status
    /// anomalies after that are logged and skipped.
    pub fn start(cfg: &AudioConfig, device_index: Option<usize>) -> HandResult<Self> {
        let host = cpal::default_host();

        info!("Available audio input devices:");
        for (i, device) in host
            .input_devices()
            .map_err(|e| HandError::DeviceUnavailable(e.to_string()))?
            .enumerate()
        {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let marker = if device_index == Some(i) { "*" } else { " " };
            info!("  {} [{}] {}", marker, i, name);
        }

        let device = if let Some(idx) = device_index {
            host.input_devices()
                .map_err(|e| HandError::DeviceUnavailable(e.to_string()))?
                .nth(idx)
                .context("Device index out of range")
                .map_err(|e| HandError::DeviceUnavailable(e.to_string()))?
        } else {
            host.default_input_device()
                .ok_or_else(|| HandError::DeviceUnavailable("No default input device".into()))?
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", device_name);

        let chunk_frames = (cfg.sample_rate as f64 * cfg.chunk_duration) as u32;
        let config = cpal::StreamConfig {
            channels: cfg.channels,
            sample_rate: cpal::SampleRate(cfg.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(chunk_frames),
        };

        let (tx, rx): (Sender<Vec<i16>>, Receiver<Vec<i16>>) = mpsc::channel();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if tx.send(data.to_vec()).is_err() {
                        warn!("Audio receiver dropped");
                    }
                },
                |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| HandError::DeviceUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| HandError::DeviceUnavailable(e.to_string()))?;

        // Keep the stream alive for the process lifetime; capture stops
        // when the process does.
        std::mem::forget(stream);

        Ok(Self { rx })
    }

    /// Blocking receive with timeout so a worker can check its run flag.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<i16>> {
        self.rx.recv_timeout(timeout).ok()
    }
}

/// RMS energy of one frame, the VAD measure.
pub fn rms_energy(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: i64 = samples.iter().map(|&s| (s as i64).pow(2)).sum();
    (sum as f64 / samples.len() as f64).sqrt()
}

/// Silence-threshold suggestions derived from ambient RMS statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSuggestions {
    pub quiet: f64,
    pub normal: f64,
    pub noisy: f64,
}

impl ThresholdSuggestions {
    /// Derive the three presets from observed frame energies.
    pub fn from_energies(energies: &[f64]) -> Option<Self> {
        if energies.is_empty() {
            return None;
        }
        let min = energies.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = energies.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let avg = energies.iter().sum::<f64>() / energies.len() as f64;
        Some(Self {
            quiet: min * 1.5,
            normal: avg + (max - avg) * 0.3,
            noisy: max * 0.8,
        })
    }
}

/// Sample ambient audio for `duration` and suggest silence thresholds.
///
/// Offline convenience for first-time setup; not part of the steady-state
/// pipeline.
pub fn calibrate_silence_threshold(
    capture: &AudioCapture,
    duration: Duration,
) -> HandResult<ThresholdSuggestions> {
    info!("Sampling ambient audio for {:?}...", duration);
    let mut energies = Vec::new();
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if let Some(frame) = capture.recv_timeout(Duration::from_millis(200)) {
            energies.push(rms_energy(&frame));
        }
    }

    ThresholdSuggestions::from_energies(&energies)
        .ok_or_else(|| HandError::DeviceUnavailable("No audio data collected".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_empty_is_zero() {
        assert_eq!(rms_energy(&[]), 0.0);
    }

    #[test]
    fn test_rms_of_constant_signal() {
        let samples = vec![100i16; 1600];
        assert!((rms_energy(&samples) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rms_monotone_in_amplitude() {
        let soft: Vec<i16> = (0..256).map(|i| if i % 2 == 0 { 50 } else { -50 }).collect();
        let loud: Vec<i16> = (0..256).map(|i| if i % 2 == 0 { 500 } else { -500 }).collect();
        assert!(rms_energy(&loud) > rms_energy(&soft));
    }

    #[test]
    fn test_threshold_suggestions() {
        let energies = vec![100.0, 200.0, 300.0];
        let s = ThresholdSuggestions::from_energies(&energies).unwrap();
        assert!((s.quiet - 150.0).abs() < 1e-9);
        assert!((s.normal - (200.0 + 100.0 * 0.3)).abs() < 1e-9);
        assert!((s.noisy - 240.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_suggestions_empty() {
        assert!(ThresholdSuggestions::from_energies(&[]).is_none());
    }
}
