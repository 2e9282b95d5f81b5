//! Voice-activity segmentation.
//!
//! Turns the continuous capture stream into discrete utterances: recording
//! starts on the first frame above the silence threshold and ends once
//! trailing silence exceeds the configured maximum, so sentences are not
//! fragmented by short pauses. Time is derived from sample counts, not the
//! wall clock, which keeps the state machine deterministic under test.

use std::sync::mpsc::Sender;
use std::time::Duration;

use tracing::{debug, info};

use crate::audio::{rms_energy, AudioCapture};
use crate::config::AudioConfig;
use crate::worker::RunFlag;

/// One voice-active interval, concatenated across frames.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Utterance {
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VadState {
    Idle,
    Voicing,
    TrailingSilence,
}

/// Energy-gated utterance segmenter.
pub struct VoiceSegmenter {
    sample_rate: u32,
    silence_threshold: f64,
    min_utterance: f64,
    max_silence: f64,

    state: VadState,
    buffer: Vec<i16>,
    trailing_silence: f64,
}

impl VoiceSegmenter {
    pub fn new(cfg: &AudioConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            silence_threshold: cfg.silence_threshold,
            min_utterance: cfg.min_utterance,
            max_silence: cfg.max_silence,
            state: VadState::Idle,
            buffer: Vec::new(),
            trailing_silence: 0.0,
        }
    }

    /// Adjust the threshold after calibration.
    pub fn set_silence_threshold(&mut self, threshold: f64) {
        self.silence_threshold = threshold;
    }

    /// Feed one capture frame; returns a complete utterance when the
    /// trailing-silence window closes one out.
    pub fn push_frame(&mut self, frame: &[i16]) -> Option<Utterance> {
        let frame_secs = frame.len() as f64 / self.sample_rate as f64;
        let voiced = rms_energy(frame) >= self.silence_threshold;

        match self.state {
            VadState::Idle => {
                if voiced {
                    debug!("Voice detected, starting recording");
                    self.state = VadState::Voicing;
                    self.buffer.extend_from_slice(frame);
                }
                None
            }
            VadState::Voicing => {
                self.buffer.extend_from_slice(frame);
                if !voiced {
                    self.state = VadState::TrailingSilence;
                    self.trailing_silence = frame_secs;
                }
                None
            }
            VadState::TrailingSilence => {
                if voiced {
                    // Short gap inside a sentence; keep recording.
                    self.state = VadState::Voicing;
                    self.trailing_silence = 0.0;
                    self.buffer.extend_from_slice(frame);
                    return None;
                }

                self.trailing_silence += frame_secs;
                if self.trailing_silence < self.max_silence {
                    self.buffer.extend_from_slice(frame);
                    return None;
                }

                self.finish_segment()
            }
        }
    }

    fn finish_segment(&mut self) -> Option<Utterance> {
        let samples = std::mem::take(&mut self.buffer);
        self.state = VadState::Idle;
        self.trailing_silence = 0.0;

        let duration = samples.len() as f64 / self.sample_rate as f64;
        if duration >= self.min_utterance {
            debug!("Utterance complete, duration {:.2}s", duration);
            Some(Utterance {
                samples,
                sample_rate: self.sample_rate,
            })
        } else {
            debug!("Utterance too short ({:.2}s), discarded", duration);
            None
        }
    }
}

/// Capture worker: drains the device, segments, and queues utterances for
/// the recognition worker. Exits when the run flag clears.
pub fn run_capture_loop(
    capture: AudioCapture,
    cfg: &AudioConfig,
    utterances: Sender<Utterance>,
    run: RunFlag,
) {
    let mut segmenter = VoiceSegmenter::new(cfg);
    info!(
        "VAD running (threshold {}, min {:.1}s, max silence {:.1}s)",
        cfg.silence_threshold, cfg.min_utterance, cfg.max_silence
    );

    while run.is_set() {
        let Some(frame) = capture.recv_timeout(Duration::from_millis(200)) else {
            continue;
        };
        if let Some(utterance) = segmenter.push_frame(&frame) {
            if utterances.send(utterance).is_err() {
                break;
            }
        }
    }
    info!("Audio capture loop stopped");
}
