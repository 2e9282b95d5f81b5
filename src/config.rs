use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{HandError, HandResult};

/// Audio capture and VAD settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Capture block duration in seconds (one AudioFrame).
    pub chunk_duration: f64,
    /// RMS below this counts as silence.
    pub silence_threshold: f64,
    /// Utterances shorter than this are discarded (seconds).
    pub min_utterance: f64,
    /// Silence longer than this ends an utterance (seconds).
    pub max_silence: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            chunk_duration: 0.1,
            silence_threshold: 500.0,
            min_utterance: 0.5,
            max_silence: 2.0,
        }
    }
}

/// Camera / hand-tracking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub camera_id: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// "Left" or "Right"
    pub hand_type: String,
    pub selfie: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            width: 640,
            height: 480,
            fps: 30,
            hand_type: "Left".to_string(),
            selfie: false,
        }
    }
}

/// LLM classifier settings (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Worker idle poll interval in seconds.
    pub poll_interval: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            poll_interval: 1.0,
        }
    }
}

/// Actuator gains and torque limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Normal operating current (torque) limit.
    pub current_limit: f64,
    /// Reduced limit while free-drag mode is active.
    pub free_drag_current_limit: f64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            kp: 100.0,
            ki: 0.0,
            kd: 150.0,
            current_limit: 150.0,
            free_drag_current_limit: 30.0,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub audio: AudioConfig,
    pub tracker: TrackerConfig,
    pub resolver: ResolverConfig,
    pub actuator: ActuatorConfig,

    /// Catalog category (subdirectory of the gesture library).
    pub category: String,
    /// Gesture selected at startup.
    pub initial_gesture: String,
    /// Root directory of the gesture library; empty = default data dir.
    pub library_dir: String,

    /// Commands beginning with this switch gestures directly.
    pub switch_prefix: String,
    /// Typed keywords that shut the pipeline down.
    pub exit_keywords: Vec<String>,

    pub log_level: String,
}

impl Config {
    pub fn with_defaults() -> Self {
        Self {
            category: "leap".to_string(),
            initial_gesture: "box".to_string(),
            library_dir: String::new(),
            switch_prefix: "/".to_string(),
            exit_keywords: vec!["quit".to_string(), "exit".to_string()],
            log_level: "INFO".to_string(),
            ..Default::default()
        }
    }

    /// Load config from file or create default
    pub fn load() -> Result<Self> {
        let config_path = config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            match serde_json::from_str::<Config>(&content) {
                Ok(config) => {
                    config.validate()?;
                    Ok(config)
                }
                Err(e) => {
                    // Graceful degradation: log warning and use defaults
                    tracing::warn!("Config file corrupted or invalid, using defaults: {}", e);
                    let backup_path = config_path.with_extension("json.corrupt");
                    let _ = std::fs::rename(&config_path, &backup_path);
                    Ok(Self::with_defaults())
                }
            }
        } else {
            Ok(Self::with_defaults())
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Validate once at construction; later code assumes these hold.
    pub fn validate(&self) -> HandResult<()> {
        if self.audio.sample_rate == 0 {
            return Err(HandError::Config("audio.sample_rate must be > 0".into()));
        }
        if self.audio.channels == 0 {
            return Err(HandError::Config("audio.channels must be > 0".into()));
        }
        if self.audio.chunk_duration <= 0.0 {
            return Err(HandError::Config("audio.chunk_duration must be > 0".into()));
        }
        if self.audio.min_utterance < 0.0 || self.audio.max_silence <= 0.0 {
            return Err(HandError::Config("invalid VAD durations".into()));
        }
        if self.resolver.poll_interval <= 0.0 {
            return Err(HandError::Config("resolver.poll_interval must be > 0".into()));
        }
        if self.actuator.free_drag_current_limit > self.actuator.current_limit {
            return Err(HandError::Config(
                "free_drag_current_limit exceeds current_limit".into(),
            ));
        }
        if self.switch_prefix.is_empty() {
            return Err(HandError::Config("switch_prefix must not be empty".into()));
        }
        Ok(())
    }

    /// Resolved gesture-library root directory.
    pub fn library_root(&self) -> PathBuf {
        if !self.library_dir.is_empty() {
            return PathBuf::from(&self.library_dir);
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("handpilot/library")
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("handpilot")
        .join("config.json")
}
