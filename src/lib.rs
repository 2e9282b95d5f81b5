//! Handpilot Library
//!
//! Core modules for the Handpilot hand-teleoperation pipeline: spoken or
//! typed intent, visual hand tracking, and LLM-assisted gesture lookup
//! fused into one actuator command stream.

pub mod actuator;
pub mod asr;
pub mod audio;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fusion;
pub mod input;
pub mod joints;
pub mod mailbox;
pub mod pipeline;
pub mod resolver;
pub mod tracker;
pub mod vad;
pub mod worker;
