//! Voice-activity detection for the local audio track.

pub mod monitor;

pub use monitor::{mean_magnitude, SpectrumFrame, VoiceActivityConfig, VoiceActivityMonitor};
