use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub signaling: SignalingConfig,
    pub voice: VoiceConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct SignalingConfig {
    /// NATS server URL, e.g. "nats://localhost:4222"
    pub url: String,
    /// Subject prefix for room control messages
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct VoiceConfig {
    /// Mean spectrum magnitude (0-255 scale) above which the local
    /// participant counts as speaking
    #[serde(default = "default_voice_threshold")]
    pub threshold: f32,
    /// Sampling period in milliseconds
    #[serde(default = "default_voice_interval_ms")]
    pub interval_ms: u64,
}

fn default_subject_prefix() -> String {
    "room".to_string()
}

fn default_voice_threshold() -> f32 {
    25.0
}

fn default_voice_interval_ms() -> u64 {
    100
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_defaults_match_reference_values() {
        assert_eq!(default_voice_threshold(), 25.0);
        assert_eq!(default_voice_interval_ms(), 100);
    }
}
