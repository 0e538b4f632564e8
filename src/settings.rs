//! Configuration surface for streaming sessions.
//!
//! Plain values, no hidden globals: every knob the engine consults lives in
//! one of these structs, and each field carries a serde default so partial
//! configs deserialize cleanly.

use crate::error::StartError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStrategy {
    /// Re-run the speech engine's decoder in generation mode and diff the
    /// full-utterance output against what was already emitted.
    SpeechEngine,
    /// Call an external text-translation provider on committed text,
    /// raced against a timeout.
    Provider,
}

/// Energy-threshold VAD tuning.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct VadSettings {
    #[serde(default = "default_energy_threshold")]
    pub energy_threshold: f32,
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u64,
    #[serde(default = "default_min_speech_duration_ms")]
    pub min_speech_duration_ms: u64,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            energy_threshold: default_energy_threshold(),
            silence_duration_ms: default_silence_duration_ms(),
            min_speech_duration_ms: default_min_speech_duration_ms(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EngineSettings {
    #[serde(default = "default_target_language")]
    pub target_language: String,
    /// None means auto-detect from the engine output.
    #[serde(default)]
    pub source_language: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Sliding window length fed to each inference pass.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: f32,
    /// New-audio step between inference passes.
    #[serde(default = "default_step_ms")]
    pub step_ms: u32,
    #[serde(default = "default_true")]
    pub enable_vad: bool,
    #[serde(default)]
    pub enable_translation: bool,
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: u32,
    #[serde(default = "default_min_prefix_length")]
    pub min_prefix_length: usize,
    #[serde(default)]
    pub vad: VadSettings,
    #[serde(default = "default_translation_strategy")]
    pub translation_strategy: TranslationStrategy,
    #[serde(default = "default_translation_timeout_ms")]
    pub translation_timeout_ms: u64,
    /// Cap on the audio snapshot handed to inference. Constrained targets
    /// set this below `window_seconds` to bound per-pass latency.
    #[serde(default)]
    pub max_window_seconds: Option<f32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// When set, every inference window is also written to a WAV file in
    /// this directory.
    #[serde(default)]
    pub debug_dump_dir: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            target_language: default_target_language(),
            source_language: None,
            sample_rate: default_sample_rate(),
            window_seconds: default_window_seconds(),
            step_ms: default_step_ms(),
            enable_vad: true,
            enable_translation: false,
            stability_threshold: default_stability_threshold(),
            min_prefix_length: default_min_prefix_length(),
            vad: VadSettings::default(),
            translation_strategy: default_translation_strategy(),
            translation_timeout_ms: default_translation_timeout_ms(),
            max_window_seconds: None,
            max_tokens: default_max_tokens(),
            debug_dump_dir: None,
        }
    }
}

impl EngineSettings {
    /// Number of samples the ring buffer holds.
    pub fn window_samples(&self) -> usize {
        (self.window_seconds * self.sample_rate as f32) as usize
    }

    /// Number of new samples required between inference passes.
    pub fn step_samples(&self) -> usize {
        (self.step_ms as usize * self.sample_rate as usize) / 1000
    }

    pub fn validate(&self) -> Result<(), StartError> {
        if self.sample_rate == 0 {
            return Err(StartError::InvalidConfig("sample_rate must be > 0".into()));
        }
        if self.window_seconds <= 0.0 {
            return Err(StartError::InvalidConfig(
                "window_seconds must be > 0".into(),
            ));
        }
        if self.step_ms == 0 {
            return Err(StartError::InvalidConfig("step_ms must be > 0".into()));
        }
        if self.stability_threshold == 0 {
            return Err(StartError::InvalidConfig(
                "stability_threshold must be >= 1".into(),
            ));
        }
        if self.target_language.trim().is_empty() {
            return Err(StartError::InvalidConfig(
                "target_language must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the remote realtime transcription backend.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RemoteRealtimeSettings {
    pub endpoint: String,
    pub api_key: String,
    /// None lets the server auto-detect.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Disable to stream without server-side turn detection.
    #[serde(default = "default_true")]
    pub server_vad: bool,
    #[serde(default = "default_server_vad_threshold")]
    pub server_vad_threshold: f32,
    #[serde(default = "default_server_vad_silence_ms")]
    pub server_vad_silence_ms: u64,
}

impl RemoteRealtimeSettings {
    pub fn validate(&self) -> Result<(), StartError> {
        if self.endpoint.trim().is_empty() {
            return Err(StartError::InvalidConfig("endpoint must not be empty".into()));
        }
        if self.api_key.trim().is_empty() {
            return Err(StartError::MissingCredential(
                "realtime API key is empty".into(),
            ));
        }
        if self.api_key.len() < 20 {
            return Err(StartError::MissingCredential(
                "realtime API key seems too short".into(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(StartError::InvalidConfig("sample_rate must be > 0".into()));
        }
        Ok(())
    }
}

fn default_target_language() -> String {
    "en".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_window_seconds() -> f32 {
    10.0
}

fn default_step_ms() -> u32 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_stability_threshold() -> u32 {
    2
}

fn default_min_prefix_length() -> usize {
    3
}

fn default_translation_strategy() -> TranslationStrategy {
    TranslationStrategy::Provider
}

fn default_translation_timeout_ms() -> u64 {
    5000
}

fn default_max_tokens() -> usize {
    224
}

fn default_energy_threshold() -> f32 {
    0.01
}

fn default_silence_duration_ms() -> u64 {
    800
}

fn default_min_speech_duration_ms() -> u64 {
    300
}

fn default_server_vad_threshold() -> f32 {
    0.5
}

fn default_server_vad_silence_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = EngineSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.window_samples(), 160_000);
        assert_eq!(settings.step_samples(), 16_000);
    }

    #[test]
    fn test_partial_config_deserializes() {
        let settings: EngineSettings = serde_json::from_str(r#"{ "step_ms": 500 }"#).unwrap();
        assert_eq!(settings.step_ms, 500);
        assert_eq!(settings.sample_rate, 16000);
        assert!(settings.enable_vad);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut settings = EngineSettings::default();
        settings.step_ms = 0;
        assert!(matches!(
            settings.validate(),
            Err(StartError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_remote_settings_require_credential() {
        let settings = RemoteRealtimeSettings {
            endpoint: "wss://example.com/v1/realtime".to_string(),
            api_key: String::new(),
            language: None,
            sample_rate: 16000,
            server_vad: true,
            server_vad_threshold: default_server_vad_threshold(),
            server_vad_silence_ms: default_server_vad_silence_ms(),
        };
        assert!(matches!(
            settings.validate(),
            Err(StartError::MissingCredential(_))
        ));
    }
}
