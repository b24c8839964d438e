use std::env;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_LIVE_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_VOICE: &str = "Kore";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub const POLARIS_SYSTEM_INSTRUCTION: &str = "You are Polaris, an advanced AI navigator. Your interface is a deep blue orb. You are helpful, precise, and knowledgeable about the world. When using search tools, provide clear summaries.";

/// Names of the environment variables a key may come from, in lookup order.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone)]
pub struct PolarisConfig {
    pub api_base: String,
    pub live_url: String,
    pub live_model: String,
    pub tts_model: String,
    pub voice_name: String,
    pub system_instruction: String,
    pub request_timeout: Duration,
}

impl Default for PolarisConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            live_url: DEFAULT_LIVE_URL.to_string(),
            live_model: DEFAULT_LIVE_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            voice_name: DEFAULT_VOICE.to_string(),
            system_instruction: POLARIS_SYSTEM_INSTRUCTION.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl PolarisConfig {
    /// Builds a config from the process environment, loading a `.env` file
    /// first if one exists. Unset variables keep their defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let mut config = Self::default();

        if let Ok(base) = env::var("POLARIS_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Ok(model) = env::var("POLARIS_LIVE_MODEL") {
            config.live_model = model;
        }
        if let Ok(model) = env::var("POLARIS_TTS_MODEL") {
            config.tts_model = model;
        }
        if let Ok(voice) = env::var("POLARIS_VOICE") {
            config.voice_name = voice;
        }
        if let Ok(raw) = env::var("POLARIS_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => config.request_timeout = Duration::from_secs(secs),
                Err(_) => warn!(
                    "[Config] Ignoring POLARIS_TIMEOUT_SECS={:?}: not a whole number of seconds.",
                    raw
                ),
            }
        }

        debug!(
            "[Config] api_base={} live_model={} tts_model={} voice={}",
            config.api_base, config.live_model, config.tts_model, config.voice_name
        );
        config
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_live_url(mut self, url: impl Into<String>) -> Self {
        self.live_url = url.into();
        self
    }

    pub fn with_voice(mut self, voice_name: impl Into<String>) -> Self {
        self.voice_name = voice_name.into();
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
