use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing;

const DEFAULT_SERVER_URL: &str = "ws://localhost:8000/ws/audio/";
const DEFAULT_CHUNK_MS: u64 = 500;
const DEFAULT_SILENCE_THRESHOLD: f64 = 0.003;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_url: String,
    pub device: Option<String>,
    pub chunk_ms: u64,
    pub silence_threshold: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server_url: DEFAULT_SERVER_URL.to_string(),
            device: None,
            chunk_ms: DEFAULT_CHUNK_MS,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD as f32,
        }
    }
}

impl Settings {
    /// Load settings from a specific config file path (for tests)
    pub fn from_path(config_path: impl AsRef<Path>) -> Result<Self, String> {
        let mut builder = Config::builder();

        builder = builder
            .set_default("server_url", DEFAULT_SERVER_URL).unwrap()
            .set_default("chunk_ms", DEFAULT_CHUNK_MS).unwrap()
            .set_default("silence_threshold", DEFAULT_SILENCE_THRESHOLD).unwrap();

        builder = builder.add_source(File::from(config_path.as_ref()).required(true));

        // Environment variables override the file's settings.
        builder = builder.add_source(
            Environment::with_prefix("VOXSTREAM")
                .separator("__")
                .list_separator(" "),
        );

        let config = builder
            .build()
            .map_err(|e| format!("Failed to build config: {}", e))?;

        let mut settings: Settings = config
            .try_deserialize()
            .map_err(|e| format!("Failed to deserialize settings: {}", e))?;

        settings.validate().map_err(|e| e.to_string())?;

        Ok(settings)
    }

    pub fn new() -> Result<Self, String> {
        let mut builder = Config::builder();

        builder = builder
            .set_default("server_url", DEFAULT_SERVER_URL).unwrap()
            .set_default("chunk_ms", DEFAULT_CHUNK_MS).unwrap()
            .set_default("silence_threshold", DEFAULT_SILENCE_THRESHOLD).unwrap();

        let config_path = Path::new("config/default.toml");
        if config_path.exists() {
            tracing::info!("Loading configuration from: {}", config_path.display());
            builder = builder.add_source(File::from(config_path).required(true));
        } else {
            tracing::warn!("No configuration file at 'config/default.toml'. Using defaults and environment variables.");
        }

        builder = builder.add_source(
            Environment::with_prefix("VOXSTREAM")
                .separator("__")
                .list_separator(" "),
        );

        let config = builder
            .build()
            .map_err(|e| format!("Failed to build config: {}", e))?;

        let mut settings: Settings = config
            .try_deserialize()
            .map_err(|e| format!("Failed to deserialize settings: {}", e))?;

        settings.validate().map_err(|e| e.to_string())?;

        Ok(settings)
    }

    pub fn validate(&mut self) -> Result<(), String> {
        let mut errors = Vec::new();

        // The server URL must be a WebSocket URL; a typo here should fail
        // at startup, not inside connect.
        match url::Url::parse(&self.server_url) {
            Ok(parsed) => {
                if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                    errors.push(format!(
                        "server_url must use ws:// or wss://, got '{}'",
                        parsed.scheme()
                    ));
                }
            }
            Err(e) => errors.push(format!("server_url is not a valid URL: {}", e)),
        }

        if !(100..=5_000).contains(&self.chunk_ms) {
            tracing::warn!(
                "chunk_ms {} outside 100..=5000. Defaulting to {}.",
                self.chunk_ms,
                DEFAULT_CHUNK_MS
            );
            self.chunk_ms = DEFAULT_CHUNK_MS;
        }

        if !(0.0..1.0).contains(&self.silence_threshold) {
            tracing::warn!(
                "Invalid silence_threshold {}. Defaulting to {}.",
                self.silence_threshold,
                DEFAULT_SILENCE_THRESHOLD
            );
            self.silence_threshold = DEFAULT_SILENCE_THRESHOLD as f32;
        }

        if !errors.is_empty() {
            return Err(format!("Critical config validation errors: {:?}", errors));
        }

        Ok(())
    }

    /// Chunk size in samples at the 16 kHz target rate.
    pub fn chunk_size_samples(&self) -> usize {
        (voxstream_audio::TARGET_SAMPLE_RATE_HZ as u64 * self.chunk_ms / 1000) as usize
    }
}

pub mod runtime;
