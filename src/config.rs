//! Application configuration
//!
//! Each setting is resolved in priority order:
//! 1. Command-line flag
//! 2. Environment variable
//! 3. TOML config file (`--config`)
//! 4. Compiled default

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::capture::CaptureConfig;
use crate::gemini::GeminiConfig;

/// API key variables, checked in order
pub const API_KEY_VARS: [&str; 2] = ["API_KEY", "GEMINI_API_KEY"];
pub const MODEL_VAR: &str = "GEMINI_MODEL";
pub const CAMERA_VAR: &str = "UMABASE_CAMERA";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No API key: set API_KEY or GEMINI_API_KEY, or pass --api-key")]
    MissingApiKey,

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Settings given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub camera: Option<String>,
    pub config_file: Option<PathBuf>,
}

/// `[gemini]` table
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeminiSection {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
}

/// `[capture]` table
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CaptureSection {
    camera: Option<String>,
    input_format: Option<String>,
    ffmpeg: Option<PathBuf>,
    video_seek_secs: Option<f64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    gemini: GeminiSection,
    capture: CaptureSection,
}

/// Fully resolved configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub capture: CaptureConfig,
}

impl AppConfig {
    /// Resolve against the process environment
    pub fn load(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup
    pub fn resolve<F>(overrides: &ConfigOverrides, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match &overrides.config_file {
            Some(path) => read_config_file(path)?,
            None => ConfigFile::default(),
        };
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let mut config = AppConfig::default();

        let gemini = &mut config.gemini;
        if let Some(key) = overrides
            .api_key
            .clone()
            .or_else(|| API_KEY_VARS.iter().find_map(|k| env(*k)))
            .or(file.gemini.api_key)
        {
            gemini.api_key = key;
        }
        if let Some(model) = overrides
            .model
            .clone()
            .or_else(|| env(MODEL_VAR))
            .or(file.gemini.model)
        {
            gemini.model = model;
        }
        if let Some(url) = file.gemini.base_url {
            gemini.base_url = url;
        }
        if let Some(secs) = file.gemini.timeout_secs {
            gemini.timeout_secs = secs;
        }
        if let Some(n) = file.gemini.max_retries {
            gemini.max_retries = n.max(1);
        }
        if let Some(ms) = file.gemini.retry_delay_ms {
            gemini.retry_delay_ms = ms;
        }

        let capture = &mut config.capture;
        if let Some(device) = overrides
            .camera
            .clone()
            .or_else(|| env(CAMERA_VAR))
            .or(file.capture.camera)
        {
            capture.camera.device = device;
        }
        if let Some(format) = file.capture.input_format {
            capture.camera.input_format = format;
        }
        if let Some(ffmpeg) = file.capture.ffmpeg {
            capture.camera.ffmpeg = ffmpeg;
        }
        if let Some(secs) = file.capture.video_seek_secs {
            capture.video_seek_secs = secs.max(0.0);
        }
        if let Some(q) = file.capture.jpeg_quality {
            capture.jpeg_quality = q.clamp(1, 100);
        }

        Ok(config)
    }

    /// Fails when no API key was found anywhere
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        let key = self.gemini.api_key.trim();
        if key.is_empty() {
            Err(ConfigError::MissingApiKey)
        } else {
            Ok(key)
        }
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}
