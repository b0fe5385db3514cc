//! Studio configuration
//!
//! Defaults, optionally overlaid from a JSON file and `STUDIO_*`
//! environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::GenerationSettings;
use crate::compositor::{parse_hex_color, CanvasSize, Compositor, MAX_CANVAS_SIDE};
use crate::error::{Result, StudioError};
use crate::neural::stable_diffusion::{DEFAULT_SD_ENDPOINT, DEFAULT_SD_TIMEOUT_MS};
use crate::neural::{AspectRatio, ModelTier};
use crate::state::PROFILE_FILE;

pub const ENV_CANVAS_SIZE: &str = "STUDIO_CANVAS_SIZE";
pub const ENV_BACKGROUND: &str = "STUDIO_BACKGROUND";
pub const ENV_MODEL_TIER: &str = "STUDIO_MODEL_TIER";
pub const ENV_SD_ENDPOINT: &str = "STUDIO_SD_ENDPOINT";
pub const ENV_SD_TIMEOUT_MS: &str = "STUDIO_SD_TIMEOUT_MS";
pub const ENV_PROFILE_PATH: &str = "STUDIO_PROFILE_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// `#rrggbb`
    pub background: String,
    pub model_tier: ModelTier,
    pub aspect_ratio: AspectRatio,
    pub custom_endpoint: String,
    pub request_timeout_ms: u64,
    pub profile_path: PathBuf,
}

impl Default for StudioConfig {
    fn default() -> Self {
        let canvas = CanvasSize::default();
        Self {
            canvas_width: canvas.width,
            canvas_height: canvas.height,
            background: "#0f172a".to_string(),
            model_tier: ModelTier::Fast,
            aspect_ratio: AspectRatio::Square,
            custom_endpoint: DEFAULT_SD_ENDPOINT.to_string(),
            request_timeout_ms: DEFAULT_SD_TIMEOUT_MS,
            profile_path: PathBuf::from(PROFILE_FILE),
        }
    }
}

impl StudioConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Read a JSON config file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: StudioConfig = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "loaded studio config");
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(size) = env_value(ENV_CANVAS_SIZE) {
            let size: CanvasSize = size.parse()?;
            self.canvas_width = size.width;
            self.canvas_height = size.height;
        }
        if let Some(background) = env_value(ENV_BACKGROUND) {
            self.background = background;
        }
        if let Some(tier) = env_value(ENV_MODEL_TIER) {
            self.model_tier = tier.parse()?;
        }
        if let Some(endpoint) = env_value(ENV_SD_ENDPOINT) {
            self.custom_endpoint = endpoint;
        }
        if let Some(timeout) = env_value(ENV_SD_TIMEOUT_MS) {
            match timeout.parse() {
                Ok(ms) => self.request_timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "ignoring malformed {}", ENV_SD_TIMEOUT_MS),
            }
        }
        if let Some(path) = env_value(ENV_PROFILE_PATH) {
            self.profile_path = PathBuf::from(path);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        CanvasSize::validated(self.canvas_width, self.canvas_height).map_err(|_| {
            StudioError::Config {
                reason: format!(
                    "canvas sides must be 1..={}, got {}x{}",
                    MAX_CANVAS_SIDE, self.canvas_width, self.canvas_height
                ),
            }
        })?;
        parse_hex_color(&self.background).map_err(|_| StudioError::Config {
            reason: format!("background must be #rrggbb, got {:?}", self.background),
        })?;
        Ok(())
    }

    pub fn canvas_size(&self) -> CanvasSize {
        CanvasSize {
            width: self.canvas_width,
            height: self.canvas_height,
        }
    }

    pub fn compositor(&self) -> Result<Compositor> {
        let background = parse_hex_color(&self.background)?;
        Ok(Compositor::new(self.canvas_size(), background))
    }

    /// Generation settings seeded from this config
    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            model_tier: self.model_tier,
            aspect_ratio: self.aspect_ratio,
            negative_prompt: String::new(),
            custom_endpoint: Some(self.custom_endpoint.clone()).filter(|e| !e.trim().is_empty()),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
