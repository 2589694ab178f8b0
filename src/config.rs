use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, ValidatorError};

/// Service configuration loaded from `config.toml`. Every section has
/// defaults so a missing file still yields a runnable service; the
/// extraction API key is read from the environment only, never from here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub geocoding: GeocodingConfig,
    pub extraction: ExtractionConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

/// Tunables of the validation engine itself. The thresholds are design
/// constants calibrated against the scenario tests; see DESIGN.md.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub validity_threshold: f64,
    pub fuzzy_floor: f64,
    pub fuzzy_correction_threshold: f64,
    pub default_country: String,
    /// Optional replacement for the built-in gazetteer dataset.
    pub gazetteer_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3020 }
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "addr-validator/0.1 (shipping address validation)".to_string(),
            timeout_seconds: 8,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 20,
            api_key_env: "EXTRACTION_API_KEY".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validity_threshold: 0.6,
            fuzzy_floor: 0.5,
            fuzzy_correction_threshold: 0.8,
            default_country: "IT".to_string(),
            gazetteer_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            ValidatorError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
