use crate::errors::{GeminiError, GeminiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const APP_NAME: &str = "tic-simulator";

/// Gemini connection settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model_name: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<i32>,
    /// Cap on reply length, in tokens
    pub max_output_tokens: Option<i32>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model_name: "gemini-1.5-flash".to_string(),
            temperature: Some(0.9),
            top_p: None,
            top_k: None,
            max_output_tokens: None,
        }
    }
}

/// Conversation pacing and prompt settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Fixed delay before every model call, in milliseconds
    pub pacing_ms: u64,
    /// Automatic retries after a rate-limit response. Zero means the user resubmits.
    pub rate_limit_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Directory scanned for reference documents
    pub corpus_dir: Option<PathBuf>,
    /// Maximum corpus characters embedded in the seed instruction
    pub corpus_char_budget: usize,
    /// Output language directive given to the model
    pub language: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 2000,
            rate_limit_retries: 0,
            retry_base_delay_ms: 10_000,
            corpus_dir: Some(PathBuf::from(".")),
            corpus_char_budget: 25_000,
            language: "Traditional Chinese".to_string(),
        }
    }
}

/// Remote session log (spreadsheet) settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteLogConfig {
    pub enabled: bool,
    pub spreadsheet_id: Option<String>,
    pub worksheet: String,
    pub service_account_key_path: Option<PathBuf>,
    /// Timestamps are written in this fixed offset from UTC
    pub utc_offset_hours: i32,
    /// Header rows skipped during key lookup
    pub header_rows: usize,
}

impl Default for RemoteLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            spreadsheet_id: None,
            worksheet: "Simulator".to_string(),
            service_account_key_path: None,
            utc_offset_hours: 8,
            header_rows: 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CliConfig {
    pub log_level: Option<String>,
    /// Optional pass code asked for before login
    pub access_code: Option<String>,
}

/// All configuration sections, stored in one TOML file
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct UnifiedConfig {
    pub gemini: GeminiConfig,
    pub simulator: SimulatorConfig,
    pub remote_log: RemoteLogConfig,
    pub cli: CliConfig,
}

impl UnifiedConfig {
    /// Loads the default config file and applies environment overrides.
    /// Never fails: a missing or broken file yields defaults.
    pub fn load() -> Self {
        let mut config = match get_default_config_file() {
            Ok(path) => match Self::load_from_file(&path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "No config directory, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    /// Loads configuration from a file if it exists, otherwise returns the default config
    pub fn load_from_file(path: &Path) -> GeminiResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file absent, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            GeminiError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content)
            .map_err(|e| GeminiError::ConfigError(format!("Failed to parse config file: {}", e)))
    }

    /// Saves configuration to a file
    pub fn save_to_file(&self, path: &Path) -> GeminiResult<()> {
        let content = toml::to_string(self).map_err(|e| {
            GeminiError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                GeminiError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        fs::write(path, content).map_err(|e| {
            GeminiError::ConfigError(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Environment variables win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = non_empty_env("GEMINI_API_KEY") {
            self.gemini.api_key = Some(key);
        }
        if let Some(model) = non_empty_env("GEMINI_MODEL") {
            self.gemini.model_name = model;
        }
        if let Some(id) = non_empty_env("TIC_SPREADSHEET_ID") {
            self.remote_log.spreadsheet_id = Some(id);
        }
        if self.remote_log.service_account_key_path.is_none() {
            if let Some(path) = non_empty_env("GOOGLE_APPLICATION_CREDENTIALS") {
                self.remote_log.service_account_key_path = Some(PathBuf::from(path));
            }
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Helper function to get default config directory
pub fn get_default_config_dir() -> GeminiResult<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| {
        GeminiError::ConfigError("Could not determine home directory".to_string())
    })?;

    Ok(home_dir.join(".config").join(APP_NAME))
}

/// Helper function to get default config file path
pub fn get_default_config_file() -> GeminiResult<PathBuf> {
    Ok(get_default_config_dir()?.join("config.toml"))
}
