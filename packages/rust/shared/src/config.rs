//! Application configuration for tickerflow.
//!
//! User config lives at `~/.tickerflow/tickerflow.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TickerflowError};
use crate::types::QualityTier;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tickerflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tickerflow";

// ---------------------------------------------------------------------------
// Config structs (matching tickerflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Step cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Reasoning provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// How many ideas `idea_generation` asks for when the payload is silent.
    #[serde(default = "default_idea_count")]
    pub idea_count: u32,

    /// Quality tier used when the payload has no `detail_level`.
    #[serde(default)]
    pub detail_level: QualityTier,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            idea_count: default_idea_count(),
            detail_level: QualityTier::default(),
        }
    }
}

fn default_idea_count() -> u32 {
    150
}

/// Which medium backs the step cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Whole-snapshot JSON file.
    #[default]
    File,
    /// libSQL database, one row per step.
    Libsql,
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Backing file (`~` is expanded).
    #[serde(default = "default_cache_path")]
    pub path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> String {
    "~/.tickerflow/cache/analysis_cache.json".into()
}

/// `[provider]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible chat-completions API.
    #[serde(default = "default_base_url")]
    pub base_url: Url,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for the `fast` tier.
    #[serde(default = "default_fast_model")]
    pub fast_model: String,

    /// Model used for the `detailed` tier.
    #[serde(default = "default_deep_model")]
    pub detailed_model: String,

    /// Model used for the `report` tier.
    #[serde(default = "default_deep_model")]
    pub report_model: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            fast_model: default_fast_model(),
            detailed_model: default_deep_model(),
            report_model: default_deep_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    /// Model name configured for `tier`.
    pub fn model_for(&self, tier: QualityTier) -> &str {
        match tier {
            QualityTier::Fast => &self.fast_model,
            QualityTier::Detailed => &self.detailed_model,
            QualityTier::Report => &self.report_model,
        }
    }
}

fn default_base_url() -> Url {
    Url::parse("https://openrouter.ai/api/v1/").expect("default provider URL")
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_fast_model() -> String {
    "google/gemini-2.5-flash".into()
}
fn default_deep_model() -> String {
    "google/gemini-2.5-pro".into()
}
fn default_timeout_secs() -> u64 {
    300
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tickerflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TickerflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tickerflow/tickerflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| TickerflowError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TickerflowError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        TickerflowError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TickerflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TickerflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TickerflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the provider API key from the configured env var.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.provider.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(TickerflowError::config(format!(
            "provider API key not found. Set the {var_name} environment variable."
        ))),
    }
}
