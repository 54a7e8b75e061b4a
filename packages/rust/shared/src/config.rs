//! Application configuration for privaudit.
//!
//! User config lives at `~/.privaudit/privaudit.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "privaudit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".privaudit";

// ---------------------------------------------------------------------------
// Config structs (matching privaudit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Gemini analysis-service settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Browser session settings.
    #[serde(default)]
    pub browser: BrowserSettings,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the result ledger database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Path to the newline-delimited domain list.
    #[serde(default = "default_domains_file")]
    pub domains_file: String,

    /// Minimum captured responses before proceeding past navigation.
    #[serde(default = "default_traffic_threshold")]
    pub traffic_threshold: usize,

    /// Maximum seconds to wait for the traffic threshold.
    #[serde(default = "default_traffic_timeout_secs")]
    pub traffic_timeout_secs: u64,

    /// Milliseconds to let cookie-setting scripts run after a consent click.
    #[serde(default = "default_consent_settle_ms")]
    pub consent_settle_ms: u64,

    /// Connect timeout in seconds for policy-document fetches.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            domains_file: default_domains_file(),
            traffic_threshold: default_traffic_threshold(),
            traffic_timeout_secs: default_traffic_timeout_secs(),
            consent_settle_ms: default_consent_settle_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_db_path() -> String {
    "var/privaudit.db".into()
}
fn default_domains_file() -> String {
    "domains.txt".into()
}
fn default_traffic_threshold() -> usize {
    150
}
fn default_traffic_timeout_secs() -> u64 {
    15
}
fn default_consent_settle_ms() -> u64 {
    3000
}
fn default_fetch_timeout_secs() -> u64 {
    10
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for the compliance analysis call.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL; overridable for testing against a mock server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Run Chrome headless (disable for debugging consent detection).
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Window width in pixels.
    #[serde(default = "default_window_width")]
    pub window_width: u32,

    /// Window height in pixels.
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_window_width() -> u32 {
    1920
}
fn default_window_height() -> u32 {
    1080
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.privaudit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AuditError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.privaudit/privaudit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
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
    let content = std::fs::read_to_string(path).map_err(|e| AuditError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| AuditError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AuditError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AuditError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AuditError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the Gemini API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.gemini.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(AuditError::config(format!(
            "Gemini API key not found. Export the {var_name} environment variable:\n\
             export {var_name}=<key>"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("traffic_threshold"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.traffic_threshold, 150);
        assert_eq!(parsed.defaults.traffic_timeout_secs, 15);
        assert_eq!(parsed.gemini.api_key_env, "GEMINI_API_KEY");
        assert_eq!(parsed.gemini.model, "gemini-2.5-flash");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
traffic_threshold = 20

[browser]
headless = false
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.traffic_threshold, 20);
        assert_eq!(config.defaults.consent_settle_ms, 3000);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.window_width, 1920);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.gemini.api_key_env = "PRIVAUDIT_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
