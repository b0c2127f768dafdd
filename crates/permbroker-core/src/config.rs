//! Configuration resolution for permbroker.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/permbroker/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::default_permission_dir;

/// Complete permbroker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
}

/// Watcher and artifact handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Shared directory; `None` means `<tmp>/claude-permission`.
    pub permission_dir: Option<PathBuf>,
    /// Delay between directory scans (milliseconds).
    pub poll_interval_ms: u64,
    /// Grace period between claiming a request artifact and reading it.
    pub settle_delay_ms: u64,
    /// Bounded wait for the scan loop to exit on stop.
    pub shutdown_timeout_ms: u64,
    pub log_level: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            permission_dir: None,
            poll_interval_ms: 500,
            settle_delay_ms: 100,
            shutdown_timeout_ms: 1000,
            log_level: "info".to_string(),
        }
    }
}

/// Fallback prompt configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Hard bound on the blocking fallback prompt (seconds). Expiry denies.
    pub timeout_secs: u64,
    /// Maximum number of input fields shown in a prompt summary.
    pub max_summary_fields: usize,
    /// Values longer than this are truncated in a prompt summary.
    pub max_value_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_summary_fields: 5,
            max_value_chars: 200,
        }
    }
}

impl Config {
    /// Resolved shared directory.
    pub fn permission_dir(&self) -> PathBuf {
        self.broker
            .permission_dir
            .clone()
            .unwrap_or_else(default_permission_dir)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.broker.poll_interval_ms)
    }

    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.broker.settle_delay_ms)
    }

    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.shutdown_timeout_ms)
    }

    pub const fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt.timeout_secs)
    }

    /// Reject settings the broker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.broker.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit_file: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            config = load_config_file(&global_path)?;
        }
    }

    // Explicit file must exist when given
    if let Some(path) = explicit_file {
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config);
    config.validate()?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".permbroker").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/permbroker/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("permbroker").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Read a settings file. Missing sections and fields take their defaults.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let config: Config = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    config.validate()?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("PERMBROKER_DIR") {
        if !val.is_empty() {
            config.broker.permission_dir = Some(PathBuf::from(val));
        }
    }
    if let Ok(val) = std::env::var("PERMBROKER_POLL_INTERVAL_MS") {
        if let Ok(n) = val.parse() {
            config.broker.poll_interval_ms = n;
        }
    }
    if let Ok(val) = std::env::var("PERMBROKER_PROMPT_TIMEOUT_SECS") {
        if let Ok(n) = val.parse() {
            config.prompt.timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("PERMBROKER_LOG_LEVEL") {
        config.broker.log_level = val;
    }
}
