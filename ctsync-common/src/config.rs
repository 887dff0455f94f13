//! Configuration loading and resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `CTSYNC_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/ctsync/config.toml` on Linux)
//! 4. Compiled defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CTSYNC_CONFIG";

/// Environment variable carrying the oracle API key
pub const ORACLE_KEY_ENV_VAR: &str = "CTSYNC_ORACLE_API_KEY";

/// How field-level divergence between a matched pair is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Keep whichever side was modified most recently
    Newest,
    /// Keep whichever side was modified least recently
    Oldest,
    /// Field-by-field merge
    #[default]
    Merge,
    /// Defer to a human (always skips)
    Prompt,
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "merge" => Ok(Self::Merge),
            "prompt" => Ok(Self::Prompt),
            other => Err(Error::InvalidInput(format!(
                "Unknown conflict strategy '{}' (expected newest|oldest|merge|prompt)",
                other
            ))),
        }
    }
}

/// `[sync]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// Owner whose internal contacts are reconciled
    pub owner_id: Option<String>,
    /// External mutations per batch
    pub batch_size: usize,
    /// Records requested per `fetch_range` call
    pub fetch_batch_size: usize,
    /// Candidates kept per internal record
    pub max_candidates: usize,
    pub strategy: ConflictStrategy,
    /// Force field-by-field merge regardless of strategy
    pub auto_merge: bool,
    pub dry_run: bool,
    /// Cap on representative error messages in the result
    pub max_errors: usize,
    /// Attempts at the bridge handshake before the pass gives up on the bridge
    pub bridge_handshake_attempts: u32,
    pub bridge_retry_delay_ms: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            owner_id: None,
            batch_size: 50,
            fetch_batch_size: 50,
            max_candidates: 3,
            strategy: ConflictStrategy::Merge,
            auto_merge: false,
            dry_run: false,
            max_errors: 10,
            bridge_handshake_attempts: 3,
            bridge_retry_delay_ms: 500,
        }
    }
}

/// `[oracle]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Minimum confidence (0-100) for a duplicate verdict to count
    pub threshold: u8,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Pause between consecutive oracle calls in a batch
    pub inter_call_delay_ms: u64,
    /// Request budget for the oracle endpoint, retries included; 0 disables it
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            threshold: 80,
            max_retries: 3,
            retry_delay_ms: 1000,
            inter_call_delay_ms: 500,
            requests_per_minute: 50,
            timeout_secs: 30,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Full TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub sync: SyncSection,
    pub oracle: OracleSection,
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sync.batch_size == 0 {
            return Err(Error::Config("sync.batch_size must be greater than 0".to_string()));
        }
        if self.sync.fetch_batch_size == 0 {
            return Err(Error::Config(
                "sync.fetch_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.sync.max_candidates == 0 {
            return Err(Error::Config(
                "sync.max_candidates must be greater than 0".to_string(),
            ));
        }
        if self.oracle.threshold > 100 {
            return Err(Error::Config(format!(
                "oracle.threshold must be within 0-100, got {}",
                self.oracle.threshold
            )));
        }
        Ok(())
    }
}

/// Resolve which config file to read, if any
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("ctsync").join("config.toml"))
        .filter(|p| p.exists())
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration following the resolution priority, falling back to defaults
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)
        }
        None => {
            info!("No configuration file found, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Resolve the oracle API key
///
/// **Priority:** ENV → TOML
pub fn resolve_oracle_api_key(config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(ORACLE_KEY_ENV_VAR)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = config.oracle.api_key.clone().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("Oracle API key found in both environment and TOML. Using environment (highest priority).");
    }

    env_key.or(toml_key)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
