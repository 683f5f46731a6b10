//! Configuration for the shuttle execution engine.
//!
//! A `defaults` submodule of named constants, serde-driven config structs,
//! and a `ConfigManager` that loads/saves TOML under a per-product config
//! directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default constants used throughout the engine.
pub mod defaults {
    /// Size, in bytes, above which a parameter or result value is offloaded
    /// to side storage instead of travelling inline.
    pub const OFFLOAD_THRESHOLD_BYTES: usize = 2560;

    /// Byte budget for the shared memory store before LRU eviction kicks in.
    pub const MAX_MEMORY_BYTES: usize = 64 * 1024 * 1024;

    /// Payload size above which shared-memory entries are compressed.
    pub const COMPRESSION_THRESHOLD_BYTES: usize = 8 * 1024;

    /// Time-to-live for a shared-memory entry.
    pub const ENTRY_TTL_SECS: u64 = 3600;

    /// Default catalog search result limit.
    pub const DEFAULT_SEARCH_LIMIT: usize = 10;

    /// Default human-in-the-loop request timeout.
    pub const HITL_TIMEOUT_SECS: u64 = 300;

    /// Default human-in-the-loop poll interval.
    pub const HITL_POLL_INTERVAL_MS: u64 = 1000;

    /// Default webhook notification timeout.
    pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;

    /// Session directory name (relative to workspace).
    pub const SESSION_DIR_NAME: &str = ".shuttle";
}

/// MCP transport type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    #[default]
    Stdio,
    Http,
}

/// MCP (Model Context Protocol) server configuration: how to reach one
/// remote tool server the dynamic resolver may proxy tools from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(default)]
    pub transport: McpTransport,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl McpServerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            transport: McpTransport::Stdio,
            command: command.into(),
            args: Vec::new(),
            url: None,
            env: HashMap::new(),
            headers: HashMap::new(),
            enabled: true,
        }
    }

    pub fn new_http(url: impl Into<String>) -> Self {
        Self {
            transport: McpTransport::Http,
            command: String::new(),
            args: Vec::new(),
            url: Some(url.into()),
            env: HashMap::new(),
            headers: HashMap::new(),
            enabled: true,
        }
    }

    pub fn is_http(&self) -> bool {
        self.transport == McpTransport::Http || self.url.is_some()
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Permission-checker (C6) configuration: the precedence-chain knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionConfig {
    pub yolo_mode: bool,
    #[serde(default)]
    pub disabled: Vec<String>,
    #[serde(default)]
    pub allowed: Vec<String>,
    pub require_approval: bool,
    /// "allow" or "deny".
    pub default_action: String,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            yolo_mode: false,
            disabled: Vec::new(),
            allowed: Vec::new(),
            require_approval: true,
            default_action: "allow".to_string(),
        }
    }
}

/// Large-payload offload (C3/C4) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadConfig {
    pub param_threshold_bytes: usize,
    pub result_threshold_bytes: usize,
    pub max_memory_bytes: usize,
    pub compression_threshold_bytes: usize,
    pub entry_ttl_secs: u64,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            param_threshold_bytes: defaults::OFFLOAD_THRESHOLD_BYTES,
            result_threshold_bytes: defaults::OFFLOAD_THRESHOLD_BYTES,
            max_memory_bytes: defaults::MAX_MEMORY_BYTES,
            compression_threshold_bytes: defaults::COMPRESSION_THRESHOLD_BYTES,
            entry_ttl_secs: defaults::ENTRY_TTL_SECS,
        }
    }
}

/// Indexed Tool Catalog (C7) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub db_path: PathBuf,
    pub default_search_limit: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("catalog.sqlite3"),
            default_search_limit: defaults::DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// Human-in-the-loop (C10) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlConfig {
    pub db_path: Option<PathBuf>,
    pub default_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub webhook_url: Option<String>,
}

impl Default for HitlConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            default_timeout_secs: defaults::HITL_TIMEOUT_SECS,
            poll_interval_ms: defaults::HITL_POLL_INTERVAL_MS,
            webhook_url: None,
        }
    }
}

/// General engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub workspace_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            workspace_dir: None,
            log_level: "info".to_string(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
    #[serde(default)]
    pub permission: PermissionConfig,
    #[serde(default)]
    pub offload: OffloadConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub hitl: HitlConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

/// Loads and saves [`Config`] as TOML under a per-product config directory.
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Config::default()
        };
        Ok(Self { config_path, config })
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| Error::Config("could not find config directory".to_string()))?;
        Ok(config_dir.join("shuttle").join("config.toml"))
    }

    fn load_from_path(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config(format!("failed to read config: {e}")))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("failed to parse config: {e}")))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Config(format!("failed to create config dir: {e}")))?;
        }
        let content =
            toml::to_string_pretty(&self.config).map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(&self.config_path, content).map_err(|e| Error::Config(format!("failed to write config: {e}")))?;
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            config_path: PathBuf::from("config.toml"),
            config: Config::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_allow_default_action() {
        let config = Config::default();
        assert_eq!(config.permission.default_action, "allow");
        assert!(!config.permission.yolo_mode);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.offload.param_threshold_bytes, config.offload.param_threshold_bytes);
    }

    #[test]
    fn mcp_server_config_http_detection() {
        let http = McpServerConfig::new_http("https://example.com/mcp");
        assert!(http.is_http());
        let stdio = McpServerConfig::new("npx");
        assert!(!stdio.is_http());
    }
}
