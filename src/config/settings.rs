//! Bridge settings and configuration management.
//!
//! Settings resolve through a precedence chain (later sources win):
//!
//! 1. Built-in defaults
//! 2. Configuration file (TOML or JSON, detected by extension)
//! 3. Environment variables (`CDP_URL`, `CDP_PORT`)
//! 4. CLI arguments
//!
//! The resolved [`BridgeSettings`] value is threaded explicitly into the tab
//! registry and session constructors; nothing reads the environment after
//! startup.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML configuration.
    #[error("failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// Failed to parse JSON configuration.
    #[error("failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    ValidationError(String),

    /// Unsupported file format.
    #[error("unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// Connection and dispatch settings for the bridge.
///
/// # Example
///
/// ```rust
/// use cdp_bridge::config::BridgeSettings;
///
/// let settings = BridgeSettings::default().with_cdp_port(9222);
/// assert_eq!(settings.endpoint_url(), "http://localhost:9222");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Full base URL of the browser's debugging endpoint. When set, it takes
    /// precedence over `cdp_port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdp_url: Option<String>,

    /// Debugging port, used only to build a localhost URL when `cdp_url`
    /// is absent.
    #[serde(default = "default_cdp_port")]
    pub cdp_port: u16,

    /// Websocket handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-command response timeout in milliseconds.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Pause between character keystroke units in milliseconds.
    #[serde(default = "default_key_delay_ms")]
    pub key_delay_ms: u64,

    /// Pause after Enter and after the clear sequence, in milliseconds.
    /// Rich editors need this long to finish block creation.
    #[serde(default = "default_newline_delay_ms")]
    pub newline_delay_ms: u64,

    /// Port for the long-lived request server (`serve` subcommand).
    #[serde(default = "default_serve_port")]
    pub serve_port: u16,
}

// Default value functions for serde
fn default_cdp_port() -> u16 {
    18800
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_command_timeout_ms() -> u64 {
    30_000
}

fn default_key_delay_ms() -> u64 {
    8
}

fn default_newline_delay_ms() -> u64 {
    50
}

fn default_serve_port() -> u16 {
    18850
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            cdp_url: None,
            cdp_port: default_cdp_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            key_delay_ms: default_key_delay_ms(),
            newline_delay_ms: default_newline_delay_ms(),
            serve_port: default_serve_port(),
        }
    }
}

impl BridgeSettings {
    /// Creates settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from a configuration file (TOML or JSON by extension).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Applies `CDP_URL` / `CDP_PORT` environment overrides.
    ///
    /// `CDP_URL` wins over `CDP_PORT`: the port is only consulted when no
    /// full URL is configured anywhere in the chain.
    pub fn merge_with_env(mut self) -> Self {
        if let Ok(url) = env::var("CDP_URL") {
            if !url.is_empty() {
                self.cdp_url = Some(url);
            }
        }
        if let Ok(port) = env::var("CDP_PORT") {
            match port.parse::<u16>() {
                Ok(port) if port != 0 => self.cdp_port = port,
                _ => warn!(value = %port, "ignoring invalid CDP_PORT"),
            }
        }
        self
    }

    /// The debugging endpoint base URL after precedence resolution.
    pub fn endpoint_url(&self) -> String {
        match &self.cdp_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.cdp_port),
        }
    }

    /// Sets the full debugging endpoint URL.
    pub fn with_cdp_url(mut self, url: impl Into<String>) -> Self {
        self.cdp_url = Some(url.into());
        self
    }

    /// Sets the debugging port.
    pub fn with_cdp_port(mut self, port: u16) -> Self {
        self.cdp_port = port;
        self
    }

    /// Sets the per-command timeout.
    pub fn with_command_timeout_ms(mut self, ms: u64) -> Self {
        self.command_timeout_ms = ms;
        self
    }

    /// Sets the inter-keystroke delay.
    pub fn with_key_delay_ms(mut self, ms: u64) -> Self {
        self.key_delay_ms = ms;
        self
    }

    /// Websocket handshake timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-command timeout as a [`Duration`].
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Inter-keystroke pause as a [`Duration`].
    pub fn key_delay(&self) -> Duration {
        Duration::from_millis(self.key_delay_ms)
    }

    /// Post-Enter / post-clear pause as a [`Duration`].
    pub fn newline_delay(&self) -> Duration {
        Duration::from_millis(self.newline_delay_ms)
    }

    /// Validates the resolved settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cdp_port == 0 && self.cdp_url.is_none() {
            return Err(ConfigError::ValidationError(
                "cdp_port cannot be 0 without an explicit cdp_url".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "command_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// CLI argument overrides, applied last in the precedence chain.
#[derive(Debug, Default, Clone)]
pub struct CliArgs {
    /// Path to a configuration file (TOML or JSON).
    pub config_file: Option<PathBuf>,
    /// Full debugging endpoint URL override.
    pub cdp_url: Option<String>,
    /// Debugging port override.
    pub cdp_port: Option<u16>,
    /// Per-command timeout override in milliseconds.
    pub command_timeout_ms: Option<u64>,
    /// Inter-keystroke delay override in milliseconds.
    pub key_delay_ms: Option<u64>,
}

impl CliArgs {
    /// Resolves the full precedence chain into validated settings.
    pub fn load_settings(&self) -> Result<BridgeSettings, ConfigError> {
        let settings = match &self.config_file {
            Some(path) => BridgeSettings::from_file(path)?,
            None => BridgeSettings::default(),
        };

        let mut settings = settings.merge_with_env();

        if let Some(url) = &self.cdp_url {
            settings.cdp_url = Some(url.clone());
        }
        if let Some(port) = self.cdp_port {
            settings.cdp_port = port;
        }
        if let Some(ms) = self.command_timeout_ms {
            settings.command_timeout_ms = ms;
        }
        if let Some(ms) = self.key_delay_ms {
            settings.key_delay_ms = ms;
        }

        settings.validate()?;
        Ok(settings)
    }
}
