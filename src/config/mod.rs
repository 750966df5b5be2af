//! Configuration module for cdp-bridge.
//!
//! Provides configuration management for the bridge, including:
//! - Loading settings from files (TOML/JSON)
//! - Environment variable overrides (`CDP_URL`, `CDP_PORT`)
//! - CLI argument overrides
//! - Validation and defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use cdp_bridge::config::BridgeSettings;
//!
//! // Defaults, then environment overrides.
//! let settings = BridgeSettings::default().merge_with_env();
//!
//! // Or load from a specific file.
//! let settings = BridgeSettings::from_file("bridge.toml").unwrap();
//! ```

mod settings;

pub use settings::{BridgeSettings, CliArgs, ConfigError};
