//! # cdp-bridge
//!
//! A host-side bridge that types trusted keyboard input into web pages over
//! the Chrome DevTools Protocol.
//!
//! Rich-text editors such as DraftJS, ProseMirror, TipTap, Slate and Quill
//! validate `event.isTrusted` and discard synthetic input from ordinary
//! automation libraries. This bridge runs where the real browser process
//! lives, connects to each tab's debugger endpoint directly, and replays
//! text as raw `Input.dispatchKeyEvent` commands — which the browser
//! delivers as genuine keyboard input.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cdp_bridge::bridge::{Bridge, TypeRequest};
//! use cdp_bridge::config::BridgeSettings;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = BridgeSettings::default().merge_with_env();
//!     let bridge = Bridge::new(settings);
//!
//!     let report = bridge
//!         .type_text(TypeRequest {
//!             text: "Hello from the bridge".to_string(),
//!             tab_url: Some("x.com".to_string()),
//!             ..TypeRequest::default()
//!         })
//!         .await?;
//!     println!("typed {} chars into {}", report.chars, report.tab);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`cdp`]: tab discovery and the per-tab protocol channel
//! - [`input`]: keystroke derivation and trusted input dispatch
//! - [`bridge`]: the operation façade and per-tab serialization
//! - [`agent`]: the delegated AI capability contract
//! - [`api`]: the long-lived request server
//! - [`config`]: settings loading and precedence
//! - [`error`]: the failure taxonomy

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Full version string with name
pub const FULL_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Module Exports
// ============================================================================

/// Delegated AI capability contract.
pub mod agent;

/// Request server (routes + axum wiring).
pub mod api;

/// Operation façade and per-tab locking.
pub mod bridge;

/// Tab discovery and protocol sessions.
pub mod cdp;

/// Configuration management.
pub mod config;

/// Failure taxonomy.
pub mod error;

/// Trusted input dispatch.
pub mod input;

// ============================================================================
// Re-exports for Convenience
// ============================================================================

pub use agent::{AgentHandoff, AgentOutcome, UnconfiguredAgent};
pub use api::{create_router, ApiServer, AppState};
pub use bridge::{Bridge, OperationPhase, StateReport, TabLocks, TypeReport, TypeRequest};
pub use cdp::{CdpSession, SessionConfig, Tab, TabRegistry};
pub use config::{BridgeSettings, CliArgs, ConfigError};
pub use error::{BridgeError, BridgeResult};
pub use input::{keystrokes, KeyStroke, Keyboard, Mouse, TypeOutcome};

/// Prelude module for convenient imports.
///
/// ```rust
/// use cdp_bridge::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bridge::{Bridge, TypeRequest};
    pub use crate::cdp::{CdpSession, Tab, TabRegistry};
    pub use crate::config::{BridgeSettings, CliArgs};
    pub use crate::error::{BridgeError, BridgeResult};
    pub use crate::input::{Keyboard, Mouse};
    pub use crate::{FULL_VERSION, NAME, VERSION};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert!(!VERSION.is_empty());
        assert!(!NAME.is_empty());
        assert!(FULL_VERSION.contains(VERSION));
        assert!(FULL_VERSION.contains(NAME));
    }
}
