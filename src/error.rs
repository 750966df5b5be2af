//! Error taxonomy for bridge operations.
//!
//! Every failure the bridge can produce maps to one [`BridgeError`] variant
//! with a stable machine-readable kind string. The CLI prints the kind next
//! to the message; the HTTP server returns it in the JSON error body so
//! callers can branch without parsing prose.

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias used throughout the bridge.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// All failure modes of a bridge operation.
///
/// Resolution failures (`TabNotFound`, `ElementNotFound`, `AmbiguousSelector`)
/// are reported and never retried. Protocol failures (`ConnectFailed`,
/// `CommandTimeout`, `CommandFailed`, `ConnectionLost`) are reported as well;
/// whether to retry the whole operation is the caller's policy, not the
/// bridge's.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The browser's debugging endpoint could not be reached at all.
    #[error("debugging endpoint {endpoint} is unreachable: {message}")]
    BridgeUnreachable { endpoint: String, message: String },

    /// No open page tab matched the requested URL fragment.
    #[error("no tab matching '{fragment}' (open tabs: [{urls}])", urls = available.join(", "))]
    TabNotFound {
        fragment: String,
        available: Vec<String>,
    },

    /// A selector matched more than one element under a strict-match policy.
    #[error("selector '{selector}' matches {matches} elements")]
    AmbiguousSelector { selector: String, matches: usize },

    /// The websocket handshake with the tab's debugger endpoint failed.
    #[error("failed to connect to {url}: {message}")]
    ConnectFailed { url: String, message: String },

    /// A protocol command got no response within the configured timeout.
    #[error("command {method} timed out after {timeout_ms}ms")]
    CommandTimeout { method: String, timeout_ms: u64 },

    /// The browser answered a command with a protocol-level error object.
    #[error("command {method} failed with code {code}: {message}")]
    CommandFailed {
        method: String,
        code: i64,
        message: String,
    },

    /// The debugger channel dropped while commands were still outstanding.
    #[error("debugger connection closed unexpectedly")]
    ConnectionLost,

    /// The focus selector matched no element in the page.
    #[error("no element matches selector '{selector}'")]
    ElementNotFound { selector: String },

    /// The input text contains a character the dispatcher cannot faithfully
    /// encode as key events. Reported up front; nothing is typed.
    #[error("unsupported character {ch:?} at index {index}")]
    UnsupportedCharacter { ch: char, index: usize },

    /// A delegated AI capability was requested but no agent is configured.
    #[error("no agent backend configured for '{capability}'")]
    AgentUnavailable { capability: String },

    /// Configuration loading or validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// Stable kind string for machine consumption (HTTP bodies, log fields).
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::BridgeUnreachable { .. } => "bridge_unreachable",
            BridgeError::TabNotFound { .. } => "tab_not_found",
            BridgeError::AmbiguousSelector { .. } => "ambiguous_selector",
            BridgeError::ConnectFailed { .. } => "connect_failed",
            BridgeError::CommandTimeout { .. } => "command_timeout",
            BridgeError::CommandFailed { .. } => "command_failed",
            BridgeError::ConnectionLost => "connection_lost",
            BridgeError::ElementNotFound { .. } => "element_not_found",
            BridgeError::UnsupportedCharacter { .. } => "unsupported_character",
            BridgeError::AgentUnavailable { .. } => "agent_unavailable",
            BridgeError::Config(_) => "config",
        }
    }
}
