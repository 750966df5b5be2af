//! Chrome DevTools Protocol plumbing.
//!
//! # Submodules
//!
//! - [`tab`] - Tab discovery and URL-fragment resolution
//! - [`session`] - Per-tab websocket channel with command correlation

pub mod session;
pub mod tab;

pub use session::{CdpSession, SessionConfig};
pub use tab::{select_tab, Tab, TabRegistry};
