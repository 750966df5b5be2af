//! Trusted input dispatch for cdp-bridge.
//!
//! Everything here goes over `Input.dispatchKeyEvent` /
//! `Input.dispatchMouseEvent` on a live [`crate::cdp::CdpSession`], so the
//! browser reports the events as genuine hardware input.
//!
//! # Submodules
//!
//! - [`keyboard`] - Keystroke derivation, pacing, and the clear sequence
//! - [`mouse`] - Coordinate clicks

pub mod keyboard;
pub mod mouse;

pub use keyboard::{keystrokes, unescape_newlines, KeyStroke, Keyboard, StrokeKind, TypeOutcome};
pub use mouse::Mouse;
