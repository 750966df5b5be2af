//! Bridge façade and its concurrency guarantees.
//!
//! # Submodules
//!
//! - [`facade`] - The operation state machine shared by CLI and server
//! - [`locks`] - Per-tab mutual exclusion arena

pub mod facade;
pub mod locks;

pub use facade::{
    Bridge, ClickReport, OperationPhase, OperationStatus, StateReport, TypeReport, TypeRequest,
};
pub use locks::TabLocks;
