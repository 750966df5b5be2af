//! HTTP API for cdp-bridge.
//!
//! The long-lived `serve` mode exposes the same operations as the one-shot
//! CLI over JSON routes.

pub mod routes;
pub mod server;

pub use routes::{create_router, AppState, ErrorBody};
pub use server::ApiServer;
