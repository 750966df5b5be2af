//! Delegated AI capabilities.
//!
//! Semantic element finding and free-form task execution are not the
//! bridge's job — they belong to an external agent framework that the
//! bridge treats as an opaque, possibly slow, possibly failing
//! collaborator. [`AgentHandoff`] is the narrow capability contract; the
//! default [`UnconfiguredAgent`] makes the delegation boundary explicit by
//! failing with `agent_unavailable` until a real backend is wired in.

use async_trait::async_trait;
use serde::Serialize;

use crate::cdp::Tab;
use crate::error::{BridgeError, BridgeResult};

/// Result of a delegated agent task run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    /// Whether the agent considers the task finished.
    pub done: bool,
    /// Whether the agent considers the task successful.
    pub successful: bool,
    /// Free-form final result text, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Steps the agent took.
    pub steps: u32,
}

/// Capability contract consumed from the external AI collaborator.
#[async_trait]
pub trait AgentHandoff: Send + Sync {
    /// Runs a natural-language task against the given tab.
    async fn run_task(&self, task: &str, tab: &Tab) -> BridgeResult<AgentOutcome>;

    /// Resolves a natural-language prompt to a CSS selector in the tab.
    async fn find_element(&self, prompt: &str, tab: &Tab) -> BridgeResult<String>;
}

/// Placeholder collaborator used when no agent backend is configured.
#[derive(Debug, Default)]
pub struct UnconfiguredAgent;

#[async_trait]
impl AgentHandoff for UnconfiguredAgent {
    async fn run_task(&self, _task: &str, _tab: &Tab) -> BridgeResult<AgentOutcome> {
        Err(BridgeError::AgentUnavailable {
            capability: "run_task".to_string(),
        })
    }

    async fn find_element(&self, _prompt: &str, _tab: &Tab) -> BridgeResult<String> {
        Err(BridgeError::AgentUnavailable {
            capability: "find_element".to_string(),
        })
    }
}
