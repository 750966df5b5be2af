//! Bridge façade: the single entry point for every operation.
//!
//! One-shot CLI invocations and the long-lived request server drive the
//! same code path: resolve the tab, take its lock, open a session, focus
//! (and optionally clear), dispatch input, and close the session on every
//! exit path. Each run walks the phase machine
//! `Idle → TabResolved → SessionOpen → Focused → (Cleared) → Typed →
//! Closed`, falling into `Failed` from any non-terminal phase; in-flight
//! phases are observable through [`Bridge::state`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::agent::{AgentHandoff, AgentOutcome, UnconfiguredAgent};
use crate::bridge::locks::TabLocks;
use crate::cdp::{CdpSession, SessionConfig, Tab, TabRegistry};
use crate::config::BridgeSettings;
use crate::error::{BridgeError, BridgeResult};
use crate::input::{Keyboard, Mouse};

/// Pause after programmatic focus before input starts; pages move carets
/// and spin up editor state in response to focus events.
const FOCUS_SETTLE: Duration = Duration::from_millis(100);

/// Phase of one façade operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPhase {
    Idle,
    TabResolved,
    SessionOpen,
    Focused,
    Cleared,
    Typed,
    Closed,
    Failed,
}

/// Snapshot of one in-flight operation, exposed over `GET /state`.
#[derive(Debug, Clone, Serialize)]
pub struct OperationStatus {
    pub id: u64,
    pub operation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab: Option<String>,
    pub phase: OperationPhase,
}

#[derive(Debug, Default)]
struct OperationTableInner {
    next_id: u64,
    active: HashMap<u64, OperationStatus>,
    completed: u64,
    failed: u64,
}

/// Shared table of running operations plus lifetime counters.
#[derive(Debug, Clone, Default)]
struct OperationTable {
    inner: Arc<parking_lot::Mutex<OperationTableInner>>,
}

impl OperationTable {
    fn begin(&self, operation: &'static str) -> OperationGuard {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.active.insert(
            id,
            OperationStatus {
                id,
                operation,
                tab: None,
                phase: OperationPhase::Idle,
            },
        );
        OperationGuard {
            id,
            table: self.clone(),
        }
    }

    fn snapshot(&self) -> (Vec<OperationStatus>, u64, u64) {
        let inner = self.inner.lock();
        let mut active: Vec<OperationStatus> = inner.active.values().cloned().collect();
        active.sort_by_key(|op| op.id);
        (active, inner.completed, inner.failed)
    }
}

/// Tracks one operation in the table; removes it again on drop.
struct OperationGuard {
    id: u64,
    table: OperationTable,
}

impl OperationGuard {
    fn set_phase(&self, phase: OperationPhase) {
        if let Some(status) = self.table.inner.lock().active.get_mut(&self.id) {
            status.phase = phase;
        }
    }

    fn set_tab(&self, url: &str) {
        if let Some(status) = self.table.inner.lock().active.get_mut(&self.id) {
            status.tab = Some(url.to_string());
        }
    }

    fn finish(&self, ok: bool) {
        let mut inner = self.table.inner.lock();
        if let Some(status) = inner.active.get_mut(&self.id) {
            status.phase = if ok {
                OperationPhase::Closed
            } else {
                OperationPhase::Failed
            };
        }
        if ok {
            inner.completed += 1;
        } else {
            inner.failed += 1;
        }
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.table.inner.lock().active.remove(&self.id);
    }
}

/// Parameters for one typing operation. The text is never mutated here;
/// escape handling belongs to the CLI/HTTP layer that builds the request.
#[derive(Debug, Clone, Default)]
pub struct TypeRequest {
    /// Text to replay as keystrokes.
    pub text: String,
    /// URL fragment selecting the target tab.
    pub tab_url: Option<String>,
    /// CSS selector to focus before typing; absent means "type into
    /// whatever already has focus".
    pub selector: Option<String>,
    /// Empty the editable region (through the trusted-event path) first.
    pub clear: bool,
    /// Per-request override of the inter-keystroke delay.
    pub key_delay_ms: Option<u64>,
}

/// Result of a completed typing operation.
#[derive(Debug, Clone, Serialize)]
pub struct TypeReport {
    pub ok: bool,
    /// Non-Enter keystroke units dispatched.
    pub chars: usize,
    /// Enter units dispatched.
    pub newlines: usize,
    /// Total keystroke units.
    pub units: usize,
    pub elapsed_ms: u64,
    /// URL of the tab that received the input.
    pub tab: String,
}

/// Result of a completed click operation.
#[derive(Debug, Clone, Serialize)]
pub struct ClickReport {
    pub ok: bool,
    pub x: i64,
    pub y: i64,
    pub tab: String,
}

/// Bridge status for `GET /state`.
#[derive(Debug, Clone, Serialize)]
pub struct StateReport {
    pub ok: bool,
    /// Configured debugging endpoint.
    pub cdp: String,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    /// Operations currently in flight.
    pub active: Vec<OperationStatus>,
    pub completed: u64,
    pub failed: u64,
}

/// The bridge façade.
pub struct Bridge {
    settings: BridgeSettings,
    registry: TabRegistry,
    locks: TabLocks,
    agent: Arc<dyn AgentHandoff>,
    operations: OperationTable,
    started_at: DateTime<Utc>,
}

impl Bridge {
    /// Creates a bridge bound to the configured debugging endpoint, with
    /// the agent capability unconfigured.
    pub fn new(settings: BridgeSettings) -> Self {
        let registry = TabRegistry::new(&settings);
        Self {
            settings,
            registry,
            locks: TabLocks::new(),
            agent: Arc::new(UnconfiguredAgent),
            operations: OperationTable::default(),
            started_at: Utc::now(),
        }
    }

    /// Plugs in a real agent collaborator.
    pub fn with_agent(mut self, agent: Arc<dyn AgentHandoff>) -> Self {
        self.agent = agent;
        self
    }

    /// The settings this bridge was built with.
    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// The configured debugging endpoint base URL.
    pub fn endpoint(&self) -> &str {
        self.registry.endpoint()
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: self.settings.connect_timeout(),
            command_timeout: self.settings.command_timeout(),
        }
    }

    /// Lists the currently open page tabs. Always re-fetched; tabs come and
    /// go outside the bridge's control.
    pub async fn tabs(&self) -> BridgeResult<Vec<Tab>> {
        self.registry.list().await
    }

    /// Snapshot of bridge status and in-flight operations.
    pub fn state(&self) -> StateReport {
        let (active, completed, failed) = self.operations.snapshot();
        StateReport {
            ok: true,
            cdp: self.endpoint().to_string(),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            active,
            completed,
            failed,
        }
    }

    /// Types text into a tab as trusted keyboard events.
    pub async fn type_text(&self, request: TypeRequest) -> BridgeResult<TypeReport> {
        let op = self.operations.begin("type");
        let result = self.type_text_inner(&op, request).await;
        op.finish(result.is_ok());
        result
    }

    async fn type_text_inner(
        &self,
        op: &OperationGuard,
        request: TypeRequest,
    ) -> BridgeResult<TypeReport> {
        let tab = self.registry.resolve(request.tab_url.as_deref()).await?;
        op.set_tab(&tab.url);
        op.set_phase(OperationPhase::TabResolved);
        info!(tab = %tab.url, chars = request.text.chars().count(), "typing into tab");

        // Serialize against every other input operation on this tab for the
        // whole session lifetime; interleaved keystrokes corrupt the shared
        // editable region.
        let tab_lock = self.locks.for_tab(&tab.id);
        let _serialized = tab_lock.lock().await;

        let session = CdpSession::connect(&tab, &self.session_config()).await?;
        op.set_phase(OperationPhase::SessionOpen);

        let key_delay = request
            .key_delay_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.settings.key_delay());
        let newline_delay = self.settings.newline_delay();

        let body = async {
            let keyboard = Keyboard::new(&session, key_delay, newline_delay);
            focus(&session, request.selector.as_deref()).await?;
            op.set_phase(OperationPhase::Focused);

            if request.clear {
                keyboard.select_all_and_delete().await?;
                op.set_phase(OperationPhase::Cleared);
            }

            let outcome = keyboard.type_text(&request.text).await?;
            op.set_phase(OperationPhase::Typed);
            Ok(outcome)
        };

        let result = body.await;
        session.close().await;

        result.map(|outcome| TypeReport {
            ok: true,
            chars: outcome.chars,
            newlines: outcome.newlines,
            units: outcome.units,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            tab: tab.url,
        })
    }

    /// Left-clicks at viewport coordinates in a tab.
    pub async fn click(&self, x: i64, y: i64, tab_url: Option<&str>) -> BridgeResult<ClickReport> {
        let op = self.operations.begin("click");
        let result = self.click_inner(&op, x, y, tab_url).await;
        op.finish(result.is_ok());
        result
    }

    async fn click_inner(
        &self,
        op: &OperationGuard,
        x: i64,
        y: i64,
        tab_url: Option<&str>,
    ) -> BridgeResult<ClickReport> {
        let tab = self.registry.resolve(tab_url).await?;
        op.set_tab(&tab.url);
        op.set_phase(OperationPhase::TabResolved);

        let tab_lock = self.locks.for_tab(&tab.id);
        let _serialized = tab_lock.lock().await;

        let session = CdpSession::connect(&tab, &self.session_config()).await?;
        op.set_phase(OperationPhase::SessionOpen);

        let result = Mouse::new(&session).click(x, y).await;
        session.close().await;

        result.map(|()| ClickReport {
            ok: true,
            x,
            y,
            tab: tab.url,
        })
    }

    /// Evaluates a JavaScript expression in a tab's page context.
    pub async fn eval(&self, expression: &str, tab_url: Option<&str>) -> BridgeResult<Value> {
        let op = self.operations.begin("eval");
        let result = self.eval_inner(&op, expression, tab_url).await;
        op.finish(result.is_ok());
        result
    }

    async fn eval_inner(
        &self,
        op: &OperationGuard,
        expression: &str,
        tab_url: Option<&str>,
    ) -> BridgeResult<Value> {
        let tab = self.registry.resolve(tab_url).await?;
        op.set_tab(&tab.url);
        op.set_phase(OperationPhase::TabResolved);

        let session = CdpSession::connect(&tab, &self.session_config()).await?;
        op.set_phase(OperationPhase::SessionOpen);

        let result = session
            .send(
                "Runtime.evaluate",
                json!({"expression": expression, "returnByValue": true}),
            )
            .await;
        session.close().await;
        result
    }

    /// Fetches the full DOM tree, piercing shadow roots.
    pub async fn dom(&self, tab_url: Option<&str>) -> BridgeResult<Value> {
        let op = self.operations.begin("dom");
        let result = self.dom_inner(&op, tab_url).await;
        op.finish(result.is_ok());
        result
    }

    async fn dom_inner(&self, op: &OperationGuard, tab_url: Option<&str>) -> BridgeResult<Value> {
        let tab = self.registry.resolve(tab_url).await?;
        op.set_tab(&tab.url);
        op.set_phase(OperationPhase::TabResolved);

        let session = CdpSession::connect(&tab, &self.session_config()).await?;
        op.set_phase(OperationPhase::SessionOpen);

        let result = async {
            session.send("DOM.enable", json!({})).await?;
            session
                .send("DOM.getDocument", json!({"depth": -1, "pierce": true}))
                .await
        }
        .await;
        session.close().await;
        result
    }

    /// Fetches the full accessibility tree.
    pub async fn ax_tree(&self, tab_url: Option<&str>) -> BridgeResult<Value> {
        let op = self.operations.begin("axtree");
        let result = self.ax_tree_inner(&op, tab_url).await;
        op.finish(result.is_ok());
        result
    }

    async fn ax_tree_inner(
        &self,
        op: &OperationGuard,
        tab_url: Option<&str>,
    ) -> BridgeResult<Value> {
        let tab = self.registry.resolve(tab_url).await?;
        op.set_tab(&tab.url);
        op.set_phase(OperationPhase::TabResolved);

        let session = CdpSession::connect(&tab, &self.session_config()).await?;
        op.set_phase(OperationPhase::SessionOpen);

        let result = async {
            session.send("Accessibility.enable", json!({})).await?;
            session.send("Accessibility.getFullAXTree", json!({})).await
        }
        .await;
        session.close().await;
        result
    }

    /// Delegates a free-form task to the configured agent collaborator.
    pub async fn run_agent(&self, task: &str, tab_url: Option<&str>) -> BridgeResult<AgentOutcome> {
        let op = self.operations.begin("agent");
        let result = async {
            let tab = self.registry.resolve(tab_url).await?;
            op.set_tab(&tab.url);
            op.set_phase(OperationPhase::TabResolved);
            self.agent.run_task(task, &tab).await
        }
        .await;
        op.finish(result.is_ok());
        result
    }

    /// Delegates semantic element finding to the configured agent.
    pub async fn find_element(
        &self,
        prompt: &str,
        tab_url: Option<&str>,
    ) -> BridgeResult<String> {
        let op = self.operations.begin("find");
        let result = async {
            let tab = self.registry.resolve(tab_url).await?;
            op.set_tab(&tab.url);
            op.set_phase(OperationPhase::TabResolved);
            self.agent.find_element(prompt, &tab).await
        }
        .await;
        op.finish(result.is_ok());
        result
    }
}

/// Focuses the typing target.
///
/// With no selector, typing goes to whatever already holds focus; the
/// current target is still queried so the decision shows up in logs. With a
/// selector, the first DOM-order match is focused — a documented policy;
/// multiple matches are logged, zero matches fail.
async fn focus(session: &CdpSession, selector: Option<&str>) -> BridgeResult<()> {
    match selector {
        None => {
            let result = session
                .send(
                    "Runtime.evaluate",
                    json!({
                        "expression":
                            "document.activeElement ? document.activeElement.tagName : \"\"",
                        "returnByValue": true,
                    }),
                )
                .await?;
            let tag = result["result"]["value"].as_str().unwrap_or("");
            debug!(active = tag, "typing into the page's current focus target");
            Ok(())
        }
        Some(selector) => {
            let quoted = Value::String(selector.to_string()).to_string();
            let expression = format!(
                r#"(() => {{
    const hits = document.querySelectorAll({quoted});
    if (hits.length === 0) return "missing";
    hits[0].focus();
    return "focused:" + hits.length;
}})()"#
            );
            let result = session
                .send(
                    "Runtime.evaluate",
                    json!({"expression": expression, "returnByValue": true}),
                )
                .await?;

            let value = result["result"]["value"].as_str().unwrap_or("");
            if value == "missing" {
                return Err(BridgeError::ElementNotFound {
                    selector: selector.to_string(),
                });
            }
            if let Some(count) = value
                .strip_prefix("focused:")
                .and_then(|n| n.parse::<usize>().ok())
            {
                if count > 1 {
                    warn!(
                        selector,
                        matches = count,
                        "selector matches multiple elements; focusing the first"
                    );
                }
            }

            tokio::time::sleep(FOCUS_SETTLE).await;
            Ok(())
        }
    }
}
