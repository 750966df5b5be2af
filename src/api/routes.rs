//! Request-server routes and handlers.
//!
//! Every handler drives the same [`Bridge`] façade the CLI uses. Failures
//! surface as a JSON error object with a `kind` field so callers can branch
//! on the failure class without parsing prose.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::{Bridge, StateReport, TypeRequest};
use crate::error::BridgeError;
use crate::input::unescape_newlines;

/// Endpoints advertised on unknown-route responses.
const ENDPOINTS: &[&str] = &[
    "GET /health",
    "GET /tabs",
    "GET /state",
    "GET /dom",
    "GET /axtree",
    "POST /type",
    "POST /click",
    "POST /eval",
    "POST /agent",
    "POST /find",
];

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The bridge façade; one instance serves every request.
    pub bridge: Arc<Bridge>,
}

impl AppState {
    /// Wraps a bridge for the router.
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }
}

// ============================================================================
// Request/Response Structs
// ============================================================================

/// JSON error body carried by every failure response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            BridgeError::BridgeUnreachable { .. }
            | BridgeError::ConnectFailed { .. }
            | BridgeError::CommandFailed { .. }
            | BridgeError::ConnectionLost => StatusCode::BAD_GATEWAY,
            BridgeError::TabNotFound { .. } | BridgeError::ElementNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            BridgeError::AmbiguousSelector { .. }
            | BridgeError::UnsupportedCharacter { .. }
            | BridgeError::Config(_) => StatusCode::BAD_REQUEST,
            BridgeError::CommandTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            BridgeError::AgentUnavailable { .. } => StatusCode::NOT_IMPLEMENTED,
        };
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: String,
    /// Configured debugging endpoint.
    pub cdp: String,
}

/// One tab in the listing response.
#[derive(Debug, Serialize)]
pub struct TabInfo {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// Tab listing response.
#[derive(Debug, Serialize)]
pub struct TabsResponse {
    pub ok: bool,
    pub tabs: Vec<TabInfo>,
}

/// Type request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeBody {
    pub text: String,
    #[serde(default)]
    pub tab_url: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub clear: Option<bool>,
    #[serde(default)]
    pub key_delay_ms: Option<u64>,
}

/// Click request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickBody {
    pub x: i64,
    pub y: i64,
    #[serde(default)]
    pub tab_url: Option<String>,
}

/// Evaluate request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalBody {
    pub expression: String,
    #[serde(default)]
    pub tab_url: Option<String>,
}

/// Evaluate response.
#[derive(Debug, Serialize)]
pub struct EvalResponse {
    pub ok: bool,
    pub result: Value,
}

/// Agent task request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentBody {
    pub task: String,
    #[serde(default)]
    pub tab_url: Option<String>,
}

/// Agent find request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindBody {
    pub prompt: String,
    #[serde(default)]
    pub tab_url: Option<String>,
}

/// Find response.
#[derive(Debug, Serialize)]
pub struct FindResponse {
    pub ok: bool,
    pub selector: String,
}

/// Query parameters for the GET passthrough routes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabQuery {
    #[serde(default)]
    pub tab_url: Option<String>,
}

/// DOM summary response. The full tree is enormous; the server confirms the
/// fetch and defers full output to the CLI.
#[derive(Debug, Serialize)]
pub struct DomResponse {
    pub ok: bool,
    pub dom: String,
}

/// Accessibility tree summary response.
#[derive(Debug, Serialize)]
pub struct AxTreeResponse {
    pub ok: bool,
    pub nodes: usize,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /health - liveness and configured endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        cdp: state.bridge.endpoint().to_string(),
    })
}

/// GET /tabs - live page-tab listing.
pub async fn tabs(State(state): State<AppState>) -> Result<Json<TabsResponse>, BridgeError> {
    let tabs = state
        .bridge
        .tabs()
        .await?
        .into_iter()
        .map(|t| TabInfo {
            id: t.id,
            title: t.title,
            url: t.url,
        })
        .collect();
    Ok(Json(TabsResponse { ok: true, tabs }))
}

/// GET /state - bridge status and in-flight operations.
pub async fn state_report(State(state): State<AppState>) -> Json<StateReport> {
    Json(state.bridge.state())
}

/// POST /type - trusted keyboard input.
pub async fn type_text(
    State(state): State<AppState>,
    Json(body): Json<TypeBody>,
) -> Result<impl IntoResponse, BridgeError> {
    let request = TypeRequest {
        text: unescape_newlines(&body.text),
        tab_url: body.tab_url,
        selector: body.selector,
        clear: body.clear.unwrap_or(false),
        key_delay_ms: body.key_delay_ms,
    };
    let report = state.bridge.type_text(request).await?;
    Ok(Json(report))
}

/// POST /click - trusted mouse click at coordinates.
pub async fn click(
    State(state): State<AppState>,
    Json(body): Json<ClickBody>,
) -> Result<impl IntoResponse, BridgeError> {
    let report = state
        .bridge
        .click(body.x, body.y, body.tab_url.as_deref())
        .await?;
    Ok(Json(report))
}

/// POST /eval - JavaScript evaluation in page context.
pub async fn eval(
    State(state): State<AppState>,
    Json(body): Json<EvalBody>,
) -> Result<Json<EvalResponse>, BridgeError> {
    let result = state
        .bridge
        .eval(&body.expression, body.tab_url.as_deref())
        .await?;
    Ok(Json(EvalResponse { ok: true, result }))
}

/// GET /dom - DOM fetch (shadow roots pierced); summary only.
pub async fn dom(
    State(state): State<AppState>,
    Query(query): Query<TabQuery>,
) -> Result<Json<DomResponse>, BridgeError> {
    state.bridge.dom(query.tab_url.as_deref()).await?;
    Ok(Json(DomResponse {
        ok: true,
        dom: "truncated (use the CLI for full output)".to_string(),
    }))
}

/// GET /axtree - accessibility tree fetch; node count only.
pub async fn ax_tree(
    State(state): State<AppState>,
    Query(query): Query<TabQuery>,
) -> Result<Json<AxTreeResponse>, BridgeError> {
    let tree = state.bridge.ax_tree(query.tab_url.as_deref()).await?;
    let nodes = tree
        .get("nodes")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    Ok(Json(AxTreeResponse { ok: true, nodes }))
}

/// POST /agent - delegated agent task.
pub async fn run_agent(
    State(state): State<AppState>,
    Json(body): Json<AgentBody>,
) -> Result<impl IntoResponse, BridgeError> {
    let outcome = state
        .bridge
        .run_agent(&body.task, body.tab_url.as_deref())
        .await?;
    Ok(Json(outcome))
}

/// POST /find - delegated semantic element finding.
pub async fn find_element(
    State(state): State<AppState>,
    Json(body): Json<FindBody>,
) -> Result<Json<FindResponse>, BridgeError> {
    let selector = state
        .bridge
        .find_element(&body.prompt, body.tab_url.as_deref())
        .await?;
    Ok(Json(FindResponse { ok: true, selector }))
}

/// Fallback for unknown routes: advertise what exists.
pub async fn unknown_route() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "unknown route",
            "kind": "unknown_route",
            "endpoints": ENDPOINTS,
        })),
    )
}

// ============================================================================
// Router Configuration
// ============================================================================

/// Builds the request-server router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tabs", get(tabs))
        .route("/state", get(state_report))
        .route("/dom", get(dom))
        .route("/axtree", get(ax_tree))
        .route("/type", post(type_text))
        .route("/click", post(click))
        .route("/eval", post(eval))
        .route("/agent", post(run_agent))
        .route("/find", post(find_element))
        .fallback(unknown_route)
        .with_state(state)
}
