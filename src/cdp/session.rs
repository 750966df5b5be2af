//! Persistent protocol channel to one tab's debugger endpoint.
//!
//! A [`CdpSession`] owns a websocket connection for the duration of one
//! bridge operation. Commands are framed JSON with a monotonically
//! increasing id; a background reader task correlates responses back to the
//! waiting caller by that id and discards out-of-band protocol
//! notifications. Sessions are not pooled — the façade opens one per
//! operation and closes it on every exit path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::cdp::tab::Tab;
use crate::error::{BridgeError, BridgeResult};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// What the reader task hands back for one command id.
enum Reply {
    Result(Value),
    Error { code: i64, message: String },
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Timeouts governing one session.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Websocket handshake timeout.
    pub connect_timeout: Duration,
    /// Per-command response timeout.
    pub command_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// A live connection to one tab's debugger endpoint.
pub struct CdpSession {
    sink: tokio::sync::Mutex<WsSink>,
    pending: PendingMap,
    next_id: AtomicU64,
    command_timeout: Duration,
    reader: JoinHandle<()>,
    ws_url: String,
}

impl std::fmt::Debug for CdpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpSession")
            .field("command_timeout", &self.command_timeout)
            .field("ws_url", &self.ws_url)
            .finish_non_exhaustive()
    }
}

impl CdpSession {
    /// Opens a session to the given tab.
    ///
    /// Fails with [`BridgeError::ConnectFailed`] when the tab exposes no
    /// debugger address, when the handshake errors, or when it exceeds the
    /// connect timeout.
    pub async fn connect(tab: &Tab, config: &SessionConfig) -> BridgeResult<Self> {
        let ws_url = tab
            .ws_url
            .as_deref()
            .ok_or_else(|| BridgeError::ConnectFailed {
                url: tab.url.clone(),
                message: "target exposes no webSocketDebuggerUrl".to_string(),
            })?;
        Self::connect_url(ws_url, config).await
    }

    /// Opens a session to an explicit websocket debugger URL.
    pub async fn connect_url(ws_url: &str, config: &SessionConfig) -> BridgeResult<Self> {
        let connect_failed = |message: String| BridgeError::ConnectFailed {
            url: ws_url.to_string(),
            message,
        };

        let (stream, _) = tokio::time::timeout(config.connect_timeout, connect_async(ws_url))
            .await
            .map_err(|_| {
                connect_failed(format!(
                    "handshake timed out after {}ms",
                    config.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| connect_failed(e.to_string()))?;

        debug!(url = %ws_url, "debugger channel open");

        let (sink, source) = stream.split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_loop(source, pending.clone()));

        Ok(Self {
            sink: tokio::sync::Mutex::new(sink),
            pending,
            next_id: AtomicU64::new(1),
            command_timeout: config.command_timeout,
            reader,
            ws_url: ws_url.to_string(),
        })
    }

    /// The websocket URL this session is bound to.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Sends one protocol command and waits for its correlated response.
    ///
    /// Returns the command's `result` object on success. Ids are assigned
    /// from a monotonic counter and never reused within the session.
    pub async fn send(&self, method: &str, params: Value) -> BridgeResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = serde_json::json!({
            "id": id,
            "method": method,
            "params": params,
        });

        {
            let mut sink = self.sink.lock().await;
            if let Err(err) = sink.send(Message::Text(frame.to_string())).await {
                self.pending.lock().remove(&id);
                debug!(%err, method, "failed to transmit command");
                return Err(BridgeError::ConnectionLost);
            }
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(Reply::Result(value))) => Ok(value),
            Ok(Ok(Reply::Error { code, message })) => Err(BridgeError::CommandFailed {
                method: method.to_string(),
                code,
                message,
            }),
            Ok(Err(_)) => Err(BridgeError::ConnectionLost),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(BridgeError::CommandTimeout {
                    method: method.to_string(),
                    timeout_ms: self.command_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Releases the channel. Safe to call on any exit path; outstanding
    /// commands observe [`BridgeError::ConnectionLost`].
    pub async fn close(self) {
        {
            let mut sink = self.sink.lock().await;
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.flush().await;
        }
        self.reader.abort();
        self.pending.lock().clear();
        debug!(url = %self.ws_url, "debugger channel closed");
    }
}

/// Reads frames until the channel ends, routing responses by id.
///
/// Frames carrying a `method` but no `id` are protocol notifications; the
/// bridge subscribes to none, so they are logged at trace level and
/// discarded without disturbing command correlation.
async fn read_loop(mut source: WsSource, pending: PendingMap) {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => route_frame(&pending, &text),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "debugger channel read error");
                break;
            }
        }
    }
    // Dropping the senders wakes every waiter with ConnectionLost.
    pending.lock().clear();
}

fn route_frame(pending: &Mutex<HashMap<u64, oneshot::Sender<Reply>>>, text: &str) {
    let msg: Value = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(err) => {
            warn!(%err, "discarding unparseable protocol frame");
            return;
        }
    };

    if let Some(id) = msg.get("id").and_then(Value::as_u64) {
        let Some(tx) = pending.lock().remove(&id) else {
            trace!(id, "response for unknown command id");
            return;
        };
        let reply = match msg.get("error") {
            Some(error) => Reply::Error {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown protocol error")
                    .to_string(),
            },
            None => Reply::Result(msg.get("result").cloned().unwrap_or(Value::Null)),
        };
        let _ = tx.send(reply);
    } else if let Some(method) = msg.get("method").and_then(Value::as_str) {
        trace!(method, "discarding protocol notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// What the fake endpoint does with each incoming command.
    #[derive(Clone, Copy)]
    enum FakeBehavior {
        /// Echo `{"id": .., "result": {"echo": <method>}}`, preceded by an
        /// unrelated notification frame.
        EchoWithNoise,
        /// Read commands but never answer them.
        Silent,
        /// Answer every command with a protocol error object.
        ProtocolError,
    }

    /// In-process debugger endpoint. Records every received text frame and
    /// a `<closed>` marker when the peer goes away.
    async fn spawn_fake_endpoint(
        behavior: FakeBehavior,
    ) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    loop {
                        match ws.next().await {
                            Some(Ok(Message::Text(text))) => {
                                tx.send(text.clone()).ok();
                                let cmd: Value = serde_json::from_str(&text).unwrap();
                                let id = cmd["id"].as_u64().unwrap();
                                let method = cmd["method"].as_str().unwrap_or("").to_string();
                                match behavior {
                                    FakeBehavior::EchoWithNoise => {
                                        let noise = json!({
                                            "method": "Page.frameNavigated",
                                            "params": {"frame": {"id": "F1"}},
                                        });
                                        ws.send(Message::Text(noise.to_string())).await.ok();
                                        let reply =
                                            json!({"id": id, "result": {"echo": method}});
                                        ws.send(Message::Text(reply.to_string())).await.ok();
                                    }
                                    FakeBehavior::Silent => {}
                                    FakeBehavior::ProtocolError => {
                                        let reply = json!({
                                            "id": id,
                                            "error": {"code": -32000, "message": "nope"},
                                        });
                                        ws.send(Message::Text(reply.to_string())).await.ok();
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tx.send("<closed>".to_string()).ok();
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(_)) => {
                                tx.send("<closed>".to_string()).ok();
                                break;
                            }
                        }
                    }
                });
            }
        });

        (format!("ws://{addr}/devtools/page/TEST"), rx)
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_millis(250),
        }
    }

    #[tokio::test]
    async fn test_send_correlates_past_notifications() {
        let (url, _rx) = spawn_fake_endpoint(FakeBehavior::EchoWithNoise).await;
        let session = CdpSession::connect_url(&url, &fast_config()).await.unwrap();

        // The noise notification arrives before each response; correlation
        // must skip it and still deliver the right result.
        let result = session.send("DOM.enable", json!({})).await.unwrap();
        assert_eq!(result["echo"], "DOM.enable");

        let result = session.send("Runtime.evaluate", json!({})).await.unwrap();
        assert_eq!(result["echo"], "Runtime.evaluate");

        session.close().await;
    }

    #[tokio::test]
    async fn test_command_ids_are_monotonic_and_unique() {
        let (url, mut rx) = spawn_fake_endpoint(FakeBehavior::EchoWithNoise).await;
        let session = CdpSession::connect_url(&url, &fast_config()).await.unwrap();

        for _ in 0..3 {
            session.send("Input.dispatchKeyEvent", json!({})).await.unwrap();
        }
        session.close().await;

        let mut ids = Vec::new();
        while let Some(frame) = rx.recv().await {
            if frame == "<closed>" {
                break;
            }
            let cmd: Value = serde_json::from_str(&frame).unwrap();
            ids.push(cmd["id"].as_u64().unwrap());
        }
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_silent_endpoint_times_out() {
        let (url, _rx) = spawn_fake_endpoint(FakeBehavior::Silent).await;
        let session = CdpSession::connect_url(&url, &fast_config()).await.unwrap();

        let err = session.send("Page.enable", json!({})).await.unwrap_err();
        match err {
            BridgeError::CommandTimeout { method, .. } => assert_eq!(method, "Page.enable"),
            other => panic!("expected CommandTimeout, got {other:?}"),
        }
        session.close().await;
    }

    #[tokio::test]
    async fn test_protocol_error_surfaces_as_command_failed() {
        let (url, _rx) = spawn_fake_endpoint(FakeBehavior::ProtocolError).await;
        let session = CdpSession::connect_url(&url, &fast_config()).await.unwrap();

        let err = session.send("DOM.getDocument", json!({})).await.unwrap_err();
        match err {
            BridgeError::CommandFailed { code, message, .. } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "nope");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
        session.close().await;
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = CdpSession::connect_url(&format!("ws://{addr}/devtools/page/X"), &fast_config())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "connect_failed");
    }

    #[tokio::test]
    async fn test_connect_requires_debugger_url() {
        let tab = Tab {
            id: "A".to_string(),
            url: "https://x.com".to_string(),
            title: String::new(),
            target_type: "page".to_string(),
            ws_url: None,
        };
        let err = CdpSession::connect(&tab, &fast_config()).await.unwrap_err();
        assert_eq!(err.kind(), "connect_failed");
    }

    #[tokio::test]
    async fn test_close_reaches_the_endpoint() {
        let (url, mut rx) = spawn_fake_endpoint(FakeBehavior::EchoWithNoise).await;
        let session = CdpSession::connect_url(&url, &fast_config()).await.unwrap();
        session.send("DOM.enable", json!({})).await.unwrap();
        session.close().await;

        let mut saw_close = false;
        while let Ok(frame) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            match frame {
                Some(frame) if frame == "<closed>" => {
                    saw_close = true;
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }
        assert!(saw_close, "endpoint never observed the channel closing");
    }
}
