//! Mouse event dispatch over the protocol channel.

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::cdp::CdpSession;
use crate::error::BridgeResult;

/// Pause between press and release so pages register a deliberate click.
const CLICK_HOLD: Duration = Duration::from_millis(20);

/// Dispatches trusted mouse events on one session.
pub struct Mouse<'a> {
    session: &'a CdpSession,
}

impl<'a> Mouse<'a> {
    /// Creates a dispatcher bound to the session.
    pub fn new(session: &'a CdpSession) -> Self {
        Self { session }
    }

    /// Left-clicks at viewport coordinates via `Input.dispatchMouseEvent`.
    pub async fn click(&self, x: i64, y: i64) -> BridgeResult<()> {
        for event_type in ["mousePressed", "mouseReleased"] {
            self.session
                .send(
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": event_type,
                        "x": x,
                        "y": y,
                        "button": "left",
                        "clickCount": 1,
                    }),
                )
                .await?;
            tokio::time::sleep(CLICK_HOLD).await;
        }
        debug!(x, y, "clicked");
        Ok(())
    }
}
