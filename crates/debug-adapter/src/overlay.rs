//! In-page "paused" banner.

use std::time::Duration;

use cdp_adapter::CdpConnection;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const OVERLAY_METHOD: &str = "Overlay.setPausedInDebuggerMessage";

/// Shows the banner on pause and hides it shortly after resume. A pause that arrives
/// within the delay cancels the pending hide, so stepping does not flicker.
#[derive(Debug)]
pub struct PauseOverlay {
    message: Option<String>,
    clear_delay: Duration,
    pending_clear: Mutex<Option<CancellationToken>>,
}

impl PauseOverlay {
    pub fn new(message: Option<String>, clear_delay: Duration) -> Self {
        Self {
            message,
            clear_delay,
            pending_clear: Mutex::new(None),
        }
    }

    pub fn show(&self, connection: &CdpConnection) {
        self.cancel();
        let Some(message) = self.message.clone() else {
            return;
        };
        send_overlay(connection.clone(), json!({ "message": message }));
    }

    pub fn schedule_clear(&self, connection: &CdpConnection) {
        if self.message.is_none() {
            return;
        }
        let token = CancellationToken::new();
        if let Some(previous) = self.pending_clear.lock().replace(token.clone()) {
            previous.cancel();
        }
        let connection = connection.clone();
        let delay = self.clear_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Err(err) = connection.send_command(OVERLAY_METHOD, json!({})).await {
                        debug!(target: "debug-adapter", %err, "overlay clear ignored");
                    }
                }
            }
        });
    }

    pub fn cancel(&self) {
        if let Some(token) = self.pending_clear.lock().take() {
            token.cancel();
        }
    }
}

fn send_overlay(connection: CdpConnection, params: Value) {
    tokio::spawn(async move {
        // node targets have no Overlay domain
        if let Err(err) = connection.send_command(OVERLAY_METHOD, params).await {
            debug!(target: "debug-adapter", %err, "overlay message ignored");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::{CdpConfig, MemoryTransport};
    use std::sync::Arc;

    #[tokio::test]
    async fn quick_repause_cancels_the_clear() {
        let (transport, peer) = MemoryTransport::pair();
        let target = peer.serve(|_, _| Ok(json!({})));
        let connection = CdpConnection::new(Arc::new(transport), CdpConfig::default());
        connection.connect("memory://target").await.expect("connect");

        let overlay = PauseOverlay::new(Some("Paused".into()), Duration::from_millis(50));
        overlay.show(&connection);
        overlay.schedule_clear(&connection);
        overlay.show(&connection);
        tokio::time::sleep(Duration::from_millis(120)).await;

        let sent = target.commands_named(OVERLAY_METHOD);
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|command| command.params["message"] == "Paused"));

        overlay.schedule_clear(&connection);
        tokio::time::sleep(Duration::from_millis(120)).await;
        let sent = target.commands_named(OVERLAY_METHOD);
        assert_eq!(sent.len(), 3);
        assert!(sent[2].params.get("message").is_none());
    }

    #[tokio::test]
    async fn disabled_overlay_sends_nothing() {
        let (transport, peer) = MemoryTransport::pair();
        let target = peer.serve(|_, _| Ok(json!({})));
        let connection = CdpConnection::new(Arc::new(transport), CdpConfig::default());
        connection.connect("memory://target").await.expect("connect");

        let overlay = PauseOverlay::new(None, Duration::from_millis(10));
        overlay.show(&connection);
        overlay.schedule_clear(&connection);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(target.commands().is_empty());
    }
}
