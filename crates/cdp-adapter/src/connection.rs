//! Command/response correlation over one duplex channel.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::CdpConfig;
use crate::error::CdpError;
use crate::metrics;
use crate::protocol::{CdpMessage, CdpRequest};
use crate::transport::{FrameSink, FrameStream, Transport};

/// Subscriber callback. An `Err` or a panic is logged and does not affect other
/// subscribers or the channel.
pub type EventHandler = Arc<dyn Fn(&Value) -> Result<(), CdpError> + Send + Sync>;

enum ChannelState {
    Idle,
    Opening { queued: Vec<String> },
    Open { outbound: mpsc::UnboundedSender<String> },
    Closed,
}

struct PendingCommand {
    method: String,
    started: Instant,
    responder: oneshot::Sender<Result<Value, CdpError>>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: CdpConfig,
    next_id: AtomicU64,
    channel: Mutex<ChannelState>,
    pending: Mutex<HashMap<u64, PendingCommand>>,
    subscribers: RwLock<HashMap<String, Vec<EventHandler>>>,
    closed: CancellationToken,
}

/// Handle to a target connection. Clones share the same channel.
#[derive(Clone)]
pub struct CdpConnection {
    inner: Arc<Inner>,
}

impl CdpConnection {
    pub fn new(transport: Arc<dyn Transport>, config: CdpConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                next_id: AtomicU64::new(1),
                channel: Mutex::new(ChannelState::Idle),
                pending: Mutex::new(HashMap::new()),
                subscribers: RwLock::new(HashMap::new()),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Opens the channel. Commands sent while this is in progress are queued and flushed
    /// in issuance order once the channel is up.
    pub async fn connect(&self, endpoint: &str) -> Result<(), CdpError> {
        {
            let mut channel = self.inner.channel.lock();
            match &*channel {
                ChannelState::Idle => {
                    *channel = ChannelState::Opening { queued: Vec::new() };
                }
                ChannelState::Opening { .. } | ChannelState::Open { .. } => {
                    return Err(CdpError::transport("connect already in progress"));
                }
                ChannelState::Closed => return Err(CdpError::Closed),
            }
        }

        let timeout = self.inner.config.connect_timeout();
        let opened = match tokio::time::timeout(timeout, self.inner.transport.open(endpoint)).await
        {
            Ok(result) => result,
            Err(_) => Err(CdpError::ConnectTimeout(endpoint.to_string())),
        };

        let (sink, stream) = match opened {
            Ok(halves) => halves,
            Err(err) => {
                warn!(target: "cdp-connection", endpoint, %err, "failed to open channel");
                self.inner.shutdown(err.clone());
                return Err(err);
            }
        };

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(sink, outbound_rx, self.inner.closed.clone()));

        {
            let mut channel = self.inner.channel.lock();
            let queued = match std::mem::replace(&mut *channel, ChannelState::Closed) {
                ChannelState::Opening { queued } => queued,
                // close() won the race while the transport was opening
                _ => return Err(CdpError::Closed),
            };
            if !queued.is_empty() {
                debug!(target: "cdp-connection", count = queued.len(), "flushing queued commands");
            }
            for frame in queued {
                let _ = outbound.send(frame);
            }
            *channel = ChannelState::Open { outbound };
        }

        tokio::spawn(read_loop(Arc::clone(&self.inner), stream));
        info!(target: "cdp-connection", endpoint, "connected to target");
        Ok(())
    }

    /// Sends one command and waits for its correlated response, without a deadline.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, CdpError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_string(&CdpRequest {
            id,
            method,
            params: &params,
        })?;

        let (responder, response) = oneshot::channel();
        self.inner.pending.lock().insert(
            id,
            PendingCommand {
                method: method.to_string(),
                started: Instant::now(),
                responder,
            },
        );

        let enqueued = {
            let mut channel = self.inner.channel.lock();
            match &mut *channel {
                ChannelState::Idle => Err(CdpError::NotOpen),
                ChannelState::Closed => Err(CdpError::Closed),
                ChannelState::Opening { queued } => {
                    queued.push(frame);
                    Ok(())
                }
                ChannelState::Open { outbound } => {
                    outbound.send(frame).map_err(|_| CdpError::Closed)
                }
            }
        };
        if let Err(err) = enqueued {
            self.inner.pending.lock().remove(&id);
            return Err(err);
        }

        metrics::record_command(method);
        trace!(target: "cdp-connection", id, method, "command queued");

        match response.await {
            Ok(result) => result,
            Err(_) => Err(CdpError::Closed),
        }
    }

    /// Typed variant of [`CdpConnection::send_command`].
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, CdpError> {
        let value = self.send_command(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Subscribes to a notification by method name.
    pub fn on<F>(&self, method: &str, handler: F)
    where
        F: Fn(&Value) -> Result<(), CdpError> + Send + Sync + 'static,
    {
        self.inner
            .subscribers
            .write()
            .entry(method.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Closes the channel. In-flight commands fail with [`CdpError::Closed`]; responses
    /// that arrive later are discarded.
    pub fn close(&self) {
        self.inner.shutdown(CdpError::Closed);
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.inner.channel.lock(), ChannelState::Open { .. })
    }

    /// Cancelled once the channel is gone, whether closed locally or by the peer.
    pub fn closed(&self) -> CancellationToken {
        self.inner.closed.clone()
    }
}

impl Inner {
    fn shutdown(&self, reason: CdpError) {
        {
            let mut channel = self.channel.lock();
            if matches!(*channel, ChannelState::Closed) && self.closed.is_cancelled() {
                return;
            }
            *channel = ChannelState::Closed;
        }
        self.closed.cancel();

        let drained: Vec<PendingCommand> = self.pending.lock().drain().map(|(_, p)| p).collect();
        if !drained.is_empty() {
            debug!(target: "cdp-connection", count = drained.len(), %reason, "failing in-flight commands");
        }
        for pending in drained {
            metrics::record_command_failure(&pending.method);
            let _ = pending.responder.send(Err(reason.clone()));
        }
    }

    fn handle_frame(&self, frame: &str) {
        let message: CdpMessage = match serde_json::from_str(frame) {
            Ok(message) => message,
            Err(err) => {
                metrics::record_malformed();
                warn!(target: "cdp-connection", %err, "dropping malformed message");
                return;
            }
        };

        if let Some(id) = message.id {
            self.complete(id, message);
        } else if let Some(method) = message.method {
            self.dispatch_event(&method, &message.params);
        } else {
            metrics::record_malformed();
            warn!(target: "cdp-connection", "message has neither id nor method");
        }
    }

    fn complete(&self, id: u64, message: CdpMessage) {
        let Some(pending) = self.pending.lock().remove(&id) else {
            metrics::record_unmatched();
            warn!(target: "cdp-connection", id, "response for unknown command id");
            return;
        };

        let result = match message.error {
            Some(error) => {
                metrics::record_command_failure(&pending.method);
                debug!(
                    target: "cdp-connection",
                    id,
                    method = %pending.method,
                    code = error.code,
                    message = %error.message,
                    "command rejected"
                );
                Err(CdpError::Command {
                    code: error.code,
                    message: error.message,
                })
            }
            None => {
                metrics::record_command_success(&pending.method, pending.started.elapsed());
                Ok(message.result.unwrap_or(Value::Null))
            }
        };
        let _ = pending.responder.send(result);
    }

    fn dispatch_event(&self, method: &str, params: &Value) {
        metrics::record_event(method);
        let handlers: Vec<EventHandler> = self
            .subscribers
            .read()
            .get(method)
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            trace!(target: "cdp-connection", method, "no subscribers");
            return;
        }

        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(params))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(target: "cdp-connection", method, %err, "event subscriber failed");
                }
                Err(_) => {
                    error!(target: "cdp-connection", method, "event subscriber panicked");
                }
            }
        }
    }
}

async fn write_loop(
    mut sink: FrameSink,
    mut outbound: mpsc::UnboundedReceiver<String>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(err) = sink.send(frame).await {
                    warn!(target: "cdp-connection", %err, "write failed");
                    closed.cancel();
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(inner: Arc<Inner>, mut stream: FrameStream) {
    let reason = loop {
        tokio::select! {
            _ = inner.closed.cancelled() => break CdpError::Closed,
            frame = stream.next() => match frame {
                Some(Ok(frame)) => {
                    trace!(target: "cdp-connection", %frame, "recv");
                    inner.handle_frame(&frame);
                }
                Some(Err(err)) => {
                    warn!(target: "cdp-connection", %err, "read failed");
                    break err;
                }
                None => {
                    info!(target: "cdp-connection", "target closed the channel");
                    break CdpError::Closed;
                }
            }
        }
    };
    inner.shutdown(reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn connection(transport: MemoryTransport) -> CdpConnection {
        CdpConnection::new(Arc::new(transport), CdpConfig::default())
    }

    #[tokio::test]
    async fn command_before_connect_is_rejected() {
        let (transport, _peer) = MemoryTransport::pair();
        let conn = connection(transport);
        let err = conn
            .send_command("Debugger.enable", json!({}))
            .await
            .expect_err("not open");
        assert_eq!(err, CdpError::NotOpen);
    }

    #[tokio::test]
    async fn responses_are_correlated_by_id() {
        let (transport, mut peer) = MemoryTransport::pair();
        let conn = connection(transport);
        conn.connect("memory://target").await.expect("connect");

        let first = tokio::spawn({
            let conn = conn.clone();
            async move { conn.send_command("Runtime.evaluate", json!({"expression": "1"})).await }
        });
        let second = tokio::spawn({
            let conn = conn.clone();
            async move { conn.send_command("Runtime.evaluate", json!({"expression": "2"})).await }
        });

        let a = peer.next_command().await.expect("first command");
        let b = peer.next_command().await.expect("second command");
        assert_ne!(a.id, b.id);
        // answer out of order
        peer.respond(b.id, json!({"tag": b.params["expression"].clone()}));
        peer.respond(a.id, json!({"tag": a.params["expression"].clone()}));

        assert_eq!(first.await.unwrap().unwrap()["tag"], "1");
        assert_eq!(second.await.unwrap().unwrap()["tag"], "2");
    }

    #[tokio::test]
    async fn command_ids_increase_monotonically() {
        let (transport, peer) = MemoryTransport::pair();
        let conn = connection(transport);
        conn.connect("memory://target").await.expect("connect");
        let target = peer.serve(|_, _| Ok(json!({})));
        for _ in 0..3 {
            conn.send_command("Debugger.resume", json!({})).await.expect("resume");
        }
        let ids: Vec<u64> = target.commands().iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn target_error_becomes_command_failure() {
        let (transport, peer) = MemoryTransport::pair();
        let conn = connection(transport);
        conn.connect("memory://target").await.expect("connect");
        let _target = peer.serve(|_, _| Err((-32000, "Could not resolve breakpoint".into())));
        let err = conn
            .send_command("Debugger.setBreakpoint", json!({}))
            .await
            .expect_err("rejected");
        assert!(!err.is_connection());
        assert_eq!(
            err,
            CdpError::Command {
                code: -32000,
                message: "Could not resolve breakpoint".into()
            }
        );
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn commands_issued_while_opening_flush_in_order() {
        let (transport, mut peer) = MemoryTransport::pair();
        let gate = transport.hold_open();
        let conn = connection(transport);

        let connecting = tokio::spawn({
            let conn = conn.clone();
            async move { conn.connect("memory://target").await }
        });
        tokio::task::yield_now().await;

        let mut sends = Vec::new();
        for name in ["Debugger.enable", "Runtime.enable", "Debugger.setPauseOnExceptions"] {
            let conn = conn.clone();
            sends.push(tokio::spawn(async move {
                conn.send_command(name, json!({})).await
            }));
            tokio::task::yield_now().await;
        }

        let _ = gate.send(());
        connecting.await.unwrap().expect("connect");

        let mut seen = Vec::new();
        for _ in 0..3 {
            let command = peer.next_command().await.expect("flushed command");
            seen.push(command.method.clone());
            peer.respond(command.id, json!({}));
        }
        assert_eq!(
            seen,
            vec!["Debugger.enable", "Runtime.enable", "Debugger.setPauseOnExceptions"]
        );
        for send in sends {
            send.await.unwrap().expect("response");
        }
    }

    #[tokio::test]
    async fn malformed_and_unmatched_messages_keep_channel_open() {
        let (transport, peer) = MemoryTransport::pair();
        let conn = connection(transport);
        conn.connect("memory://target").await.expect("connect");
        let target = peer.serve(|_, _| Ok(json!({"ok": true})));

        target.send_raw("{not json");
        target.send_raw(r#"{"id": 999999, "result": {}}"#);
        let value = conn
            .send_command("Debugger.enable", json!({}))
            .await
            .expect("still usable");
        assert_eq!(value["ok"], true);
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_starve_others() {
        let (transport, peer) = MemoryTransport::pair();
        let conn = connection(transport);
        let delivered = Arc::new(AtomicUsize::new(0));

        conn.on("Debugger.paused", |_| Err(CdpError::transport("boom")));
        conn.on("Debugger.paused", |_| panic!("subscriber bug"));
        {
            let delivered = delivered.clone();
            conn.on("Debugger.paused", move |params| {
                assert_eq!(params["reason"], "other");
                delivered.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        conn.connect("memory://target").await.expect("connect");
        let target = peer.serve(|_, _| Ok(json!({})));
        target.emit("Debugger.paused", json!({"reason": "other", "callFrames": []}));
        target.emit("Debugger.paused", json!({"reason": "other", "callFrames": []}));
        // a round trip guarantees both events were processed first
        conn.send_command("Debugger.resume", json!({})).await.expect("resume");

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn peer_close_fails_in_flight_commands_and_cancels_token() {
        let (transport, mut peer) = MemoryTransport::pair();
        let conn = connection(transport);
        conn.connect("memory://target").await.expect("connect");
        let closed = conn.closed();

        let in_flight = tokio::spawn({
            let conn = conn.clone();
            async move { conn.send_command("Debugger.getScriptSource", json!({})).await }
        });
        peer.next_command().await.expect("command reached target");
        peer.close();

        closed.cancelled().await;
        assert_eq!(in_flight.await.unwrap(), Err(CdpError::Closed));
        assert!(!conn.is_open());
        let err = conn
            .send_command("Debugger.resume", json!({}))
            .await
            .expect_err("closed");
        assert_eq!(err, CdpError::Closed);
    }

    #[tokio::test]
    async fn connect_times_out_when_transport_hangs() {
        let (transport, _peer) = MemoryTransport::pair();
        let _gate = transport.hold_open();
        let conn = CdpConnection::new(
            Arc::new(transport),
            CdpConfig {
                connect_timeout_ms: 20,
                ..CdpConfig::default()
            },
        );
        let err = conn.connect("memory://stuck").await.expect_err("timeout");
        assert_eq!(err, CdpError::ConnectTimeout("memory://stuck".into()));
        assert!(conn.closed().is_cancelled());
    }
}
