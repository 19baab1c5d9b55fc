//! Client-facing protocol loop.
//!
//! Messages are framed by a `Content-Length` header block. Requests are dispatched
//! concurrently so one parked request never blocks the others; a single writer task
//! owns the output stream and stamps outgoing sequence numbers in write order.

use std::sync::Arc;

use adapter_proxy::AdapterProxy;
use bridge_core_types::{DebugAdapter, Event, Request, Response};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed header: {0}")]
    Header(String),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Largest payload a client may announce. Larger headers are rejected before anything
/// is allocated.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

enum Outgoing {
    Response(Response),
    Event(Event),
}

/// Reads one framed message. `Ok(None)` is a clean end of stream between messages.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ServerError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            if saw_header {
                return Err(ServerError::Header("stream ended inside a header block".into()));
            }
            return Ok(None);
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if saw_header {
                break;
            }
            continue;
        }
        saw_header = true;
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                let length = value
                    .trim()
                    .parse()
                    .map_err(|_| ServerError::Header(format!("bad content length {value:?}")))?;
                content_length = Some(length);
            }
        }
    }

    let length =
        content_length.ok_or_else(|| ServerError::Header("missing Content-Length".into()))?;
    if length > MAX_MESSAGE_BYTES {
        return Err(ServerError::Header(format!(
            "content length {length} exceeds {MAX_MESSAGE_BYTES} bytes"
        )));
    }
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    writer
        .write_all(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes())
        .await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

async fn write_loop<W>(mut writer: W, mut outgoing: mpsc::UnboundedReceiver<Outgoing>)
where
    W: AsyncWrite + Unpin,
{
    let mut seq = 0i64;
    while let Some(message) = outgoing.recv().await {
        seq += 1;
        let result = match message {
            Outgoing::Response(mut response) => {
                response.seq = seq;
                trace!(target: "dap-server", seq, request_seq = response.request_seq, command = %response.command, success = response.success, "response");
                write_message(&mut writer, &response).await
            }
            Outgoing::Event(mut event) => {
                event.seq = seq;
                trace!(target: "dap-server", seq, event = %event.event, "event");
                write_message(&mut writer, &event).await
            }
        };
        if let Err(err) = result {
            warn!(target: "dap-server", %err, "client output failed, stopping writer");
            break;
        }
    }
}

/// Serves one client until it disconnects or closes its input.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    adapter: Arc<dyn DebugAdapter>,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(writer, out_rx));

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Event>();
    let proxy = Arc::new(AdapterProxy::with_default_chain(adapter, events_tx));
    let forward = {
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if out_tx.send(Outgoing::Event(event)).is_err() {
                    break;
                }
            }
        })
    };

    let mut reader = BufReader::new(reader);
    let mut in_flight = JoinSet::new();
    let outcome = loop {
        let payload = match read_message(&mut reader).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!(target: "dap-server", "client closed the stream");
                break Ok(());
            }
            Err(err) => break Err(err),
        };
        let request: Request = match serde_json::from_slice(&payload) {
            Ok(request) => request,
            Err(err) => {
                warn!(target: "dap-server", %err, "dropping unreadable message");
                continue;
            }
        };
        if request.kind != "request" {
            debug!(target: "dap-server", kind = %request.kind, "ignoring non-request message");
            continue;
        }
        debug!(target: "dap-server", seq = request.seq, command = %request.command, "request");

        if request.command == "disconnect" {
            let response = proxy.dispatch_request(request).await;
            let _ = out_tx.send(Outgoing::Response(response));
            break Ok(());
        }
        let proxy = Arc::clone(&proxy);
        let out_tx = out_tx.clone();
        in_flight.spawn(async move {
            let response = proxy.dispatch_request(request).await;
            let _ = out_tx.send(Outgoing::Response(response));
        });
        while in_flight.try_join_next().is_some() {}
    };

    in_flight.abort_all();
    while in_flight.join_next().await.is_some() {}
    drop(proxy);
    forward.abort();
    let _ = forward.await;
    drop(out_tx);
    if let Err(err) = writer.await {
        warn!(target: "dap-server", %err, "writer task failed");
    }
    outcome
}
