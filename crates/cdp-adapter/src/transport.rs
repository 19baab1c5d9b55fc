use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, trace, warn};

use crate::error::CdpError;
use crate::metrics;

/// Outbound half of an open channel; one item per protocol message.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = CdpError> + Send>>;
/// Inbound half of an open channel. The stream ends when the peer goes away.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, CdpError>> + Send>>;

/// Opens message-framed duplex channels.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<(FrameSink, FrameStream), CdpError>;
}

/// Text-frame websocket transport.
#[derive(Clone, Debug, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, endpoint: &str) -> Result<(FrameSink, FrameStream), CdpError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(CdpError::transport)?;
        debug!(target: "cdp-connection", endpoint, "websocket established");

        let (ws_sink, ws_source) = ws_stream.split();

        let sink = ws_sink
            .sink_map_err(CdpError::transport)
            .with(|frame: String| {
                trace!(target: "cdp-connection", %frame, "send");
                future::ok::<Message, CdpError>(Message::Text(frame.into()))
            });

        let stream = ws_source.filter_map(|message| future::ready(inbound_frame(message)));

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// Maps one websocket message to a protocol frame. Only socket errors end the stream; a
/// binary frame that is not UTF-8 is dropped like any other malformed message.
fn inbound_frame(
    message: Result<Message, tungstenite::Error>,
) -> Option<Result<String, CdpError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(frame) => Some(Ok(frame)),
            Err(err) => {
                metrics::record_malformed();
                warn!(target: "cdp-connection", len = bytes.len(), %err, "dropping undecodable binary frame");
                None
            }
        },
        Ok(Message::Close(frame)) => {
            debug!(target: "cdp-connection", ?frame, "websocket close frame");
            None
        }
        Ok(_) => None,
        Err(err) => Some(Err(CdpError::transport(err))),
    }
}
