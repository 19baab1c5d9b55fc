use std::sync::Arc;

use bridge_core_types::{
    AdapterEvent, Command, DebugAdapter, ErrorResponse, Event, Request, RequestArgs, Response,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::line_numbers::LineNumberTransformer;
use crate::path_mapping::PathTransformer;
use crate::source_mapping::SourceMapTransformer;
use crate::transformer::Transformer;

/// Runs client traffic through an ordered transformer chain around a debug adapter.
///
/// Adapter events are pumped on their own task, in emission order, through the chain in
/// reverse; internal events stop at the proxy, everything else goes to `client_events`.
pub struct AdapterProxy {
    transformers: Arc<[Arc<dyn Transformer>]>,
    adapter: Arc<dyn DebugAdapter>,
    pump: JoinHandle<()>,
}

impl AdapterProxy {
    /// Must be called inside a tokio runtime.
    pub fn new(
        transformers: Vec<Arc<dyn Transformer>>,
        adapter: Arc<dyn DebugAdapter>,
        client_events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let transformers: Arc<[Arc<dyn Transformer>]> = transformers.into();
        let (sink, events) = mpsc::unbounded_channel();
        adapter.register_event_sink(sink);
        let pump = tokio::spawn(pump_events(Arc::clone(&transformers), events, client_events));
        Self {
            transformers,
            adapter,
            pump,
        }
    }

    /// Line numbering, then source maps, then target paths.
    pub fn with_default_chain(
        adapter: Arc<dyn DebugAdapter>,
        client_events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self::new(default_chain(), adapter, client_events)
    }

    pub async fn dispatch_request(&self, request: Request) -> Response {
        let Some(command) = Command::from_name(&request.command) else {
            debug!(target: "adapter-proxy", command = %request.command, "unrecognized request");
            return Response::error(&request, ErrorResponse::unknown_command(&request.command));
        };
        let mut args = match RequestArgs::parse(command, request.arguments.clone()) {
            Ok(args) => args,
            Err(err) => {
                return Response::error(
                    &request,
                    ErrorResponse::invalid_arguments(&request.command, &err),
                )
            }
        };

        for transformer in self.transformers.iter() {
            if let Err(err) = transformer.transform_request(request.seq, &mut args).await {
                debug!(
                    target: "adapter-proxy",
                    seq = request.seq,
                    transformer = transformer.name(),
                    %err,
                    "request rejected by transformer"
                );
                self.discard(request.seq);
                return Response::error(&request, err.into());
            }
        }

        match self.adapter.dispatch(request.seq, args).await {
            Ok(mut body) => {
                for transformer in self.transformers.iter().rev() {
                    if let Err(err) = transformer.transform_response(request.seq, &mut body).await {
                        warn!(
                            target: "adapter-proxy",
                            seq = request.seq,
                            transformer = transformer.name(),
                            %err,
                            "response transform failed"
                        );
                    }
                }
                Response::success(&request, body.into_value())
            }
            Err(err) => {
                self.discard(request.seq);
                Response::error(&request, err)
            }
        }
    }

    fn discard(&self, seq: i64) {
        for transformer in self.transformers.iter() {
            transformer.discard_request(seq);
        }
    }
}

impl Drop for AdapterProxy {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

pub fn default_chain() -> Vec<Arc<dyn Transformer>> {
    vec![
        Arc::new(LineNumberTransformer::new()),
        Arc::new(SourceMapTransformer::new()),
        Arc::new(PathTransformer::new()),
    ]
}

async fn pump_events(
    transformers: Arc<[Arc<dyn Transformer>]>,
    mut events: mpsc::UnboundedReceiver<AdapterEvent>,
    client_events: mpsc::UnboundedSender<Event>,
) {
    while let Some(mut event) = events.recv().await {
        for transformer in transformers.iter().rev() {
            if let Err(err) = transformer.transform_event(&mut event).await {
                warn!(
                    target: "adapter-proxy",
                    event = event.name(),
                    transformer = transformer.name(),
                    %err,
                    "event transform failed"
                );
            }
        }
        if let Some(event) = event.into_event() {
            if client_events.send(event).is_err() {
                debug!(target: "adapter-proxy", "client gone, stopping event pump");
                break;
            }
        }
    }
}
