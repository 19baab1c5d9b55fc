use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ErrorResponse;
use crate::events::AdapterEvent;
use crate::requests::RequestArgs;
use crate::responses::ResponseBody;

/// Channel the adapter pushes its events into.
pub type EventSink = mpsc::UnboundedSender<AdapterEvent>;

/// The session the pipeline wraps.
///
/// `dispatch` receives arguments already rewritten by every transformer; `seq` is the
/// client sequence number of the originating request.
#[async_trait]
pub trait DebugAdapter: Send + Sync {
    fn register_event_sink(&self, sink: EventSink);

    async fn dispatch(&self, seq: i64, args: RequestArgs) -> Result<ResponseBody, ErrorResponse>;
}
