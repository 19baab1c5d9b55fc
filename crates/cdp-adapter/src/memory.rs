//! In-memory transport for tests.
//!
//! [`MemoryTransport::pair`] returns the transport half the connection opens and a
//! [`MemoryPeer`] that plays the target: it reads the commands the connection sends and
//! writes responses and notifications back. [`MemoryPeer::serve`] turns the peer into a
//! [`ScriptedTarget`] that answers every command through a responder closure.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::CdpError;
use crate::transport::{FrameSink, FrameStream, Transport};

type ToTarget = fmpsc::UnboundedReceiver<String>;
type FromTarget = fmpsc::UnboundedSender<Result<String, CdpError>>;

struct Halves {
    to_target: fmpsc::UnboundedSender<String>,
    from_target: fmpsc::UnboundedReceiver<Result<String, CdpError>>,
}

pub struct MemoryTransport {
    halves: Mutex<Option<Halves>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MemoryTransport {
    pub fn pair() -> (Self, MemoryPeer) {
        let (to_target, incoming) = fmpsc::unbounded();
        let (outgoing, from_target) = fmpsc::unbounded();
        (
            Self {
                halves: Mutex::new(Some(Halves {
                    to_target,
                    from_target,
                })),
                gate: Mutex::new(None),
            },
            MemoryPeer { incoming, outgoing },
        )
    }

    /// Makes `open` wait until the returned sender fires (or is dropped).
    pub fn hold_open(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock() = Some(rx);
        tx
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, _endpoint: &str) -> Result<(FrameSink, FrameStream), CdpError> {
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let halves = self
            .halves
            .lock()
            .take()
            .ok_or_else(|| CdpError::transport("memory transport already opened"))?;
        let sink = halves.to_target.sink_map_err(CdpError::transport);
        Ok((Box::pin(sink), Box::pin(halves.from_target)))
    }
}

/// A command as the target received it.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCommand {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

fn parse_command(frame: &str) -> Option<RecordedCommand> {
    let value: Value = serde_json::from_str(frame).ok()?;
    Some(RecordedCommand {
        id: value.get("id")?.as_u64()?,
        method: value.get("method")?.as_str()?.to_string(),
        params: value.get("params").cloned().unwrap_or(Value::Null),
    })
}

fn response_frame(id: u64, result: Result<Value, (i64, String)>) -> String {
    match result {
        Ok(result) => json!({ "id": id, "result": result }).to_string(),
        Err((code, message)) => {
            json!({ "id": id, "error": { "code": code, "message": message } }).to_string()
        }
    }
}

pub struct MemoryPeer {
    incoming: ToTarget,
    outgoing: FromTarget,
}

impl MemoryPeer {
    pub async fn next_command(&mut self) -> Option<RecordedCommand> {
        while let Some(frame) = self.incoming.next().await {
            if let Some(command) = parse_command(&frame) {
                return Some(command);
            }
        }
        None
    }

    pub fn respond(&self, id: u64, result: Value) {
        let _ = self.outgoing.unbounded_send(Ok(response_frame(id, Ok(result))));
    }

    pub fn fail(&self, id: u64, code: i64, message: &str) {
        let _ = self
            .outgoing
            .unbounded_send(Ok(response_frame(id, Err((code, message.to_string())))));
    }

    pub fn emit(&self, method: &str, params: Value) {
        let frame = json!({ "method": method, "params": params }).to_string();
        let _ = self.outgoing.unbounded_send(Ok(frame));
    }

    pub fn send_raw(&self, frame: &str) {
        let _ = self.outgoing.unbounded_send(Ok(frame.to_string()));
    }

    /// Ends the inbound stream as if the target went away.
    pub fn close(&self) {
        self.outgoing.close_channel();
    }

    /// Answers every command with `responder` on a background task.
    pub fn serve<F>(self, responder: F) -> ScriptedTarget
    where
        F: FnMut(&str, &Value) -> Result<Value, (i64, String)> + Send + 'static,
    {
        let commands = Arc::new(Mutex::new(Vec::new()));
        let unanswered = Arc::new(Mutex::new(HashSet::new()));
        let outgoing = self.outgoing.clone();
        let task = tokio::spawn(serve_loop(
            self,
            responder,
            Arc::clone(&commands),
            Arc::clone(&unanswered),
        ));
        ScriptedTarget {
            commands,
            unanswered,
            outgoing,
            task,
        }
    }
}

async fn serve_loop<F>(
    mut peer: MemoryPeer,
    mut responder: F,
    commands: Arc<Mutex<Vec<RecordedCommand>>>,
    unanswered: Arc<Mutex<HashSet<String>>>,
) where
    F: FnMut(&str, &Value) -> Result<Value, (i64, String)> + Send + 'static,
{
    while let Some(command) = peer.next_command().await {
        if unanswered.lock().contains(&command.method) {
            commands.lock().push(command);
            continue;
        }
        let result = responder(&command.method, &command.params);
        let id = command.id;
        commands.lock().push(command);
        let _ = peer.outgoing.send(Ok(response_frame(id, result))).await;
    }
}

/// A fake target answering commands in the background.
pub struct ScriptedTarget {
    commands: Arc<Mutex<Vec<RecordedCommand>>>,
    unanswered: Arc<Mutex<HashSet<String>>>,
    outgoing: FromTarget,
    task: JoinHandle<()>,
}

impl ScriptedTarget {
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.lock().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .map(|command| command.method.clone())
            .collect()
    }

    pub fn commands_named(&self, method: &str) -> Vec<RecordedCommand> {
        self.commands
            .lock()
            .iter()
            .filter(|command| command.method == method)
            .cloned()
            .collect()
    }

    pub fn clear_commands(&self) {
        self.commands.lock().clear();
    }

    /// Records `method` from now on without ever answering it.
    pub fn stall(&self, method: &str) {
        self.unanswered.lock().insert(method.to_string());
    }

    /// Undoes [`ScriptedTarget::stall`] for commands sent after this call.
    pub fn answer(&self, method: &str) {
        self.unanswered.lock().remove(method);
    }

    pub fn emit(&self, method: &str, params: Value) {
        let frame = json!({ "method": method, "params": params }).to_string();
        let _ = self.outgoing.unbounded_send(Ok(frame));
    }

    /// Answers a stalled command by hand.
    pub fn respond(&self, id: u64, result: Value) {
        let _ = self.outgoing.unbounded_send(Ok(response_frame(id, Ok(result))));
    }

    pub fn send_raw(&self, frame: &str) {
        let _ = self.outgoing.unbounded_send(Ok(frame.to_string()));
    }

    pub fn close(&self) {
        self.outgoing.close_channel();
    }
}

impl Drop for ScriptedTarget {
    fn drop(&mut self) {
        self.task.abort();
    }
}
