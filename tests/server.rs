use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_core_types::{
    AdapterEvent, Capabilities, DebugAdapter, ErrorResponse, EventSink, RequestArgs,
    ResponseBody, ScriptParsedBody,
};
use chrome_debug_bridge::server::{read_message, write_message};
use chrome_debug_bridge::serve;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[derive(Default)]
struct StubAdapter {
    sink: Mutex<Option<EventSink>>,
}

impl StubAdapter {
    fn emit(&self, event: AdapterEvent) {
        if let Some(sink) = self.sink.lock().as_ref() {
            let _ = sink.send(event);
        }
    }
}

#[async_trait]
impl DebugAdapter for StubAdapter {
    fn register_event_sink(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    async fn dispatch(&self, _seq: i64, args: RequestArgs) -> Result<ResponseBody, ErrorResponse> {
        match args {
            RequestArgs::Initialize(_) => Ok(ResponseBody::Capabilities(Capabilities::chrome())),
            RequestArgs::Attach(_) => {
                self.emit(AdapterEvent::ScriptParsed(ScriptParsedBody {
                    script_url: "http://localhost/app.js".into(),
                    source_map_url: None,
                }));
                self.emit(AdapterEvent::Initialized);
                Ok(ResponseBody::Empty)
            }
            _ => Ok(ResponseBody::Empty),
        }
    }
}

struct Client {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    server: JoinHandle<Result<(), chrome_debug_bridge::ServerError>>,
    seq: i64,
}

impl Client {
    fn start() -> Self {
        let (client, server_side) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let adapter: Arc<dyn DebugAdapter> = Arc::new(StubAdapter::default());
        let server = tokio::spawn(serve(server_read, server_write, adapter));
        let (reader, writer) = tokio::io::split(client);
        Self {
            reader: BufReader::new(reader),
            writer,
            server,
            seq: 0,
        }
    }

    async fn send(&mut self, command: &str, arguments: Value) -> i64 {
        self.seq += 1;
        let request = json!({
            "seq": self.seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        });
        write_message(&mut self.writer, &request).await.expect("send");
        self.seq
    }

    async fn receive(&mut self) -> Value {
        let payload = timeout(Duration::from_secs(5), read_message(&mut self.reader))
            .await
            .expect("message in time")
            .expect("framing")
            .expect("stream open");
        serde_json::from_slice(&payload).expect("json")
    }
}

#[tokio::test]
async fn responses_carry_increasing_seq_and_request_seq() {
    let mut client = Client::start();
    let initialize = client.send("initialize", json!({ "adapterID": "chrome" })).await;
    let first = client.receive().await;
    assert_eq!(first["type"], "response");
    assert_eq!(first["request_seq"], initialize);
    assert_eq!(first["success"], true);
    assert_eq!(first["body"]["supportsConfigurationDoneRequest"], true);

    let unknown = client.send("stepBack", json!({})).await;
    let second = client.receive().await;
    assert_eq!(second["request_seq"], unknown);
    assert_eq!(second["success"], false);
    assert_eq!(second["body"]["error"]["id"], ErrorResponse::UNKNOWN_COMMAND);
    assert!(second["seq"].as_i64() > first["seq"].as_i64());
}

#[tokio::test]
async fn internal_events_are_not_written() {
    let mut client = Client::start();
    let attach = client.send("attach", json!({ "sourceMaps": false })).await;

    let mut saw_response = false;
    let mut saw_initialized = false;
    while !(saw_response && saw_initialized) {
        let message = client.receive().await;
        match message["type"].as_str() {
            Some("response") => {
                assert_eq!(message["request_seq"], attach);
                saw_response = true;
            }
            Some("event") => {
                assert_eq!(message["event"], "initialized");
                saw_initialized = true;
            }
            other => panic!("unexpected message type {other:?}"),
        }
    }
}

#[tokio::test]
async fn disconnect_ends_the_session() {
    let mut client = Client::start();
    let disconnect = client.send("disconnect", json!({})).await;
    let response = client.receive().await;
    assert_eq!(response["request_seq"], disconnect);
    assert_eq!(response["success"], true);

    let outcome = timeout(Duration::from_secs(5), &mut client.server)
        .await
        .expect("server stops")
        .expect("join");
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn closed_input_ends_the_session_cleanly() {
    let client = Client::start();
    let server = client.server;
    drop(client.reader);
    drop(client.writer);
    let outcome = timeout(Duration::from_secs(5), server)
        .await
        .expect("server stops")
        .expect("join");
    assert!(outcome.is_ok());
}
