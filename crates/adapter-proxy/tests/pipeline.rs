use std::fs;
use std::sync::Arc;
use std::time::Duration;

use adapter_proxy::AdapterProxy;
use async_trait::async_trait;
use bridge_core_types::{
    AdapterEvent, Breakpoint, DebugAdapter, ErrorResponse, Event, EventSink, Request,
    RequestArgs, Response, ResponseBody, ScriptParsedBody, SetBreakpointsBody, SourceBreakpoint,
    StopReason,
};
use bridge_source_maps::paths;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Verifies every breakpoint where it was asked for and remembers what it was sent.
#[derive(Default)]
struct RecordingAdapter {
    sink: Mutex<Option<EventSink>>,
    dispatched: Mutex<Vec<(i64, RequestArgs)>>,
}

impl RecordingAdapter {
    fn emit(&self, event: AdapterEvent) {
        let sink = self.sink.lock().clone().expect("sink registered");
        sink.send(event).expect("pump alive");
    }

    fn last_breakpoints(&self) -> (Option<String>, Vec<SourceBreakpoint>) {
        let dispatched = self.dispatched.lock();
        dispatched
            .iter()
            .rev()
            .find_map(|(_, args)| match args {
                RequestArgs::SetBreakpoints(set) => {
                    Some((set.source.path.clone(), set.breakpoints.clone()))
                }
                _ => None,
            })
            .expect("a setBreakpoints was dispatched")
    }
}

#[async_trait]
impl DebugAdapter for RecordingAdapter {
    fn register_event_sink(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    async fn dispatch(&self, seq: i64, args: RequestArgs) -> Result<ResponseBody, ErrorResponse> {
        self.dispatched.lock().push((seq, args.clone()));
        match args {
            RequestArgs::SetBreakpoints(set) => Ok(ResponseBody::SetBreakpoints(SetBreakpointsBody {
                breakpoints: set
                    .breakpoints
                    .iter()
                    .map(|bp| Breakpoint::verified(bp.line, bp.column))
                    .collect(),
            })),
            RequestArgs::Continue(_) => Err(ErrorResponse::new(2004, "not paused")),
            _ => Ok(ResponseBody::Empty),
        }
    }
}

struct Pipeline {
    proxy: Arc<AdapterProxy>,
    adapter: Arc<RecordingAdapter>,
    events: mpsc::UnboundedReceiver<Event>,
    seq: i64,
}

impl Pipeline {
    fn new() -> Self {
        let adapter = Arc::new(RecordingAdapter::default());
        let (tx, events) = mpsc::unbounded_channel();
        let proxy = AdapterProxy::with_default_chain(adapter.clone(), tx);
        Self {
            proxy: Arc::new(proxy),
            adapter,
            events,
            seq: 0,
        }
    }

    fn next_request(&mut self, command: &str, arguments: Value) -> Request {
        self.seq += 1;
        Request::new(self.seq, command, arguments)
    }

    async fn request(&mut self, command: &str, arguments: Value) -> Response {
        let request = self.next_request(command, arguments);
        self.proxy.dispatch_request(request).await
    }

    fn spawn_request(&mut self, command: &str, arguments: Value) -> tokio::task::JoinHandle<Response> {
        let request = self.next_request(command, arguments);
        let proxy = Arc::clone(&self.proxy);
        tokio::spawn(async move { proxy.dispatch_request(request).await })
    }

    async fn attach(&mut self, web_root: &str, source_maps: bool) {
        let init = self.request("initialize", json!({})).await;
        assert!(init.success);
        let attach = self
            .request("attach", json!({ "webRoot": web_root, "sourceMaps": source_maps }))
            .await;
        assert!(attach.success);
    }

    fn parse_script(&self, url: &str, map: Option<&str>) {
        self.adapter.emit(AdapterEvent::ScriptParsed(ScriptParsedBody {
            script_url: url.to_string(),
            source_map_url: map.map(str::to_string),
        }));
    }

    /// Lets the event pump drain by round-tripping a marker event.
    async fn settle(&mut self) {
        self.adapter.emit(AdapterEvent::output("console", "marker"));
        let event = timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("event in time")
            .expect("event");
        assert_eq!(event.event, "output");
    }
}

fn web_root(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("web root");
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents).expect("write fixture");
    }
    dir
}

fn root_of(dir: &tempfile::TempDir) -> String {
    paths::normalize(&dir.path().to_string_lossy())
}

#[tokio::test]
async fn unknown_commands_and_bad_arguments_are_rejected_before_dispatch() {
    let mut pipeline = Pipeline::new();
    let unknown = pipeline.request("setVariable", json!({})).await;
    assert_eq!(unknown.error_id(), Some(ErrorResponse::UNKNOWN_COMMAND));

    let invalid = pipeline
        .request("setBreakpoints", json!({ "source": 5 }))
        .await;
    assert_eq!(invalid.error_id(), Some(ErrorResponse::INVALID_ARGUMENTS));
    assert!(pipeline.adapter.dispatched.lock().is_empty());
}

#[tokio::test]
async fn adapter_failures_are_returned_as_is() {
    let mut pipeline = Pipeline::new();
    let response = pipeline.request("continue", json!({ "threadId": 1 })).await;
    assert!(!response.success);
    assert_eq!(response.error_id(), Some(2004));
}

#[tokio::test]
async fn breakpoints_wait_for_their_script_then_replay() {
    let dir = web_root(&[("a.js", "")]);
    let root = root_of(&dir);
    let mut pipeline = Pipeline::new();
    pipeline.attach(&root, false).await;

    let local = paths::join(&root, "a.js");
    let pending = pipeline.spawn_request(
        "setBreakpoints",
        json!({ "source": { "path": local }, "breakpoints": [{ "line": 5 }] }),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());

    pipeline.parse_script("http://localhost:8080/a.js", None);
    let response = timeout(Duration::from_secs(5), pending)
        .await
        .expect("released")
        .expect("join");
    assert!(response.success);
    let body = response.body.expect("body");
    assert_eq!(body["breakpoints"][0]["line"], 5);
    assert_eq!(body["breakpoints"][0]["verified"], true);

    let (path, breakpoints) = pipeline.adapter.last_breakpoints();
    assert_eq!(path.as_deref(), Some("http://localhost:8080/a.js"));
    assert_eq!(breakpoints, vec![SourceBreakpoint::at(4, None)]);
}

#[tokio::test]
async fn bundle_siblings_share_the_generated_script() {
    let map = r#"{"version":3,"sources":["x.ts","y.ts"],"mappings":"AAAA;ACAA"}"#;
    let dir = web_root(&[("bundle.js", ""), ("bundle.js.map", map)]);
    let root = root_of(&dir);
    let mut pipeline = Pipeline::new();
    pipeline.attach(&root, true).await;
    pipeline.parse_script("http://localhost:8080/bundle.js", Some("bundle.js.map"));
    pipeline.settle().await;

    let x = paths::join(&root, "x.ts");
    let y = paths::join(&root, "y.ts");
    let first = pipeline
        .request(
            "setBreakpoints",
            json!({ "source": { "path": x }, "breakpoints": [{ "line": 1 }] }),
        )
        .await;
    assert!(first.success);

    let second = pipeline
        .request(
            "setBreakpoints",
            json!({ "source": { "path": y }, "breakpoints": [{ "line": 1 }] }),
        )
        .await;
    let (path, breakpoints) = pipeline.adapter.last_breakpoints();
    assert_eq!(path.as_deref(), Some("http://localhost:8080/bundle.js"));
    assert_eq!(
        breakpoints,
        vec![SourceBreakpoint::at(1, Some(0)), SourceBreakpoint::at(0, Some(0))]
    );

    let body = second.body.expect("body");
    let reported = body["breakpoints"].as_array().expect("breakpoints");
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0]["line"], 1);
    assert_eq!(reported[0]["column"], 1);
}

#[tokio::test]
async fn internal_events_stay_inside_the_pipeline() {
    let mut pipeline = Pipeline::new();
    pipeline.parse_script("http://localhost/app.js", None);
    pipeline.adapter.emit(AdapterEvent::ClearTargetContext);
    pipeline
        .adapter
        .emit(AdapterEvent::stopped(StopReason::Breakpoint, 1));

    let event = timeout(Duration::from_secs(5), pipeline.events.recv())
        .await
        .expect("event in time")
        .expect("event");
    assert_eq!(event.event, "stopped");
    assert_eq!(event.body.expect("body")["reason"], "breakpoint");
}

#[tokio::test]
async fn clearing_the_client_context_abandons_waiting_requests() {
    let dir = web_root(&[]);
    let root = root_of(&dir);
    let mut pipeline = Pipeline::new();
    pipeline.attach(&root, false).await;

    let pending = pipeline.spawn_request(
        "setBreakpoints",
        json!({ "source": { "path": paths::join(&root, "never.js") }, "breakpoints": [{ "line": 1 }] }),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    pipeline.adapter.emit(AdapterEvent::ClearClientContext);

    let response = timeout(Duration::from_secs(5), pending)
        .await
        .expect("abandoned")
        .expect("join");
    assert_eq!(response.error_id(), Some(ErrorResponse::REQUEST_ABANDONED));
    assert!(pipeline
        .adapter
        .dispatched
        .lock()
        .iter()
        .all(|(_, args)| !matches!(args, RequestArgs::SetBreakpoints(_))));
}
