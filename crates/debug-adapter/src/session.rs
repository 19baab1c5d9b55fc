//! The debug session state machine.
//!
//! `Detached -> Attaching -> Running <-> Paused -> Detached`. Target notifications are
//! pushed by connection subscribers into one channel and applied by a single event loop
//! task, so registry and pause-state updates never interleave with each other. Requests
//! run on the caller's task and only touch shared state between awaits.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_core_types::{
    AdapterEvent, AttachArgs, Capabilities, ContinueBody, DebugAdapter, ErrorResponse,
    EvaluateArgs, EvaluateBody, EventSink, Handles, RequestArgs, ResponseBody, Scope,
    ScopesBody, ScriptParsedBody, SetBreakpointsArgs, SetBreakpointsBody, Source, SourceArgs, SourceBody,
    StackFrame, StackTraceArgs, StackTraceBody, StopReason, StoppedEventBody, Thread,
    ThreadsBody, VariablesBody, THREAD_ID,
};
use cdp_adapter::protocol::{
    BreakpointResolvedEvent, CallFrame, ConsoleApiCalledEvent, EvaluateResult,
    ExceptionDetails, GetPropertiesResult, GetScriptSourceResult, PausedEvent,
    PropertyDescriptor, RemoteObject, ScriptParsedEvent,
};
use cdp_adapter::{discover, CdpConnection, CdpError, Transport, WebSocketTransport};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::breakpoints::{BreakpointManager, BreakpointTarget};
use crate::config::AdapterConfig;
use crate::error::AdapterError;
use crate::overlay::PauseOverlay;
use crate::queue::SerialQueue;
use crate::scripts::{is_placeholder, ScriptRegistry};
use crate::variables::{display_value, PropertySource, VariableContainer};

/// Receives the session's diagnostic verbosity when an attach request carries one.
pub type DiagnosticHook = Arc<dyn Fn(bool) + Send + Sync>;

const TARGET_EVENTS: &[&str] = &[
    "Debugger.scriptParsed",
    "Debugger.paused",
    "Debugger.resumed",
    "Debugger.breakpointResolved",
    "Runtime.executionContextsCleared",
    "Runtime.consoleAPICalled",
    "Inspector.detached",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Detached,
    Attaching,
    Running,
    Paused,
}

#[derive(Debug)]
struct TargetEvent {
    method: String,
    params: Value,
}

struct PauseState {
    call_frames: Vec<CallFrame>,
    exception: Option<RemoteObject>,
}

struct SessionState {
    phase: SessionPhase,
    // bumped per attach so a previous connection's event loop cannot touch a new session
    generation: u64,
    connection: Option<CdpConnection>,
    pause: Option<PauseState>,
    frames: Handles<CallFrame>,
    // source reference -> script id
    sources: Handles<String>,
}

struct Session {
    config: AdapterConfig,
    transport: Arc<dyn Transport>,
    sink: Mutex<Option<EventSink>>,
    diagnostic_hook: Mutex<Option<DiagnosticHook>>,
    // lock order: state before scripts
    state: Mutex<SessionState>,
    scripts: Mutex<ScriptRegistry>,
    variables: Mutex<Handles<VariableContainer>>,
    // bumped with every variables reset, under the variables lock
    variable_epoch: AtomicU64,
    breakpoints: BreakpointManager,
    queue: SerialQueue,
    overlay: PauseOverlay,
    generations: AtomicU64,
    expecting_resumed: AtomicBool,
    pause_requested: AtomicBool,
}

/// Debug adapter for Chrome-family targets.
#[derive(Clone)]
pub struct ChromeDebugAdapter {
    inner: Arc<Session>,
}

impl ChromeDebugAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self::with_transport(config, Arc::new(WebSocketTransport))
    }

    pub fn with_transport(config: AdapterConfig, transport: Arc<dyn Transport>) -> Self {
        let overlay = PauseOverlay::new(
            config.pause_overlay_message.clone(),
            config.overlay_clear_delay(),
        );
        Self {
            inner: Arc::new(Session {
                config,
                transport,
                sink: Mutex::new(None),
                diagnostic_hook: Mutex::new(None),
                state: Mutex::new(SessionState {
                    phase: SessionPhase::Detached,
                    generation: 0,
                    connection: None,
                    pause: None,
                    frames: Handles::new(),
                    sources: Handles::new(),
                }),
                scripts: Mutex::new(ScriptRegistry::new()),
                variables: Mutex::new(Handles::new()),
                variable_epoch: AtomicU64::new(0),
                breakpoints: BreakpointManager::new(),
                queue: SerialQueue::new(),
                overlay,
                generations: AtomicU64::new(0),
                expecting_resumed: AtomicBool::new(false),
                pause_requested: AtomicBool::new(false),
            }),
        }
    }

    pub fn set_diagnostic_hook(&self, hook: DiagnosticHook) {
        *self.inner.diagnostic_hook.lock() = Some(hook);
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.lock().phase
    }

    pub fn script_count(&self) -> usize {
        self.inner.scripts.lock().len()
    }

    pub fn script_url(&self, script_id: &str) -> Option<String> {
        self.inner
            .scripts
            .lock()
            .by_id(script_id)
            .map(|script| script.url.clone())
    }

    pub fn committed_breakpoints(&self, url: &str) -> Vec<crate::CommittedBreakpoint> {
        self.inner.breakpoints.committed_for(url)
    }
}

#[async_trait]
impl DebugAdapter for ChromeDebugAdapter {
    fn register_event_sink(&self, sink: EventSink) {
        *self.inner.sink.lock() = Some(sink);
    }

    async fn dispatch(&self, seq: i64, args: RequestArgs) -> Result<ResponseBody, ErrorResponse> {
        let command = args.command();
        debug!(target: "debug-adapter", seq, command = command.as_str(), "handling request");
        self.inner.handle(args).await.map_err(|err| {
            warn!(target: "debug-adapter", seq, command = command.as_str(), %err, "request failed");
            ErrorResponse::from(err)
        })
    }
}

impl Session {
    async fn handle(self: &Arc<Self>, args: RequestArgs) -> Result<ResponseBody, AdapterError> {
        match args {
            RequestArgs::Initialize(_) => Ok(ResponseBody::Capabilities(Capabilities::chrome())),
            RequestArgs::Launch(_) => Err(AdapterError::LaunchUnsupported),
            RequestArgs::Attach(args) => self.attach(args).await,
            RequestArgs::Disconnect(_) => {
                self.teardown("client disconnected");
                Ok(ResponseBody::Empty)
            }
            RequestArgs::SetBreakpoints(args) => self.set_breakpoints(args).await,
            RequestArgs::SetExceptionBreakpoints(args) => {
                let state = if args.filters.iter().any(|filter| filter == "all") {
                    "all"
                } else if args.filters.iter().any(|filter| filter == "uncaught") {
                    "uncaught"
                } else {
                    "none"
                };
                self.connection()?
                    .send_command("Debugger.setPauseOnExceptions", json!({ "state": state }))
                    .await?;
                Ok(ResponseBody::Empty)
            }
            RequestArgs::ConfigurationDone => Ok(ResponseBody::Empty),
            RequestArgs::Continue(_) => {
                self.resume_with("Debugger.resume").await?;
                Ok(ResponseBody::Continue(ContinueBody {
                    all_threads_continued: true,
                }))
            }
            RequestArgs::Next(_) => self.step("Debugger.stepOver").await,
            RequestArgs::StepIn(_) => self.step("Debugger.stepInto").await,
            RequestArgs::StepOut(_) => self.step("Debugger.stepOut").await,
            RequestArgs::Pause(_) => {
                let connection = self.connection()?;
                self.pause_requested.store(true, Ordering::SeqCst);
                if let Err(err) = connection.send_command("Debugger.pause", json!({})).await {
                    self.pause_requested.store(false, Ordering::SeqCst);
                    return Err(err.into());
                }
                Ok(ResponseBody::Empty)
            }
            RequestArgs::Threads => Ok(ResponseBody::Threads(ThreadsBody {
                threads: vec![Thread {
                    id: THREAD_ID,
                    name: format!("Thread {THREAD_ID}"),
                }],
            })),
            RequestArgs::StackTrace(args) => self.stack_trace(args),
            RequestArgs::Scopes(args) => self.scopes(args.frame_id),
            RequestArgs::Variables(args) => self.variables(args.variables_reference).await,
            RequestArgs::Source(args) => self.source(args).await,
            RequestArgs::Evaluate(args) => self.evaluate(args).await,
        }
    }

    fn emit(&self, event: AdapterEvent) {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => {
                if sink.send(event).is_err() {
                    debug!(target: "debug-adapter", "event sink closed");
                }
            }
            None => debug!(target: "debug-adapter", event = event.name(), "no event sink registered"),
        }
    }

    fn connection(&self) -> Result<CdpConnection, AdapterError> {
        let state = self.state.lock();
        match (state.phase, &state.connection) {
            (SessionPhase::Running | SessionPhase::Paused, Some(connection)) => {
                Ok(connection.clone())
            }
            _ => Err(AdapterError::NotAttached),
        }
    }

    async fn attach(self: &Arc<Self>, args: AttachArgs) -> Result<ResponseBody, AdapterError> {
        let generation = {
            let mut state = self.state.lock();
            if state.phase != SessionPhase::Detached {
                return Err(AdapterError::AlreadyAttached);
            }
            state.phase = SessionPhase::Attaching;
            state.generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
            state.generation
        };
        let hook = self.diagnostic_hook.lock().clone();
        if let Some(hook) = hook {
            hook(args.verbose_logging());
        }

        match self.open(&args, generation).await {
            Ok(endpoint) => {
                let attached = {
                    let mut state = self.state.lock();
                    let open = state
                        .connection
                        .as_ref()
                        .is_some_and(CdpConnection::is_open);
                    let current = state.generation == generation
                        && state.phase == SessionPhase::Attaching;
                    if current && open {
                        state.phase = SessionPhase::Running;
                    }
                    (current, open)
                };
                match attached {
                    (true, true) => {}
                    (current, _) => {
                        if current {
                            self.teardown("target closed while attaching");
                        }
                        return Err(AdapterError::Connection(CdpError::Closed));
                    }
                }
                info!(target: "debug-adapter", %endpoint, "attached");
                self.emit(AdapterEvent::Initialized);
                Ok(ResponseBody::Empty)
            }
            Err(err) => {
                warn!(target: "debug-adapter", %err, "attach failed");
                let still_ours = self.state.lock().generation == generation;
                if still_ours {
                    self.teardown("attach failed");
                }
                Err(err)
            }
        }
    }

    async fn open(self: &Arc<Self>, args: &AttachArgs, generation: u64) -> Result<String, AdapterError> {
        let endpoint = match &args.websocket_url {
            Some(endpoint) => endpoint.clone(),
            None => {
                discover(&args.address, args.port, args.url.as_deref(), &self.config.cdp).await?
            }
        };

        let connection = CdpConnection::new(Arc::clone(&self.transport), self.config.cdp.clone());
        let (events, events_rx) = mpsc::unbounded_channel();
        for method in TARGET_EVENTS {
            let events = events.clone();
            let name = method.to_string();
            connection.on(method, move |params| {
                events
                    .send(TargetEvent {
                        method: name.clone(),
                        params: params.clone(),
                    })
                    .map_err(|_| CdpError::Closed)
            });
        }
        self.state.lock().connection = Some(connection.clone());

        connection.connect(&endpoint).await?;
        tokio::spawn(Arc::clone(self).event_loop(events_rx, connection.closed(), generation));

        connection.send_command("Debugger.enable", json!({})).await?;
        connection.send_command("Runtime.enable", json!({})).await?;
        if self.config.pause_overlay_message.is_some() {
            if let Err(err) = connection.send_command("Overlay.enable", json!({})).await {
                debug!(target: "debug-adapter", %err, "target has no overlay domain");
            }
        }
        Ok(endpoint)
    }

    /// Drops every piece of session state and closes the channel. Safe to call when
    /// nothing is attached.
    fn teardown(&self, reason: &str) {
        let connection = {
            let mut state = self.state.lock();
            if state.phase == SessionPhase::Detached && state.connection.is_none() {
                return;
            }
            state.phase = SessionPhase::Detached;
            state.pause = None;
            state.frames.reset();
            state.sources.reset();
            state.connection.take()
        };
        self.reset_variables();
        self.scripts.lock().clear();
        self.breakpoints.clear();
        self.queue.reset();
        self.overlay.cancel();
        self.expecting_resumed.store(false, Ordering::SeqCst);
        self.pause_requested.store(false, Ordering::SeqCst);
        if let Some(connection) = connection {
            connection.close();
        }
        info!(target: "debug-adapter", reason, "session detached");
        self.emit(AdapterEvent::ClearClientContext);
    }

    async fn event_loop(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<TargetEvent>,
        closed: CancellationToken,
        generation: u64,
    ) {
        debug!(target: "debug-adapter", generation, "event loop entered");
        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => {
                        if self.state.lock().generation != generation {
                            break;
                        }
                        self.handle_event(event);
                    }
                    None => break,
                },
                _ = closed.cancelled() => break,
            }
        }

        let lost = {
            let state = self.state.lock();
            state.generation == generation
                && matches!(state.phase, SessionPhase::Running | SessionPhase::Paused)
        };
        if lost {
            warn!(target: "debug-adapter", "connection to target lost");
            self.teardown("target connection closed");
            self.emit(AdapterEvent::Terminated);
        }
        debug!(target: "debug-adapter", generation, "event loop exiting");
    }

    fn handle_event(&self, event: TargetEvent) {
        match event.method.as_str() {
            "Debugger.scriptParsed" => {
                if let Some(parsed) = decode_event::<ScriptParsedEvent>(&event) {
                    self.on_script_parsed(parsed);
                }
            }
            "Debugger.paused" => {
                if let Some(paused) = decode_event::<PausedEvent>(&event) {
                    self.on_paused(paused);
                }
            }
            "Debugger.resumed" => self.on_resumed(),
            "Debugger.breakpointResolved" => {
                if let Some(resolved) = decode_event::<BreakpointResolvedEvent>(&event) {
                    if !self
                        .breakpoints
                        .on_resolved(&resolved.breakpoint_id, &resolved.location)
                    {
                        debug!(
                            target: "breakpoints",
                            id = %resolved.breakpoint_id,
                            "resolution for an unknown breakpoint"
                        );
                    }
                }
            }
            "Runtime.executionContextsCleared" => self.on_context_cleared(),
            "Runtime.consoleAPICalled" => {
                if let Some(called) = decode_event::<ConsoleApiCalledEvent>(&event) {
                    self.on_console(called);
                }
            }
            "Inspector.detached" => {
                info!(target: "debug-adapter", params = %event.params, "target detached the inspector");
                let connection = self.state.lock().connection.clone();
                if let Some(connection) = connection {
                    connection.close();
                }
            }
            other => debug!(target: "debug-adapter", method = other, "unhandled target event"),
        }
    }

    fn on_script_parsed(&self, parsed: ScriptParsedEvent) {
        let script = self.scripts.lock().on_script_parsed(parsed);
        debug!(target: "debug-adapter", id = %script.id, url = %script.url, "script parsed");
        self.emit(AdapterEvent::ScriptParsed(ScriptParsedBody {
            script_url: script.url.clone(),
            source_map_url: script.source_map_url.clone(),
        }));
    }

    fn on_paused(&self, paused: PausedEvent) {
        let pause_requested = self.pause_requested.swap(false, Ordering::SeqCst);
        let reason = if paused.reason == "exception" || paused.reason == "promiseRejection" {
            StopReason::Exception
        } else if !paused.hit_breakpoints.is_empty() {
            StopReason::Breakpoint
        } else if pause_requested {
            StopReason::Pause
        } else {
            StopReason::Step
        };
        let exception = match reason {
            StopReason::Exception => paused.data,
            _ => None,
        };
        let text = exception.as_ref().map(display_value);

        let connection = {
            let mut state = self.state.lock();
            state.phase = SessionPhase::Paused;
            state.frames.reset();
            state.pause = Some(PauseState {
                call_frames: paused.call_frames,
                exception,
            });
            state.connection.clone()
        };
        self.reset_variables();
        if let Some(connection) = &connection {
            self.overlay.show(connection);
        }
        debug!(target: "debug-adapter", reason = reason.as_str(), "target paused");
        self.emit(AdapterEvent::Stopped(StoppedEventBody {
            reason,
            thread_id: THREAD_ID,
            text,
        }));
    }

    fn on_resumed(&self) {
        let connection = {
            let mut state = self.state.lock();
            if state.phase == SessionPhase::Paused {
                state.phase = SessionPhase::Running;
            }
            state.pause = None;
            state.frames.reset();
            state.connection.clone()
        };
        self.reset_variables();
        if let Some(connection) = &connection {
            self.overlay.schedule_clear(connection);
        }
        if self.expecting_resumed.swap(false, Ordering::SeqCst) {
            debug!(target: "debug-adapter", "resume was requested by the client");
        } else {
            self.emit(AdapterEvent::continued(THREAD_ID));
        }
    }

    fn on_context_cleared(&self) {
        self.state.lock().sources.reset();
        self.scripts.lock().clear();
        self.breakpoints.clear();
        self.queue.reset();
        info!(target: "debug-adapter", "execution contexts cleared");
        self.emit(AdapterEvent::ClearTargetContext);
    }

    fn on_console(&self, called: ConsoleApiCalledEvent) {
        let category = match called.kind.as_str() {
            "error" | "assert" => "stderr",
            _ => "stdout",
        };
        let text: Vec<String> = called
            .args
            .iter()
            .map(|arg| match &arg.value {
                Some(Value::String(text)) => text.clone(),
                _ => display_value(arg),
            })
            .collect();
        self.emit(AdapterEvent::output(category, format!("{}\n", text.join(" "))));
    }

    async fn resume_with(&self, method: &str) -> Result<(), AdapterError> {
        let connection = self.connection()?;
        // the resumed notification can beat the command response
        self.expecting_resumed.store(true, Ordering::SeqCst);
        if let Err(err) = connection.send_command(method, json!({})).await {
            self.expecting_resumed.store(false, Ordering::SeqCst);
            return Err(err.into());
        }
        Ok(())
    }

    async fn step(&self, method: &str) -> Result<ResponseBody, AdapterError> {
        self.resume_with(method).await?;
        Ok(ResponseBody::Empty)
    }

    fn breakpoint_target(&self, source: &Source) -> Result<BreakpointTarget, AdapterError> {
        let url = match (&source.path, source.reference()) {
            (Some(path), _) => path.clone(),
            (None, Some(reference)) => {
                let script_id = self
                    .state
                    .lock()
                    .sources
                    .get(reference)
                    .cloned()
                    .ok_or(AdapterError::InvalidHandle(reference))?;
                self.scripts
                    .lock()
                    .by_id(&script_id)
                    .map(|script| script.url.clone())
                    .ok_or(AdapterError::UnknownScript(script_id))?
            }
            (None, None) => return Err(AdapterError::UnknownScript("<unnamed source>".into())),
        };

        if !is_placeholder(&url) {
            return Ok(BreakpointTarget::Url(url));
        }
        let script = self
            .scripts
            .lock()
            .by_url(&url)
            .ok_or_else(|| AdapterError::UnknownScript(url.clone()))?;
        Ok(BreakpointTarget::Script {
            url,
            script_id: script.id.clone(),
        })
    }

    async fn set_breakpoints(&self, args: SetBreakpointsArgs) -> Result<ResponseBody, AdapterError> {
        let connection = self.connection()?;
        let target = self.breakpoint_target(&args.source)?;
        let timeout = self.config.set_breakpoints_timeout();
        let requested = args.breakpoints;
        let manager = &self.breakpoints;

        // the deadline starts once the queue reaches this request
        let outcome = self
            .queue
            .run(async move {
                tokio::time::timeout(timeout, manager.replace(&connection, &target, &requested))
                    .await
            })
            .await;
        match outcome {
            Ok(breakpoints) => Ok(ResponseBody::SetBreakpoints(SetBreakpointsBody { breakpoints })),
            Err(_) => Err(AdapterError::Timeout("setBreakpoints")),
        }
    }

    fn stack_trace(&self, args: StackTraceArgs) -> Result<ResponseBody, AdapterError> {
        let mut state = self.state.lock();
        let call_frames = match &state.pause {
            Some(pause) => pause.call_frames.clone(),
            None => return Err(AdapterError::NotPaused),
        };
        let start = usize::try_from(args.start_frame.unwrap_or(0)).unwrap_or(0);
        let levels = args
            .levels
            .and_then(|levels| usize::try_from(levels).ok())
            .filter(|levels| *levels > 0)
            .unwrap_or(call_frames.len());

        let scripts = self.scripts.lock();
        let mut stack_frames = Vec::new();
        for frame in call_frames.iter().skip(start).take(levels) {
            let id = state.frames.create(frame.clone());
            let source = scripts
                .by_id(&frame.location.script_id)
                .map(|script| Source {
                    name: Some(display_name(&script.url)),
                    path: Some(script.url.clone()),
                    source_reference: Some(state.sources.create(script.id.clone())),
                });
            let name = if frame.function_name.is_empty() {
                "(anonymous function)".to_string()
            } else {
                frame.function_name.clone()
            };
            stack_frames.push(StackFrame {
                id,
                name,
                source,
                line: frame.location.line_number,
                column: frame.location.column_number.unwrap_or(0),
            });
        }

        Ok(ResponseBody::StackTrace(StackTraceBody {
            stack_frames,
            total_frames: call_frames.len() as i64,
        }))
    }

    fn scopes(&self, frame_id: i64) -> Result<ResponseBody, AdapterError> {
        let (frame, exception) = {
            let state = self.state.lock();
            let pause = state.pause.as_ref().ok_or(AdapterError::NotPaused)?;
            let frame = state
                .frames
                .get(frame_id)
                .cloned()
                .ok_or(AdapterError::InvalidHandle(frame_id))?;
            let innermost = pause
                .call_frames
                .first()
                .is_some_and(|first| first.call_frame_id == frame.call_frame_id);
            let exception = if innermost {
                pause.exception.clone()
            } else {
                None
            };
            (frame, exception)
        };

        let mut variables = self.variables.lock();
        let mut scopes = Vec::new();
        if let Some(value) = exception {
            scopes.push(Scope {
                name: "Exception".to_string(),
                variables_reference: variables.create(VariableContainer::Exception { value }),
                expensive: false,
            });
        }
        for (index, scope) in frame.scope_chain.iter().enumerate() {
            let Some(object_id) = scope.object.object_id.clone() else {
                continue;
            };
            let this = if index == 0 { frame.this.clone() } else { None };
            scopes.push(Scope {
                name: scope_name(&scope.kind),
                variables_reference: variables.create(VariableContainer::Scope { object_id, this }),
                expensive: scope.kind == "global",
            });
        }
        Ok(ResponseBody::Scopes(ScopesBody { scopes }))
    }

    fn reset_variables(&self) {
        let mut handles = self.variables.lock();
        handles.reset();
        self.variable_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Creates a handle in the current table, or 0 when the table was reset since `epoch`.
    fn allocate_variable(&self, epoch: u64, container: VariableContainer) -> i64 {
        let mut handles = self.variables.lock();
        if self.variable_epoch.load(Ordering::SeqCst) != epoch {
            return 0;
        }
        handles.create(container)
    }

    async fn variables(&self, reference: i64) -> Result<ResponseBody, AdapterError> {
        let (container, epoch) = {
            let handles = self.variables.lock();
            let container = handles
                .get(reference)
                .cloned()
                .ok_or(AdapterError::InvalidHandle(reference))?;
            (container, self.variable_epoch.load(Ordering::SeqCst))
        };
        let source = SessionProperties {
            connection: self.connection()?,
            session: self,
            epoch,
        };
        let variables = container.expand(&source).await?;
        if self.variable_epoch.load(Ordering::SeqCst) != epoch {
            debug!(target: "debug-adapter", reference, "pause ended during variables expansion");
            return Err(AdapterError::InvalidHandle(reference));
        }
        Ok(ResponseBody::Variables(VariablesBody { variables }))
    }

    async fn source(&self, args: SourceArgs) -> Result<ResponseBody, AdapterError> {
        let connection = self.connection()?;
        let script_id = match args.reference() {
            Some(reference) => self
                .state
                .lock()
                .sources
                .get(reference)
                .cloned()
                .ok_or(AdapterError::InvalidHandle(reference))?,
            None => {
                let path = args
                    .source
                    .as_ref()
                    .and_then(|source| source.path.clone())
                    .ok_or(AdapterError::InvalidHandle(args.source_reference))?;
                self.scripts
                    .lock()
                    .by_url(&path)
                    .map(|script| script.id.clone())
                    .ok_or(AdapterError::UnknownScript(path))?
            }
        };
        let result: GetScriptSourceResult = connection
            .call("Debugger.getScriptSource", json!({ "scriptId": script_id }))
            .await?;
        Ok(ResponseBody::Source(SourceBody {
            content: result.script_source,
            mime_type: Some("text/javascript".to_string()),
        }))
    }

    async fn evaluate(&self, args: EvaluateArgs) -> Result<ResponseBody, AdapterError> {
        let connection = self.connection()?;
        let epoch = self.variable_epoch.load(Ordering::SeqCst);
        let call_frame_id = {
            let state = self.state.lock();
            match (&state.pause, args.frame_id) {
                (Some(_), Some(frame_id)) => Some(
                    state
                        .frames
                        .get(frame_id)
                        .map(|frame| frame.call_frame_id.clone())
                        .ok_or(AdapterError::InvalidHandle(frame_id))?,
                ),
                (Some(pause), None) => pause
                    .call_frames
                    .first()
                    .map(|frame| frame.call_frame_id.clone()),
                (None, _) => None,
            }
        };

        let result: EvaluateResult = match call_frame_id {
            Some(call_frame_id) => {
                connection
                    .call(
                        "Debugger.evaluateOnCallFrame",
                        json!({
                            "callFrameId": call_frame_id,
                            "expression": args.expression,
                            "silent": true,
                        }),
                    )
                    .await?
            }
            None => {
                connection
                    .call(
                        "Runtime.evaluate",
                        json!({ "expression": args.expression, "silent": true }),
                    )
                    .await?
            }
        };

        if let Some(details) = &result.exception_details {
            return Err(AdapterError::Evaluation(failure_text(details, &result.result)));
        }
        let variables_reference = match &result.result.object_id {
            Some(object_id) => self.allocate_variable(
                epoch,
                VariableContainer::Object {
                    object_id: object_id.clone(),
                },
            ),
            None => 0,
        };
        Ok(ResponseBody::Evaluate(EvaluateBody {
            result: display_value(&result.result),
            variables_reference,
        }))
    }
}

struct SessionProperties<'a> {
    connection: CdpConnection,
    session: &'a Session,
    epoch: u64,
}

#[async_trait]
impl PropertySource for SessionProperties<'_> {
    async fn properties(
        &self,
        object_id: &str,
        accessors_only: bool,
    ) -> Result<Vec<PropertyDescriptor>, AdapterError> {
        let params = if accessors_only {
            json!({ "objectId": object_id, "ownProperties": false, "accessorPropertiesOnly": true })
        } else {
            json!({ "objectId": object_id, "ownProperties": true })
        };
        let result: GetPropertiesResult =
            self.connection.call("Runtime.getProperties", params).await?;
        Ok(result.result)
    }

    fn allocate(&self, container: VariableContainer) -> i64 {
        self.session.allocate_variable(self.epoch, container)
    }
}

fn decode_event<T: DeserializeOwned>(event: &TargetEvent) -> Option<T> {
    match serde_json::from_value(event.params.clone()) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(target: "debug-adapter", method = %event.method, %err, "dropping malformed target event");
            None
        }
    }
}

/// Best description of a thrown evaluation result.
fn failure_text(details: &ExceptionDetails, result: &RemoteObject) -> String {
    if !details.text.is_empty() {
        return details.text.clone();
    }
    details
        .exception
        .as_ref()
        .and_then(|thrown| thrown.description.clone())
        .or_else(|| result.description.clone())
        .unwrap_or_else(|| "Evaluation failed".to_string())
}

fn scope_name(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Scope".to_string(),
    }
}

fn display_name(url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    trimmed
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(url)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_names_are_capitalized() {
        assert_eq!(scope_name("local"), "Local");
        assert_eq!(scope_name("closure"), "Closure");
        assert_eq!(scope_name(""), "Scope");
    }

    #[test]
    fn display_name_is_the_last_url_segment() {
        assert_eq!(display_name("http://localhost:8080/js/app.js?v=3"), "app.js");
        assert_eq!(display_name("debugadapter://17"), "17");
        assert_eq!(display_name("/"), "/");
    }

    #[test]
    fn failure_text_prefers_detail_text() {
        let thrown: RemoteObject =
            serde_json::from_value(json!({ "type": "object", "description": "ReferenceError: x" }))
                .expect("thrown");
        let details = ExceptionDetails {
            text: String::new(),
            exception: Some(thrown.clone()),
        };
        assert_eq!(failure_text(&details, &thrown), "ReferenceError: x");

        let details = ExceptionDetails {
            text: "Uncaught".into(),
            exception: None,
        };
        assert_eq!(failure_text(&details, &thrown), "Uncaught");

        let details = ExceptionDetails {
            text: String::new(),
            exception: None,
        };
        assert_eq!(failure_text(&details, &RemoteObject::default()), "Evaluation failed");
    }
}
