//! Shared primitives for the Chrome debug bridge.
//!
//! Everything the client-facing half of the bridge speaks lives here: the Debug Adapter
//! Protocol envelopes, the closed set of commands the bridge understands, the typed
//! argument and body structures that transformers rewrite in place, and the
//! [`DebugAdapter`] seam the proxy drives.

pub mod adapter;
pub mod error;
pub mod events;
pub mod handles;
pub mod protocol;
pub mod requests;
pub mod responses;

pub use adapter::{DebugAdapter, EventSink};
pub use error::ErrorResponse;
pub use events::{
    AdapterEvent, ContinuedEventBody, OutputEventBody, ScriptParsedBody, StopReason,
    StoppedEventBody,
};
pub use handles::Handles;
pub use protocol::{Command, Event, Request, Response};
pub use requests::{
    AttachArgs, DisconnectArgs, EvaluateArgs, InitializeArgs, RequestArgs, ScopesArgs,
    SetBreakpointsArgs, SetExceptionBreakpointsArgs, Source, SourceArgs, SourceBreakpoint,
    StackTraceArgs, ThreadArgs, VariablesArgs,
};
pub use responses::{
    Breakpoint, Capabilities, ContinueBody, EvaluateBody, ExceptionBreakpointsFilter,
    ResponseBody, Scope, ScopesBody, SetBreakpointsBody, SourceBody, StackFrame,
    StackTraceBody, Thread, ThreadsBody, Variable, VariablesBody,
};

/// The only thread a browser target exposes to the client.
pub const THREAD_ID: i64 = 1;
