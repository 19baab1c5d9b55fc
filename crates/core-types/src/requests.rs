//! Typed request arguments.
//!
//! Transformers mutate these in place on the way to the adapter, so every structure keeps
//! the client's field names through serde renames and tolerates missing optional members.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::Command;

fn default_true() -> bool {
    true
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9222
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArgs {
    #[serde(rename = "clientID", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(rename = "adapterID", default, skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<String>,
    #[serde(default = "default_true")]
    pub lines_start_at1: bool,
    #[serde(default = "default_true")]
    pub columns_start_at1: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_format: Option<String>,
}

impl Default for InitializeArgs {
    fn default() -> Self {
        Self {
            client_id: None,
            adapter_id: None,
            lines_start_at1: true,
            columns_start_at1: true,
            path_format: None,
        }
    }
}

/// Launch configuration for attaching to an already running target.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachArgs {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Target url filter used by discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Known websocket endpoint; skips discovery entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websocket_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_root: Option<String>,
    #[serde(default = "default_true")]
    pub source_maps: bool,
    /// Ordered pattern -> replacement rules; declaration order is significant.
    #[serde(default)]
    pub source_map_path_overrides: Map<String, Value>,
    #[serde(default)]
    pub diagnostic_logging: bool,
    #[serde(default)]
    pub trace: bool,
}

impl Default for AttachArgs {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            url: None,
            websocket_url: None,
            web_root: None,
            source_maps: true,
            source_map_path_overrides: Map::new(),
            diagnostic_logging: false,
            trace: false,
        }
    }
}

impl AttachArgs {
    /// Override rules in declaration order, skipping non-string replacements.
    pub fn path_overrides(&self) -> Vec<(String, String)> {
        self.source_map_path_overrides
            .iter()
            .filter_map(|(pattern, replacement)| {
                replacement
                    .as_str()
                    .map(|replacement| (pattern.clone(), replacement.to_string()))
            })
            .collect()
    }

    pub fn verbose_logging(&self) -> bool {
        self.diagnostic_logging || self.trace
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<i64>,
}

impl Source {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            name: None,
            path: Some(path.into()),
            source_reference: None,
        }
    }

    /// Source reference, treating the protocol's `0` as "none".
    pub fn reference(&self) -> Option<i64> {
        self.source_reference.filter(|reference| *reference > 0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceBreakpoint {
    pub line: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
}

impl SourceBreakpoint {
    pub fn at(line: i64, column: Option<i64>) -> Self {
        Self { line, column }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArgs {
    pub source: Source,
    #[serde(default)]
    pub breakpoints: Vec<SourceBreakpoint>,
    /// Legacy shape; folded into `breakpoints` by [`SetBreakpointsArgs::normalize`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<i64>>,
}

impl SetBreakpointsArgs {
    pub fn normalize(&mut self) {
        if let Some(lines) = self.lines.take() {
            if self.breakpoints.is_empty() {
                self.breakpoints = lines
                    .into_iter()
                    .map(|line| SourceBreakpoint::at(line, None))
                    .collect();
            }
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SetExceptionBreakpointsArgs {
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadArgs {
    #[serde(default)]
    pub thread_id: i64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArgs {
    #[serde(default)]
    pub thread_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArgs {
    pub frame_id: i64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArgs {
    pub variables_reference: i64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceArgs {
    #[serde(default)]
    pub source_reference: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

impl SourceArgs {
    pub fn reference(&self) -> Option<i64> {
        if self.source_reference > 0 {
            return Some(self.source_reference);
        }
        self.source.as_ref().and_then(Source::reference)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArgs {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Decoded arguments of a recognized command.
#[derive(Clone, Debug)]
pub enum RequestArgs {
    Initialize(InitializeArgs),
    Launch(Value),
    Attach(AttachArgs),
    Disconnect(DisconnectArgs),
    SetBreakpoints(SetBreakpointsArgs),
    SetExceptionBreakpoints(SetExceptionBreakpointsArgs),
    ConfigurationDone,
    Continue(ThreadArgs),
    Next(ThreadArgs),
    StepIn(ThreadArgs),
    StepOut(ThreadArgs),
    Pause(ThreadArgs),
    Threads,
    StackTrace(StackTraceArgs),
    Scopes(ScopesArgs),
    Variables(VariablesArgs),
    Source(SourceArgs),
    Evaluate(EvaluateArgs),
}

fn decode<T: DeserializeOwned>(arguments: Value) -> Result<T, serde_json::Error> {
    match arguments {
        Value::Null => serde_json::from_value(Value::Object(Map::new())),
        other => serde_json::from_value(other),
    }
}

impl RequestArgs {
    pub fn parse(command: Command, arguments: Value) -> Result<Self, serde_json::Error> {
        let args = match command {
            Command::Initialize => RequestArgs::Initialize(decode(arguments)?),
            Command::Launch => RequestArgs::Launch(arguments),
            Command::Attach => RequestArgs::Attach(decode(arguments)?),
            Command::Disconnect => RequestArgs::Disconnect(decode(arguments)?),
            Command::SetBreakpoints => {
                let mut args: SetBreakpointsArgs = decode(arguments)?;
                args.normalize();
                RequestArgs::SetBreakpoints(args)
            }
            Command::SetExceptionBreakpoints => {
                RequestArgs::SetExceptionBreakpoints(decode(arguments)?)
            }
            Command::ConfigurationDone => RequestArgs::ConfigurationDone,
            Command::Continue => RequestArgs::Continue(decode(arguments)?),
            Command::Next => RequestArgs::Next(decode(arguments)?),
            Command::StepIn => RequestArgs::StepIn(decode(arguments)?),
            Command::StepOut => RequestArgs::StepOut(decode(arguments)?),
            Command::Pause => RequestArgs::Pause(decode(arguments)?),
            Command::Threads => RequestArgs::Threads,
            Command::StackTrace => RequestArgs::StackTrace(decode(arguments)?),
            Command::Scopes => RequestArgs::Scopes(decode(arguments)?),
            Command::Variables => RequestArgs::Variables(decode(arguments)?),
            Command::Source => RequestArgs::Source(decode(arguments)?),
            Command::Evaluate => RequestArgs::Evaluate(decode(arguments)?),
        };
        Ok(args)
    }

    pub fn command(&self) -> Command {
        match self {
            RequestArgs::Initialize(_) => Command::Initialize,
            RequestArgs::Launch(_) => Command::Launch,
            RequestArgs::Attach(_) => Command::Attach,
            RequestArgs::Disconnect(_) => Command::Disconnect,
            RequestArgs::SetBreakpoints(_) => Command::SetBreakpoints,
            RequestArgs::SetExceptionBreakpoints(_) => Command::SetExceptionBreakpoints,
            RequestArgs::ConfigurationDone => Command::ConfigurationDone,
            RequestArgs::Continue(_) => Command::Continue,
            RequestArgs::Next(_) => Command::Next,
            RequestArgs::StepIn(_) => Command::StepIn,
            RequestArgs::StepOut(_) => Command::StepOut,
            RequestArgs::Pause(_) => Command::Pause,
            RequestArgs::Threads => Command::Threads,
            RequestArgs::StackTrace(_) => Command::StackTrace,
            RequestArgs::Scopes(_) => Command::Scopes,
            RequestArgs::Variables(_) => Command::Variables,
            RequestArgs::Source(_) => Command::Source,
            RequestArgs::Evaluate(_) => Command::Evaluate,
        }
    }
}
