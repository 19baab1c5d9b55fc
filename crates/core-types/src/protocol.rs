//! Wire envelopes of the client-facing protocol.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ErrorResponse;

/// Commands the bridge recognizes. Anything else is rejected before dispatch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    Initialize,
    Launch,
    Attach,
    Disconnect,
    SetBreakpoints,
    SetExceptionBreakpoints,
    ConfigurationDone,
    Continue,
    Next,
    StepIn,
    StepOut,
    Pause,
    Threads,
    StackTrace,
    Scopes,
    Variables,
    Source,
    Evaluate,
}

impl Command {
    pub const ALL: [Command; 18] = [
        Command::Initialize,
        Command::Launch,
        Command::Attach,
        Command::Disconnect,
        Command::SetBreakpoints,
        Command::SetExceptionBreakpoints,
        Command::ConfigurationDone,
        Command::Continue,
        Command::Next,
        Command::StepIn,
        Command::StepOut,
        Command::Pause,
        Command::Threads,
        Command::StackTrace,
        Command::Scopes,
        Command::Variables,
        Command::Source,
        Command::Evaluate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Initialize => "initialize",
            Command::Launch => "launch",
            Command::Attach => "attach",
            Command::Disconnect => "disconnect",
            Command::SetBreakpoints => "setBreakpoints",
            Command::SetExceptionBreakpoints => "setExceptionBreakpoints",
            Command::ConfigurationDone => "configurationDone",
            Command::Continue => "continue",
            Command::Next => "next",
            Command::StepIn => "stepIn",
            Command::StepOut => "stepOut",
            Command::Pause => "pause",
            Command::Threads => "threads",
            Command::StackTrace => "stackTrace",
            Command::Scopes => "scopes",
            Command::Variables => "variables",
            Command::Source => "source",
            Command::Evaluate => "evaluate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let command = match name {
            "initialize" => Command::Initialize,
            "launch" => Command::Launch,
            "attach" => Command::Attach,
            "disconnect" => Command::Disconnect,
            "setBreakpoints" => Command::SetBreakpoints,
            "setExceptionBreakpoints" => Command::SetExceptionBreakpoints,
            "configurationDone" => Command::ConfigurationDone,
            "continue" => Command::Continue,
            "next" => Command::Next,
            "stepIn" => Command::StepIn,
            "stepOut" => Command::StepOut,
            "pause" => Command::Pause,
            "threads" => Command::Threads,
            "stackTrace" => Command::StackTrace,
            "scopes" => Command::Scopes,
            "variables" => Command::Variables,
            "source" => Command::Source,
            "evaluate" => Command::Evaluate,
            _ => return None,
        };
        Some(command)
    }
}

/// Inbound client request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    pub seq: i64,
    #[serde(rename = "type", default = "request_kind")]
    pub kind: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

fn request_kind() -> String {
    "request".to_string()
}

impl Request {
    pub fn new(seq: i64, command: impl Into<String>, arguments: Value) -> Self {
        Self {
            seq,
            kind: request_kind(),
            command: command.into(),
            arguments,
        }
    }
}

/// Outbound response. `seq` is stamped by the writer that puts it on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    pub seq: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    pub fn success(request: &Request, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            kind: "response".to_string(),
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    pub fn error(request: &Request, error: ErrorResponse) -> Self {
        Self {
            seq: 0,
            kind: "response".to_string(),
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(error.format.clone()),
            body: Some(json!({ "error": error })),
        }
    }

    /// Error id carried in the body, if this is a failed response.
    pub fn error_id(&self) -> Option<i64> {
        self.body
            .as_ref()
            .and_then(|body| body.pointer("/error/id"))
            .and_then(Value::as_i64)
    }
}

/// Outbound event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub seq: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    pub fn new(event: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            kind: "event".to_string(),
            event: event.into(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_round_trip_through_lookup() {
        for command in Command::ALL {
            assert_eq!(Command::from_name(command.as_str()), Some(command));
        }
        assert_eq!(Command::from_name("setVariable"), None);
        assert_eq!(Command::from_name("SetBreakpoints"), None);
    }

    #[test]
    fn error_response_carries_structured_body() {
        let request = Request::new(7, "frobnicate", Value::Null);
        let response = Response::error(&request, ErrorResponse::unknown_command("frobnicate"));
        assert!(!response.success);
        assert_eq!(response.request_seq, 7);
        assert_eq!(response.error_id(), Some(ErrorResponse::UNKNOWN_COMMAND));
        assert_eq!(
            response.message.as_deref(),
            Some("Unrecognized request: frobnicate")
        );
    }

    #[test]
    fn request_without_arguments_deserializes() {
        let request: Request =
            serde_json::from_str(r#"{"seq":1,"type":"request","command":"threads"}"#)
                .expect("parse request");
        assert_eq!(request.command, "threads");
        assert!(request.arguments.is_null());
    }
}
