//! Typed response bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::requests::Source;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionBreakpointsFilter {
    pub filter: String,
    pub label: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_configuration_done_request: bool,
    pub supports_evaluate_for_hovers: bool,
    pub supports_conditional_breakpoints: bool,
    pub exception_breakpoint_filters: Vec<ExceptionBreakpointsFilter>,
}

impl Capabilities {
    pub fn chrome() -> Self {
        Self {
            supports_configuration_done_request: true,
            supports_evaluate_for_hovers: true,
            supports_conditional_breakpoints: false,
            exception_breakpoint_filters: vec![
                ExceptionBreakpointsFilter {
                    filter: "all".to_string(),
                    label: "All Exceptions".to_string(),
                    default: false,
                },
                ExceptionBreakpointsFilter {
                    filter: "uncaught".to_string(),
                    label: "Uncaught Exceptions".to_string(),
                    default: true,
                },
            ],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub verified: bool,
    pub line: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Breakpoint {
    pub fn verified(line: i64, column: Option<i64>) -> Self {
        Self {
            verified: true,
            line,
            column,
            message: None,
        }
    }

    pub fn unverified(line: i64, column: Option<i64>, message: Option<String>) -> Self {
        Self {
            verified: false,
            line,
            column,
            message,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SetBreakpointsBody {
    pub breakpoints: Vec<Breakpoint>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Thread {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ThreadsBody {
    pub threads: Vec<Thread>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub line: i64,
    pub column: i64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceBody {
    pub stack_frames: Vec<StackFrame>,
    pub total_frames: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: String,
    pub variables_reference: i64,
    pub expensive: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ScopesBody {
    pub scopes: Vec<Scope>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub variables_reference: i64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct VariablesBody {
    pub variables: Vec<Variable>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBody {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateBody {
    pub result: String,
    pub variables_reference: i64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueBody {
    pub all_threads_continued: bool,
}

/// Result of a successfully handled request.
#[derive(Clone, Debug)]
pub enum ResponseBody {
    Empty,
    Capabilities(Capabilities),
    SetBreakpoints(SetBreakpointsBody),
    Threads(ThreadsBody),
    StackTrace(StackTraceBody),
    Scopes(ScopesBody),
    Variables(VariablesBody),
    Source(SourceBody),
    Evaluate(EvaluateBody),
    Continue(ContinueBody),
}

impl ResponseBody {
    pub fn into_value(self) -> Option<Value> {
        let value = match self {
            ResponseBody::Empty => return None,
            ResponseBody::Capabilities(body) => serde_json::to_value(body),
            ResponseBody::SetBreakpoints(body) => serde_json::to_value(body),
            ResponseBody::Threads(body) => serde_json::to_value(body),
            ResponseBody::StackTrace(body) => serde_json::to_value(body),
            ResponseBody::Scopes(body) => serde_json::to_value(body),
            ResponseBody::Variables(body) => serde_json::to_value(body),
            ResponseBody::Source(body) => serde_json::to_value(body),
            ResponseBody::Evaluate(body) => serde_json::to_value(body),
            ResponseBody::Continue(body) => serde_json::to_value(body),
        };
        // Plain structs of strings and integers always serialize.
        value.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_has_no_value() {
        assert!(ResponseBody::Empty.into_value().is_none());
    }

    #[test]
    fn stack_trace_body_uses_client_field_names() {
        let body = ResponseBody::StackTrace(StackTraceBody {
            stack_frames: vec![StackFrame {
                id: 1000,
                name: "main".into(),
                source: Some(Source::from_path("/web/app.js")),
                line: 4,
                column: 2,
            }],
            total_frames: 1,
        });
        let value = body.into_value().expect("body");
        assert_eq!(value["totalFrames"], 1);
        assert_eq!(value["stackFrames"][0]["source"]["path"], "/web/app.js");
        assert!(value["stackFrames"][0]["source"]
            .get("sourceReference")
            .is_none());
    }
}
