//! Wire types for the subset of the DevTools protocol the bridge speaks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound command frame.
#[derive(Debug, Serialize)]
pub struct CdpRequest<'a> {
    pub id: u64,
    pub method: &'a str,
    pub params: &'a Value,
}

/// Any inbound frame: a response when `id` is set, a notification when only `method` is.
#[derive(Debug, Deserialize)]
pub struct CdpMessage {
    pub id: Option<u64>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
    pub result: Option<Value>,
    pub error: Option<CdpErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct CdpErrorBody {
    pub code: i64,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub script_id: String,
    pub line_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsedEvent {
    pub script_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "sourceMapURL", default)]
    pub source_map_url: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unserializable_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl RemoteObject {
    pub fn is_primitive(&self) -> bool {
        self.object_id.is_none()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub object: RemoteObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub call_frame_id: String,
    #[serde(default)]
    pub function_name: String,
    pub location: Location,
    #[serde(default)]
    pub scope_chain: Vec<ScopeDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub this: Option<RemoteObject>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedEvent {
    #[serde(default)]
    pub call_frames: Vec<CallFrame>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RemoteObject>,
    #[serde(default)]
    pub hit_breakpoints: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointResolvedEvent {
    pub breakpoint_id: String,
    pub location: Location,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleApiCalledEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: Vec<RemoteObject>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointResult {
    pub breakpoint_id: String,
    pub actual_location: Location,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlResult {
    pub breakpoint_id: String,
    #[serde(default)]
    pub locations: Vec<Location>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<RemoteObject>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GetPropertiesResult {
    #[serde(default)]
    pub result: Vec<PropertyDescriptor>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<RemoteObject>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    pub result: RemoteObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetScriptSourceResult {
    pub script_source: String,
}
