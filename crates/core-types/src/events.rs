use serde::{Deserialize, Serialize};

use crate::protocol::Event;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Step,
    Breakpoint,
    Exception,
    Pause,
    Entry,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Step => "step",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Exception => "exception",
            StopReason::Pause => "pause",
            StopReason::Entry => "entry",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: StopReason,
    pub thread_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedEventBody {
    pub thread_id: i64,
    pub all_threads_continued: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OutputEventBody {
    pub category: String,
    pub output: String,
}

/// Internal notification that the target parsed a script.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsedBody {
    pub script_url: String,
    #[serde(rename = "sourceMapURL", default, skip_serializing_if = "Option::is_none")]
    pub source_map_url: Option<String>,
}

/// Everything the adapter can emit toward the pipeline.
///
/// The last three variants are internal: transformers consume them and the proxy never
/// forwards them to the client.
#[derive(Clone, Debug, PartialEq)]
pub enum AdapterEvent {
    Initialized,
    Stopped(StoppedEventBody),
    Continued(ContinuedEventBody),
    Output(OutputEventBody),
    Terminated,
    ScriptParsed(ScriptParsedBody),
    ClearTargetContext,
    ClearClientContext,
}

impl AdapterEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AdapterEvent::Initialized => "initialized",
            AdapterEvent::Stopped(_) => "stopped",
            AdapterEvent::Continued(_) => "continued",
            AdapterEvent::Output(_) => "output",
            AdapterEvent::Terminated => "terminated",
            AdapterEvent::ScriptParsed(_) => "scriptParsed",
            AdapterEvent::ClearTargetContext => "clearTargetContext",
            AdapterEvent::ClearClientContext => "clearClientContext",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AdapterEvent::ScriptParsed(_)
                | AdapterEvent::ClearTargetContext
                | AdapterEvent::ClearClientContext
        )
    }

    pub fn stopped(reason: StopReason, thread_id: i64) -> Self {
        AdapterEvent::Stopped(StoppedEventBody {
            reason,
            thread_id,
            text: None,
        })
    }

    pub fn continued(thread_id: i64) -> Self {
        AdapterEvent::Continued(ContinuedEventBody {
            thread_id,
            all_threads_continued: true,
        })
    }

    pub fn output(category: impl Into<String>, output: impl Into<String>) -> Self {
        AdapterEvent::Output(OutputEventBody {
            category: category.into(),
            output: output.into(),
        })
    }

    /// Client-facing envelope, or `None` for internal events.
    pub fn into_event(self) -> Option<Event> {
        if self.is_internal() {
            return None;
        }
        let name = self.name();
        let body = match self {
            AdapterEvent::Stopped(body) => serde_json::to_value(body).ok(),
            AdapterEvent::Continued(body) => serde_json::to_value(body).ok(),
            AdapterEvent::Output(body) => serde_json::to_value(body).ok(),
            _ => None,
        };
        Some(Event::new(name, body.filter(|value| !value.is_null())))
    }
}

impl From<ScriptParsedBody> for AdapterEvent {
    fn from(body: ScriptParsedBody) -> Self {
        AdapterEvent::ScriptParsed(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_events_never_become_client_events() {
        let parsed = AdapterEvent::ScriptParsed(ScriptParsedBody {
            script_url: "http://localhost/app.js".into(),
            source_map_url: None,
        });
        assert!(parsed.is_internal());
        assert!(parsed.into_event().is_none());
        assert!(AdapterEvent::ClearClientContext.into_event().is_none());
        assert!(AdapterEvent::ClearTargetContext.into_event().is_none());
    }

    #[test]
    fn stopped_event_serializes_reason() {
        let event = AdapterEvent::stopped(StopReason::Breakpoint, 1)
            .into_event()
            .expect("client event");
        assert_eq!(event.event, "stopped");
        let body = event.body.expect("body");
        assert_eq!(body["reason"], "breakpoint");
        assert_eq!(body["threadId"], 1);
    }

    #[test]
    fn terminated_has_no_body() {
        let event = AdapterEvent::Terminated.into_event().expect("client event");
        assert_eq!(event.event, "terminated");
        assert!(event.body.is_none());
    }
}
