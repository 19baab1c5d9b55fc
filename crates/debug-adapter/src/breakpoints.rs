//! Committed breakpoints per script url.
//!
//! Every `setBreakpoints` request replaces the whole set for its url: the previously
//! committed ids are removed one at a time, then the new locations are added together.
//! Callers serialize requests through [`crate::SerialQueue`]. The recorded set tracks the
//! target command by command, so a request abandoned partway (a timeout) leaves every id
//! that may still be live on the target in the set for the next request to remove.

use std::collections::HashMap;

use bridge_core_types::{Breakpoint, SourceBreakpoint};
use cdp_adapter::protocol::{Location, SetBreakpointByUrlResult, SetBreakpointResult};
use cdp_adapter::{CdpConnection, CdpError};
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// How the breakpoints of one request are addressed on the target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BreakpointTarget {
    /// Placed by url, so the target rebinds them after a reload.
    Url(String),
    /// Placeholder-url scripts only exist by id.
    Script { url: String, script_id: String },
}

impl BreakpointTarget {
    pub fn url(&self) -> &str {
        match self {
            BreakpointTarget::Url(url) => url,
            BreakpointTarget::Script { url, .. } => url,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommittedBreakpoint {
    pub url: String,
    pub breakpoint_id: String,
    pub requested_line: i64,
    pub requested_column: Option<i64>,
    pub actual_line: Option<i64>,
    pub actual_column: Option<i64>,
}

impl CommittedBreakpoint {
    fn resolve(&mut self, location: &Location) {
        self.actual_line = Some(location.line_number);
        self.actual_column = location.column_number;
    }

    /// The target's resolved location wins over the requested one.
    pub fn report(&self) -> Breakpoint {
        match self.actual_line {
            Some(line) => Breakpoint::verified(line, self.actual_column),
            None => Breakpoint::unverified(self.requested_line, self.requested_column, None),
        }
    }
}

#[derive(Debug, Default)]
pub struct BreakpointManager {
    committed: Mutex<HashMap<String, Vec<CommittedBreakpoint>>>,
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the committed set for `target` with `requested`. Results come back in
    /// request order; a location the target rejects is reported unverified at the
    /// requested line instead of failing the request.
    pub async fn replace(
        &self,
        connection: &CdpConnection,
        target: &BreakpointTarget,
        requested: &[SourceBreakpoint],
    ) -> Vec<Breakpoint> {
        let url = target.url();
        let previous = self.committed_for(url);
        for breakpoint in previous {
            let params = json!({ "breakpointId": breakpoint.breakpoint_id });
            if let Err(err) = connection
                .send_command("Debugger.removeBreakpoint", params)
                .await
            {
                warn!(
                    target: "breakpoints",
                    url,
                    id = %breakpoint.breakpoint_id,
                    %err,
                    "failed to remove breakpoint"
                );
            }
            // A rejected removal means the id is already gone on the target.
            self.forget(url, &breakpoint.breakpoint_id);
        }

        // Each add is recorded as soon as the target answers, so a request cancelled
        // midway leaves the committed set matching what the target holds.
        let outcomes = join_all(requested.iter().map(|breakpoint| async move {
            let placed = add_breakpoint(connection, target, breakpoint).await?;
            self.record(placed.clone());
            Ok::<_, CdpError>(placed)
        }))
        .await;

        let mut results = Vec::with_capacity(requested.len());
        let mut committed = 0;
        for (breakpoint, outcome) in requested.iter().zip(outcomes) {
            match outcome {
                Ok(placed) => {
                    results.push(placed.report());
                    committed += 1;
                }
                Err(err) => {
                    warn!(
                        target: "breakpoints",
                        url,
                        line = breakpoint.line,
                        %err,
                        "target rejected breakpoint"
                    );
                    results.push(Breakpoint::unverified(
                        breakpoint.line,
                        breakpoint.column,
                        Some(err.to_string()),
                    ));
                }
            }
        }

        debug!(
            target: "breakpoints",
            url,
            requested = requested.len(),
            committed,
            "breakpoints replaced"
        );
        results
    }

    fn forget(&self, url: &str, breakpoint_id: &str) {
        let mut committed = self.committed.lock();
        if let Some(set) = committed.get_mut(url) {
            set.retain(|breakpoint| breakpoint.breakpoint_id != breakpoint_id);
            if set.is_empty() {
                committed.remove(url);
            }
        }
    }

    fn record(&self, placed: CommittedBreakpoint) {
        self.committed
            .lock()
            .entry(placed.url.clone())
            .or_default()
            .push(placed);
    }

    /// Applies a `Debugger.breakpointResolved` notification. Returns false for ids this
    /// session never committed.
    pub fn on_resolved(&self, breakpoint_id: &str, location: &Location) -> bool {
        let mut committed = self.committed.lock();
        let found = committed
            .values_mut()
            .flat_map(|set| set.iter_mut())
            .find(|breakpoint| breakpoint.breakpoint_id == breakpoint_id);
        match found {
            Some(breakpoint) => {
                breakpoint.resolve(location);
                true
            }
            None => false,
        }
    }

    pub fn committed_for(&self, url: &str) -> Vec<CommittedBreakpoint> {
        self.committed.lock().get(url).cloned().unwrap_or_default()
    }

    pub fn clear(&self) {
        self.committed.lock().clear();
    }
}

async fn add_breakpoint(
    connection: &CdpConnection,
    target: &BreakpointTarget,
    requested: &SourceBreakpoint,
) -> Result<CommittedBreakpoint, CdpError> {
    let mut committed = CommittedBreakpoint {
        url: target.url().to_string(),
        breakpoint_id: String::new(),
        requested_line: requested.line,
        requested_column: requested.column,
        actual_line: None,
        actual_column: None,
    };

    match target {
        BreakpointTarget::Url(url) => {
            let mut params = Map::new();
            params.insert("url".into(), Value::from(url.as_str()));
            params.insert("lineNumber".into(), Value::from(requested.line));
            if let Some(column) = requested.column {
                params.insert("columnNumber".into(), Value::from(column));
            }
            let result: SetBreakpointByUrlResult = connection
                .call("Debugger.setBreakpointByUrl", Value::Object(params))
                .await?;
            committed.breakpoint_id = result.breakpoint_id;
            if let Some(location) = result.locations.first() {
                committed.resolve(location);
            }
        }
        BreakpointTarget::Script { script_id, .. } => {
            let location = Location {
                script_id: script_id.clone(),
                line_number: requested.line,
                column_number: requested.column,
            };
            let result: SetBreakpointResult = connection
                .call("Debugger.setBreakpoint", json!({ "location": location }))
                .await?;
            committed.breakpoint_id = result.breakpoint_id;
            committed.resolve(&result.actual_location);
        }
    }
    Ok(committed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::{CdpConfig, MemoryTransport, ScriptedTarget};
    use std::sync::Arc;

    async fn connected<F>(responder: F) -> (CdpConnection, ScriptedTarget)
    where
        F: FnMut(&str, &Value) -> Result<Value, (i64, String)> + Send + 'static,
    {
        let (transport, peer) = MemoryTransport::pair();
        let target = peer.serve(responder);
        let connection = CdpConnection::new(Arc::new(transport), CdpConfig::default());
        connection.connect("memory://target").await.expect("connect");
        (connection, target)
    }

    fn by_url_target() -> impl FnMut(&str, &Value) -> Result<Value, (i64, String)> + Send + 'static {
        let mut next = 0;
        move |method, params| match method {
            "Debugger.setBreakpointByUrl" => {
                next += 1;
                let line = params["lineNumber"].as_i64().unwrap_or_default();
                if line == 99 {
                    return Err((-32000, "no script at that line".into()));
                }
                // snap one line down
                Ok(json!({
                    "breakpointId": format!("bp-{next}"),
                    "locations": [{ "scriptId": "7", "lineNumber": line + 1, "columnNumber": 0 }]
                }))
            }
            _ => Ok(json!({})),
        }
    }

    #[tokio::test]
    async fn reports_resolved_locations_and_failures_in_order() {
        let (connection, _target) = connected(by_url_target()).await;
        let manager = BreakpointManager::new();
        let target = BreakpointTarget::Url("http://localhost/app.js".into());

        let results = manager
            .replace(
                &connection,
                &target,
                &[SourceBreakpoint::at(4, None), SourceBreakpoint::at(99, Some(3))],
            )
            .await;
        assert_eq!(results[0], Breakpoint::verified(5, Some(0)));
        assert!(!results[1].verified);
        assert_eq!(results[1].line, 99);
        assert_eq!(results[1].column, Some(3));
        assert_eq!(manager.committed_for("http://localhost/app.js").len(), 1);
    }

    #[tokio::test]
    async fn second_request_removes_the_first_set() {
        let (connection, target) = connected(by_url_target()).await;
        let manager = BreakpointManager::new();
        let url = BreakpointTarget::Url("http://localhost/app.js".into());

        manager
            .replace(&connection, &url, &[SourceBreakpoint::at(1, None), SourceBreakpoint::at(2, None)])
            .await;
        manager
            .replace(&connection, &url, &[SourceBreakpoint::at(8, None)])
            .await;

        let removed: Vec<_> = target
            .commands_named("Debugger.removeBreakpoint")
            .into_iter()
            .map(|command| command.params["breakpointId"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&"bp-1".to_string()));
        assert!(removed.contains(&"bp-2".to_string()));

        let committed = manager.committed_for("http://localhost/app.js");
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].requested_line, 8);

        manager.replace(&connection, &url, &[]).await;
        assert!(manager.committed_for("http://localhost/app.js").is_empty());
    }

    #[tokio::test]
    async fn abandoned_request_keeps_unremoved_ids() {
        let (connection, target) = connected(by_url_target()).await;
        let manager = BreakpointManager::new();
        let url = BreakpointTarget::Url("http://localhost/app.js".into());

        manager
            .replace(&connection, &url, &[SourceBreakpoint::at(1, None)])
            .await;
        target.stall("Debugger.removeBreakpoint");
        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            manager.replace(&connection, &url, &[SourceBreakpoint::at(5, None)]),
        )
        .await;
        assert!(abandoned.is_err());

        let committed = manager.committed_for("http://localhost/app.js");
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].breakpoint_id, "bp-1");

        target.answer("Debugger.removeBreakpoint");
        manager.replace(&connection, &url, &[]).await;
        let removed: Vec<_> = target
            .commands_named("Debugger.removeBreakpoint")
            .into_iter()
            .map(|command| command.params["breakpointId"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(removed, vec!["bp-1".to_string(), "bp-1".to_string()]);
        assert!(manager.committed_for("http://localhost/app.js").is_empty());
    }

    #[tokio::test]
    async fn placeholder_scripts_are_addressed_by_id() {
        let (connection, target) = connected(|method, params| match method {
            "Debugger.setBreakpoint" => Ok(json!({
                "breakpointId": "id-bp",
                "actualLocation": params["location"].clone()
            })),
            _ => Ok(json!({})),
        })
        .await;
        let manager = BreakpointManager::new();
        let script = BreakpointTarget::Script {
            url: "debugadapter://12".into(),
            script_id: "12".into(),
        };
        let results = manager
            .replace(&connection, &script, &[SourceBreakpoint::at(3, Some(1))])
            .await;
        assert_eq!(results, vec![Breakpoint::verified(3, Some(1))]);
        let sent = target.commands_named("Debugger.setBreakpoint");
        assert_eq!(sent[0].params["location"]["scriptId"], "12");
        assert!(target.commands_named("Debugger.setBreakpointByUrl").is_empty());
    }

    #[tokio::test]
    async fn resolution_updates_pending_breakpoint() {
        let (connection, _target) = connected(|method, _| match method {
            "Debugger.setBreakpointByUrl" => Ok(json!({ "breakpointId": "late", "locations": [] })),
            _ => Ok(json!({})),
        })
        .await;
        let manager = BreakpointManager::new();
        let url = BreakpointTarget::Url("http://localhost/lazy.js".into());
        let results = manager
            .replace(&connection, &url, &[SourceBreakpoint::at(10, None)])
            .await;
        assert!(!results[0].verified);

        let location = Location {
            script_id: "3".into(),
            line_number: 11,
            column_number: Some(2),
        };
        assert!(manager.on_resolved("late", &location));
        assert!(!manager.on_resolved("unknown", &location));
        let committed = manager.committed_for("http://localhost/lazy.js");
        assert_eq!(committed[0].report(), Breakpoint::verified(11, Some(2)));

        manager.clear();
        assert!(manager.committed_for("http://localhost/lazy.js").is_empty());
    }
}
