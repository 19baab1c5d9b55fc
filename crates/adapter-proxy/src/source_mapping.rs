//! Authored <-> generated coordinates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_core_types::{
    AdapterEvent, Breakpoint, RequestArgs, ResponseBody, SetBreakpointsArgs, SourceBreakpoint,
};
use bridge_source_maps::{paths, SourceMaps};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::TransformError;
use crate::pending::PendingRequests;
use crate::transformer::Transformer;

/// What a rewritten setBreakpoints needs to undo its response.
#[derive(Debug)]
struct Split {
    authored_path: String,
    generated_path: String,
    requested: Vec<SourceBreakpoint>,
}

#[derive(Debug, Default)]
struct State {
    /// Canonical client paths of every script the target has parsed.
    runtime_paths: HashSet<String>,
    /// Latest breakpoints per authored file, re-sent whenever a sibling in the same
    /// generated file is updated.
    authored_requests: HashMap<String, (String, Vec<SourceBreakpoint>)>,
    splits: HashMap<i64, Split>,
}

/// Rewrites breakpoints set in authored files onto the generated script that contains
/// them, and maps stack frames back.
///
/// Several authored files can compile into one generated script. The target only knows
/// the generated script and replaces all of its breakpoints on every request, so a
/// request for one authored file carries the latest breakpoints of its siblings too; the
/// response is cut back to the requesting file's own entries.
#[derive(Default)]
pub struct SourceMapTransformer {
    engine: Mutex<Option<Arc<SourceMaps>>>,
    state: Mutex<State>,
    pending: PendingRequests,
}

enum Resolution {
    Generated(String),
    PassThrough,
}

impl SourceMapTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn engine(&self) -> Option<Arc<SourceMaps>> {
        self.engine.lock().clone()
    }

    fn resolve(&self, engine: &SourceMaps, path: &str) -> Option<Resolution> {
        if let Some(generated) = engine.generated_path_for(path) {
            return Some(Resolution::Generated(generated));
        }
        if self
            .state
            .lock()
            .runtime_paths
            .contains(&paths::canonical_key(path))
        {
            return Some(Resolution::PassThrough);
        }
        None
    }

    async fn resolve_or_wait(
        &self,
        engine: &SourceMaps,
        path: &str,
    ) -> Result<Resolution, TransformError> {
        if let Some(resolution) = self.resolve(engine, path) {
            return Ok(resolution);
        }
        let waiter = self.pending.wait(&paths::canonical_key(path));
        if let Some(resolution) = self.resolve(engine, path) {
            return Ok(resolution);
        }
        debug!(target: "adapter-proxy", path, "setBreakpoints pending until a script or map claims the file");
        waiter.await.map_err(|_| TransformError::Abandoned {
            path: path.to_string(),
        })?;
        // released by a map for the file or by the file loading as a plain script
        Ok(self
            .resolve(engine, path)
            .unwrap_or(Resolution::PassThrough))
    }

    fn rewrite_breakpoints(
        &self,
        engine: &SourceMaps,
        seq: i64,
        set: &mut SetBreakpointsArgs,
        authored_path: String,
        generated_path: String,
    ) {
        let authored_key = paths::canonical_key(&authored_path);
        let requested = set.breakpoints.clone();

        // own breakpoints first, so the response prefix lines up with the request
        let mut rewritten: Vec<SourceBreakpoint> = requested
            .iter()
            .map(|bp| {
                match engine.map_to_generated(&authored_path, bp.line, bp.column.unwrap_or(0)) {
                    Some(position) => SourceBreakpoint::at(position.line, Some(position.column)),
                    None => SourceBreakpoint::at(bp.line, Some(0)),
                }
            })
            .collect();

        let mut state = self.state.lock();
        for sibling in engine.authored_paths_for(&generated_path) {
            let key = paths::canonical_key(&sibling);
            if key == authored_key {
                continue;
            }
            let Some((sibling_path, breakpoints)) = state.authored_requests.get(&key) else {
                continue;
            };
            rewritten.extend(breakpoints.iter().filter_map(|bp| {
                engine
                    .map_to_generated(sibling_path, bp.line, bp.column.unwrap_or(0))
                    .map(|position| SourceBreakpoint::at(position.line, Some(position.column)))
            }));
        }
        trace!(
            target: "adapter-proxy",
            authored = %authored_path,
            generated = %generated_path,
            own = requested.len(),
            total = rewritten.len(),
            "breakpoints mapped to generated script"
        );

        state
            .authored_requests
            .insert(authored_key, (authored_path.clone(), requested.clone()));
        state.splits.insert(
            seq,
            Split {
                authored_path,
                generated_path: generated_path.clone(),
                requested,
            },
        );
        drop(state);

        set.source.path = Some(generated_path);
        set.source.name = None;
        set.breakpoints = rewritten;
    }

    fn restore_breakpoints(&self, engine: Option<&SourceMaps>, split: Split, list: &mut Vec<Breakpoint>) {
        list.truncate(split.requested.len());
        let authored_key = paths::canonical_key(&split.authored_path);
        for (breakpoint, requested) in list.iter_mut().zip(&split.requested) {
            let mapped = engine
                .filter(|_| breakpoint.verified)
                .and_then(|engine| {
                    engine.map_to_authored(
                        &split.generated_path,
                        breakpoint.line,
                        breakpoint.column.unwrap_or(0),
                    )
                })
                .filter(|position| paths::canonical_key(&position.source) == authored_key);
            match mapped {
                Some(position) => {
                    breakpoint.line = position.line;
                    breakpoint.column = Some(position.column);
                }
                None => {
                    breakpoint.line = requested.line;
                    breakpoint.column = requested.column;
                }
            }
        }
    }

    fn reset_client_context(&self) {
        *self.state.lock() = State::default();
        *self.engine.lock() = None;
        let abandoned = self.pending.abandon_all();
        if abandoned > 0 {
            debug!(target: "adapter-proxy", abandoned, "pending requests abandoned");
        }
    }
}

#[async_trait]
impl Transformer for SourceMapTransformer {
    fn name(&self) -> &'static str {
        "source-maps"
    }

    async fn transform_request(
        &self,
        seq: i64,
        args: &mut RequestArgs,
    ) -> Result<(), TransformError> {
        match args {
            RequestArgs::Attach(attach) => {
                let engine = attach
                    .source_maps
                    .then(|| Arc::new(SourceMaps::new(attach.web_root.clone(), &attach.path_overrides())));
                debug!(target: "adapter-proxy", enabled = engine.is_some(), "source map support configured");
                *self.engine.lock() = engine;
            }
            RequestArgs::SetBreakpoints(set) => {
                let Some(engine) = self.engine() else {
                    return Ok(());
                };
                let Some(path) = set.source.path.clone() else {
                    return Ok(());
                };
                if paths::is_url(&path) {
                    return Ok(());
                }
                if let Resolution::Generated(generated) =
                    self.resolve_or_wait(&engine, &path).await?
                {
                    self.rewrite_breakpoints(&engine, seq, set, path, generated);
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn transform_response(
        &self,
        seq: i64,
        body: &mut ResponseBody,
    ) -> Result<(), TransformError> {
        let engine = self.engine();
        match body {
            ResponseBody::SetBreakpoints(set) => {
                let split = self.state.lock().splits.remove(&seq);
                if let Some(split) = split {
                    self.restore_breakpoints(engine.as_deref(), split, &mut set.breakpoints);
                }
            }
            ResponseBody::StackTrace(trace) => {
                for frame in &mut trace.stack_frames {
                    let Some(source) = frame.source.as_mut() else {
                        continue;
                    };
                    let Some(path) = source.path.clone() else {
                        continue;
                    };
                    let authored = engine
                        .as_deref()
                        .and_then(|engine| engine.map_to_authored(&path, frame.line, frame.column))
                        .filter(|position| paths::file_exists(&position.source));
                    if let Some(position) = authored {
                        source.name = Some(display_name(&position.source));
                        source.path = Some(position.source);
                        source.source_reference = None;
                        frame.line = position.line;
                        frame.column = position.column;
                    } else if source.reference().is_some() {
                        // a file on disk is preferred over fetching the script text
                        if paths::file_exists(&path) {
                            source.source_reference = None;
                        } else {
                            source.path = None;
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn transform_event(&self, event: &mut AdapterEvent) -> Result<(), TransformError> {
        match event {
            AdapterEvent::ScriptParsed(parsed) => {
                let script_path = parsed.script_url.clone();
                let script_key = paths::canonical_key(&script_path);
                self.state.lock().runtime_paths.insert(script_key.clone());

                if let (Some(engine), Some(map_url)) = (self.engine(), parsed.source_map_url.as_deref()) {
                    if let Some(map) = engine.process_new_source_map(&script_path, map_url).await {
                        for source in map.authored_sources() {
                            self.pending.resolve(&paths::canonical_key(source));
                        }
                    }
                }
                self.pending.resolve(&script_key);
            }
            AdapterEvent::ClearTargetContext => {
                self.state.lock().runtime_paths.clear();
                // a reload may come with rebuilt maps
                if let Some(engine) = self.engine() {
                    engine.clear();
                }
            }
            AdapterEvent::ClearClientContext => self.reset_client_context(),
            _ => {}
        }
        Ok(())
    }

    fn discard_request(&self, seq: i64) {
        self.state.lock().splits.remove(&seq);
    }
}

fn display_name(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string()
}
