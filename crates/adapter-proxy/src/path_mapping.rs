//! Target urls <-> client paths.

use std::collections::HashMap;

use async_trait::async_trait;
use bridge_core_types::{AdapterEvent, RequestArgs, ResponseBody};
use bridge_source_maps::paths;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::TransformError;
use crate::pending::PendingRequests;
use crate::transformer::Transformer;

#[derive(Debug, Default)]
struct Mappings {
    // canonical client path -> target url
    client_to_url: HashMap<String, String>,
    url_to_client: HashMap<String, String>,
}

/// Maps the urls the target reports to files on the client's disk.
///
/// `file://` urls become paths. Served urls are looked up under `webRoot` by their path,
/// dropping leading segments until a file exists. Urls that match nothing keep the url
/// itself as their client-side key.
#[derive(Debug, Default)]
pub struct PathTransformer {
    web_root: Mutex<Option<String>>,
    mappings: Mutex<Mappings>,
    pending: PendingRequests,
}

impl PathTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn url_for(&self, client_path: &str) -> Option<String> {
        self.mappings
            .lock()
            .client_to_url
            .get(&paths::canonical_key(client_path))
            .cloned()
    }

    fn client_path_for(&self, url: &str) -> Option<String> {
        if let Some(path) = self.mappings.lock().url_to_client.get(url) {
            return Some(path.clone());
        }
        let web_root = self.web_root.lock().clone();
        resolve_client_path(url, web_root.as_deref())
    }

    async fn target_url(&self, client_path: &str) -> Result<String, TransformError> {
        if let Some(url) = self.url_for(client_path) {
            return Ok(url);
        }
        let key = paths::canonical_key(client_path);
        let waiter = self.pending.wait(&key);
        // the script may have been parsed between the lookup and the registration
        if let Some(url) = self.url_for(client_path) {
            return Ok(url);
        }
        debug!(target: "adapter-proxy", path = client_path, "setBreakpoints pending until the script loads");
        waiter.await.map_err(|_| TransformError::Abandoned {
            path: client_path.to_string(),
        })?;
        self.url_for(client_path)
            .ok_or_else(|| TransformError::Abandoned {
                path: client_path.to_string(),
            })
    }
}

/// Local file behind a target url, if one exists.
pub fn resolve_client_path(url: &str, web_root: Option<&str>) -> Option<String> {
    if paths::is_file_url(url) {
        return paths::file_url_to_path(url);
    }
    if !paths::is_url(url) {
        return paths::is_absolute(url).then(|| paths::normalize(url));
    }
    let web_root = web_root?;
    let url_path = paths::url_path(url)?;
    let segments: Vec<&str> = url_path.split('/').filter(|s| !s.is_empty()).collect();
    (0..segments.len())
        .map(|skip| paths::join(web_root, &segments[skip..].join("/")))
        .find(|candidate| paths::file_exists(candidate))
}

#[async_trait]
impl Transformer for PathTransformer {
    fn name(&self) -> &'static str {
        "paths"
    }

    async fn transform_request(
        &self,
        _seq: i64,
        args: &mut RequestArgs,
    ) -> Result<(), TransformError> {
        match args {
            RequestArgs::Attach(attach) => {
                *self.web_root.lock() = attach.web_root.clone();
            }
            RequestArgs::SetBreakpoints(set) => {
                let Some(path) = set.source.path.clone() else {
                    return Ok(());
                };
                // urls we reported ourselves (unresolved or placeholder scripts) pass through
                if paths::is_url(&path) {
                    return Ok(());
                }
                set.source.path = Some(self.target_url(&path).await?);
            }
            _ => {}
        }
        Ok(())
    }

    async fn transform_response(
        &self,
        _seq: i64,
        body: &mut ResponseBody,
    ) -> Result<(), TransformError> {
        if let ResponseBody::StackTrace(trace) = body {
            for frame in &mut trace.stack_frames {
                let Some(source) = frame.source.as_mut() else {
                    continue;
                };
                if let Some(url) = source.path.clone() {
                    if let Some(client_path) = self.client_path_for(&url) {
                        source.path = Some(client_path);
                    }
                }
            }
        }
        Ok(())
    }

    async fn transform_event(&self, event: &mut AdapterEvent) -> Result<(), TransformError> {
        match event {
            AdapterEvent::ScriptParsed(parsed) => {
                let url = parsed.script_url.clone();
                let client_path = self.client_path_for(&url).unwrap_or_else(|| url.clone());
                {
                    let mut mappings = self.mappings.lock();
                    mappings
                        .client_to_url
                        .insert(paths::canonical_key(&client_path), url.clone());
                    mappings.url_to_client.insert(url, client_path.clone());
                }
                let released = self.pending.resolve(&paths::canonical_key(&client_path));
                if released > 0 {
                    debug!(target: "adapter-proxy", path = %client_path, released, "pending requests released");
                }
                parsed.script_url = client_path;
            }
            AdapterEvent::ClearTargetContext => {
                *self.mappings.lock() = Mappings::default();
            }
            AdapterEvent::ClearClientContext => {
                *self.mappings.lock() = Mappings::default();
                let abandoned = self.pending.abandon_all();
                if abandoned > 0 {
                    debug!(target: "adapter-proxy", abandoned, "pending requests abandoned");
                }
            }
            _ => {}
        }
        Ok(())
    }
}
