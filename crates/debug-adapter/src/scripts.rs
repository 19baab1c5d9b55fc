//! Scripts the target has parsed, indexed by id and by url.

use std::collections::HashMap;
use std::sync::Arc;

use cdp_adapter::protocol::ScriptParsedEvent;

/// Scheme of the urls handed to scripts the target reported without one (eval, inline
/// handlers). Breakpoints in those scripts can only be placed by script id.
pub const PLACEHOLDER_SCHEME: &str = "debugadapter";

pub fn placeholder_url(script_id: &str) -> String {
    format!("{PLACEHOLDER_SCHEME}://{script_id}")
}

pub fn is_placeholder(url: &str) -> bool {
    url.strip_prefix(PLACEHOLDER_SCHEME)
        .is_some_and(|rest| rest.starts_with("://"))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Script {
    pub id: String,
    pub url: String,
    pub source_map_url: Option<String>,
}

/// Both indexes hold the same `Arc`s. Entries are only ever dropped all at once.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    by_id: HashMap<String, Arc<Script>>,
    // several scripts may share a url (inline <script> blocks); the newest comes last
    by_url: HashMap<String, Vec<Arc<Script>>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_script_parsed(&mut self, event: ScriptParsedEvent) -> Arc<Script> {
        let url = if event.url.is_empty() {
            placeholder_url(&event.script_id)
        } else {
            event.url
        };
        let script = Arc::new(Script {
            id: event.script_id,
            url,
            source_map_url: event.source_map_url.filter(|url| !url.is_empty()),
        });

        if let Some(previous) = self.by_id.insert(script.id.clone(), Arc::clone(&script)) {
            // the target reused an id; forget the stale entry in the url index too
            if let Some(list) = self.by_url.get_mut(&previous.url) {
                list.retain(|entry| !Arc::ptr_eq(entry, &previous));
                if list.is_empty() {
                    self.by_url.remove(&previous.url);
                }
            }
        }
        self.by_url
            .entry(script.url.clone())
            .or_default()
            .push(Arc::clone(&script));
        script
    }

    pub fn by_id(&self, script_id: &str) -> Option<Arc<Script>> {
        self.by_id.get(script_id).cloned()
    }

    pub fn by_url(&self, url: &str) -> Option<Arc<Script>> {
        self.by_url.get(url).and_then(|list| list.last()).cloned()
    }

    /// Looks the key up as an id first, then as a url.
    pub fn get(&self, id_or_url: &str) -> Option<Arc<Script>> {
        self.by_id(id_or_url).or_else(|| self.by_url(id_or_url))
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_url.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(id: &str, url: &str) -> ScriptParsedEvent {
        ScriptParsedEvent {
            script_id: id.to_string(),
            url: url.to_string(),
            source_map_url: None,
        }
    }

    #[test]
    fn anonymous_script_gets_placeholder_url() {
        let mut registry = ScriptRegistry::new();
        let script = registry.on_script_parsed(parsed("42", ""));
        assert_eq!(script.url, "debugadapter://42");
        assert!(is_placeholder(&script.url));
        let found = registry.by_url("debugadapter://42").expect("by placeholder");
        assert!(Arc::ptr_eq(&found, &script));
        assert!(Arc::ptr_eq(&registry.get("42").expect("by id"), &script));
    }

    #[test]
    fn both_indexes_share_identity() {
        let mut registry = ScriptRegistry::new();
        let first = registry.on_script_parsed(parsed("1", "http://localhost/index.html"));
        let second = registry.on_script_parsed(parsed("2", "http://localhost/index.html"));
        assert!(Arc::ptr_eq(&registry.by_id("1").expect("first"), &first));
        assert!(Arc::ptr_eq(
            &registry.by_url("http://localhost/index.html").expect("newest"),
            &second
        ));
        assert_eq!(registry.len(), 2);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.by_url("http://localhost/index.html").is_none());
    }

    #[test]
    fn reused_id_replaces_stale_url_entry() {
        let mut registry = ScriptRegistry::new();
        registry.on_script_parsed(parsed("1", "http://localhost/old.js"));
        registry.on_script_parsed(parsed("1", "http://localhost/new.js"));
        assert!(registry.by_url("http://localhost/old.js").is_none());
        assert_eq!(
            registry.by_id("1").expect("id").url,
            "http://localhost/new.js"
        );
    }

    #[test]
    fn placeholder_detection_needs_the_separator() {
        assert!(!is_placeholder("debugadapter.js"));
        assert!(!is_placeholder("http://localhost/debugadapter://1"));
    }
}
