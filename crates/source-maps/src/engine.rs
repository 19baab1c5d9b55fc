use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::loader::MapLoader;
use crate::overrides::PathOverrides;
use crate::paths;
use crate::source_map::{MappedPosition, Position, SourceMap};

/// Cache of parsed maps keyed by generated path, plus the reverse authored index.
pub struct SourceMaps {
    web_root: Option<String>,
    overrides: PathOverrides,
    loader: MapLoader,
    by_generated: DashMap<String, Arc<SourceMap>>,
    by_authored: DashMap<String, Arc<SourceMap>>,
}

impl SourceMaps {
    pub fn new(web_root: Option<String>, overrides: &[(String, String)]) -> Self {
        let overrides = PathOverrides::new(overrides, web_root.as_deref());
        Self {
            web_root,
            overrides,
            loader: MapLoader::new(),
            by_generated: DashMap::new(),
            by_authored: DashMap::new(),
        }
    }

    pub fn web_root(&self) -> Option<&str> {
        self.web_root.as_deref()
    }

    /// Loads and caches the map for `generated_path`. A path that is already cached is
    /// answered from the cache without touching the file or network again.
    pub async fn process_new_source_map(
        &self,
        generated_path: &str,
        map_url: &str,
    ) -> Option<Arc<SourceMap>> {
        let key = paths::canonical_key(generated_path);
        if let Some(cached) = self.by_generated.get(&key) {
            return Some(Arc::clone(cached.value()));
        }

        let text = self.loader.fetch(generated_path, map_url).await?;
        let map = match SourceMap::parse(
            &text,
            generated_path,
            self.web_root.as_deref(),
            &self.overrides,
        ) {
            Ok(map) => Arc::new(map),
            Err(err) => {
                warn!(target: "source-maps", generated_path, map_url, %err, "ignoring unusable source map");
                return None;
            }
        };

        // another load for the same script may have finished while this one awaited
        let map = Arc::clone(self.by_generated.entry(key).or_insert(map).value());
        for source in map.authored_sources() {
            if let Some(previous) = self
                .by_authored
                .insert(paths::canonical_key(source), Arc::clone(&map))
            {
                if previous.generated_path() != map.generated_path() {
                    debug!(
                        target: "source-maps",
                        source = %source,
                        previous = previous.generated_path(),
                        current = map.generated_path(),
                        "authored file now attributed to a newer generated script"
                    );
                }
            }
        }
        info!(
            target: "source-maps",
            generated_path,
            sources = map.authored_sources().len(),
            "source map loaded"
        );
        Some(map)
    }

    /// Forgets every loaded map. The next `process_new_source_map` for a script reads
    /// its map again.
    pub fn clear(&self) {
        let dropped = self.by_generated.len();
        self.by_generated.clear();
        self.by_authored.clear();
        debug!(target: "source-maps", dropped, "source map cache cleared");
    }

    pub fn map_for_generated(&self, generated_path: &str) -> Option<Arc<SourceMap>> {
        self.by_generated
            .get(&paths::canonical_key(generated_path))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn has_map(&self, generated_path: &str) -> bool {
        self.by_generated
            .contains_key(&paths::canonical_key(generated_path))
    }

    /// Generated script that contains `authored_path`, if any loaded map claims it.
    pub fn generated_path_for(&self, authored_path: &str) -> Option<String> {
        self.by_authored
            .get(&paths::canonical_key(authored_path))
            .map(|entry| entry.value().generated_path().to_string())
    }

    /// Every authored source compiled into `generated_path`.
    pub fn authored_paths_for(&self, generated_path: &str) -> Vec<String> {
        self.map_for_generated(generated_path)
            .map(|map| map.authored_sources().to_vec())
            .unwrap_or_default()
    }

    pub fn map_to_generated(
        &self,
        authored_path: &str,
        line: i64,
        column: i64,
    ) -> Option<Position> {
        let map = self
            .by_authored
            .get(&paths::canonical_key(authored_path))
            .map(|entry| Arc::clone(entry.value()))?;
        map.generated_position_for(authored_path, line, column)
    }

    pub fn map_to_authored(
        &self,
        generated_path: &str,
        line: i64,
        column: i64,
    ) -> Option<MappedPosition> {
        self.map_for_generated(generated_path)?
            .authored_position_for(line, column)
    }
}
