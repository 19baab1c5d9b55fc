use serde::Deserialize;

use crate::mappings::{parse_mappings, MappingIndex};
use crate::overrides::PathOverrides;
use crate::paths;
use crate::SourceMapError;

/// Zero-based position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub line: i64,
    pub column: i64,
}

/// Zero-based position inside an authored source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappedPosition {
    pub source: String,
    pub line: i64,
    pub column: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
    version: u32,
    #[serde(default)]
    source_root: Option<String>,
    #[serde(default)]
    sources: Vec<Option<String>>,
    #[serde(default)]
    mappings: String,
    #[serde(default)]
    sections: Option<serde_json::Value>,
}

/// A parsed map for one generated file. Immutable once built.
#[derive(Debug)]
pub struct SourceMap {
    generated_path: String,
    sources: Vec<String>,
    source_keys: Vec<String>,
    index: MappingIndex,
}

impl SourceMap {
    pub fn parse(
        json: &str,
        generated_path: &str,
        web_root: Option<&str>,
        overrides: &PathOverrides,
    ) -> Result<Self, SourceMapError> {
        let raw: RawSourceMap = serde_json::from_str(json)?;
        if raw.sections.is_some() {
            return Err(SourceMapError::IndexedMap);
        }
        if raw.version != 3 {
            return Err(SourceMapError::UnsupportedVersion(raw.version));
        }

        let sources: Vec<String> = raw
            .sources
            .iter()
            .map(|source| {
                resolve_source(
                    source.as_deref().unwrap_or_default(),
                    raw.source_root.as_deref(),
                    generated_path,
                    web_root,
                    overrides,
                )
            })
            .collect();
        let source_keys = sources.iter().map(|s| paths::canonical_key(s)).collect();
        let mappings = parse_mappings(&raw.mappings, sources.len())?;

        Ok(Self {
            generated_path: generated_path.to_string(),
            sources,
            source_keys,
            index: MappingIndex::new(mappings),
        })
    }

    pub fn generated_path(&self) -> &str {
        &self.generated_path
    }

    /// Absolute authored paths, in the map's order and original casing.
    pub fn authored_sources(&self) -> &[String] {
        &self.sources
    }

    fn source_index(&self, authored_path: &str) -> Option<usize> {
        let key = paths::canonical_key(authored_path);
        self.source_keys.iter().position(|candidate| *candidate == key)
    }

    pub fn contains_source(&self, authored_path: &str) -> bool {
        self.source_index(authored_path).is_some()
    }

    pub fn authored_position_for(&self, line: i64, column: i64) -> Option<MappedPosition> {
        let mapping = self.index.original_for(line, column)?;
        let source = self.sources.get(mapping.source?)?;
        Some(MappedPosition {
            source: source.clone(),
            line: mapping.original_line,
            column: mapping.original_column,
        })
    }

    pub fn generated_position_for(
        &self,
        authored_path: &str,
        line: i64,
        column: i64,
    ) -> Option<Position> {
        let source = self.source_index(authored_path)?;
        let mapping = self.index.generated_for(source, line, column)?;
        Some(Position {
            line: mapping.generated_line,
            column: mapping.generated_column,
        })
    }
}

fn concat_root(root: &str, source: &str) -> String {
    if root.ends_with('/') {
        format!("{root}{source}")
    } else {
        format!("{root}/{source}")
    }
}

/// Absolute location of one `sources` entry.
fn resolve_source(
    source: &str,
    source_root: Option<&str>,
    generated_path: &str,
    web_root: Option<&str>,
    overrides: &PathOverrides,
) -> String {
    let root = source_root.filter(|root| !root.is_empty());
    let source_is_rooted = paths::is_url(source) || paths::is_absolute(source);
    let full_entry = match root {
        Some(root) if !source_is_rooted => concat_root(root, source),
        _ => source.to_string(),
    };

    if let Some(rewritten) = overrides.apply(&full_entry) {
        return rewritten;
    }
    if paths::is_file_url(source) {
        return paths::file_url_to_path(source).unwrap_or_else(|| source.to_string());
    }
    if paths::is_absolute(source) {
        return paths::normalize(source);
    }
    if paths::is_url(source) {
        return source.to_string();
    }

    let base = match root {
        Some(root) if paths::is_file_url(root) => {
            paths::file_url_to_path(root).unwrap_or_else(|| root.to_string())
        }
        Some(root) if root.starts_with('/') => match web_root {
            Some(web_root) => paths::join(web_root, root.trim_start_matches('/')),
            None => paths::normalize(root),
        },
        Some(root) if paths::is_url(root) => {
            return paths::resolve_against(&concat_root(root, "_"), source);
        }
        Some(root) => paths::resolve_against(generated_path, root),
        None => return paths::resolve_against(generated_path, source),
    };
    paths::join(&base, source)
}
