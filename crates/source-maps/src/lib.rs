//! Source-map resolution engine.
//!
//! [`SourceMaps`] loads the map a generated script declares, normalizes every authored
//! source to an absolute path, and answers position queries in both directions. Lines and
//! columns are zero-based throughout this crate.
//!
//! Loading is fail-soft: an unreadable, unreachable, or malformed map yields `None` and a
//! log line, never an error, and callers fall back to the generated location.

mod engine;
mod loader;
pub mod mappings;
pub mod overrides;
pub mod paths;
mod source_map;
pub mod vlq;

pub use engine::SourceMaps;
pub use loader::MapLoader;
pub use overrides::PathOverrides;
pub use source_map::{MappedPosition, Position, SourceMap};

use thiserror::Error;

/// Reasons a map could not be used. Only logged; the public API degrades to `None`.
#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("invalid base64 vlq digit {0:?}")]
    InvalidVlqDigit(char),
    #[error("vlq value overflows")]
    VlqOverflow,
    #[error("unterminated vlq segment")]
    UnterminatedVlq,
    #[error("mapping segment has {0} fields")]
    BadSegment(usize),
    #[error("mapping references source #{0} which does not exist")]
    UnknownSource(i64),
    #[error("unsupported source map version {0}")]
    UnsupportedVersion(u32),
    #[error("indexed source maps are not supported")]
    IndexedMap,
    #[error("malformed source map: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("invalid data uri")]
    DataUri,
}
