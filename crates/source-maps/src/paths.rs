//! Path and url helpers shared by the engine and the transformers.
//!
//! Paths are handled as `/`-separated strings so that urls, posix paths, and windows
//! paths with a drive letter go through the same normalization.

use percent_encoding::percent_decode_str;
use url::Url;

/// `scheme://...` with a scheme longer than one character (so `c://` style drive paths
/// are not mistaken for urls).
pub fn is_url(candidate: &str) -> bool {
    match candidate.find("://") {
        Some(index) if index > 1 => candidate[..index]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'),
        _ => false,
    }
}

pub fn is_file_url(candidate: &str) -> bool {
    candidate
        .get(..7)
        .map(|scheme| scheme.eq_ignore_ascii_case("file://"))
        .unwrap_or(false)
}

pub fn is_data_uri(candidate: &str) -> bool {
    candidate
        .get(..5)
        .map(|scheme| scheme.eq_ignore_ascii_case("data:"))
        .unwrap_or(false)
}

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || path.starts_with('\\') || has_drive_letter(path)
}

/// Converts a `file://` url to a local path, decoding percent escapes.
pub fn file_url_to_path(file_url: &str) -> Option<String> {
    let parsed = Url::parse(file_url).ok()?;
    if parsed.scheme() != "file" {
        return None;
    }
    match parsed.to_file_path() {
        Ok(path) => Some(normalize(&path.to_string_lossy())),
        Err(()) => {
            // non-local host or a windows path parsed on a unix host
            let decoded = percent_decode_str(parsed.path()).decode_utf8_lossy();
            let trimmed = decoded.trim_start_matches('/');
            if has_drive_letter(trimmed) {
                Some(normalize(trimmed))
            } else {
                Some(normalize(&decoded))
            }
        }
    }
}

/// Resolves `.` and `..` segments and unifies separators. A leading `/` or drive letter
/// is preserved; `..` never climbs above the root.
pub fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let (prefix, rest) = if has_drive_letter(&unified) {
        (unified[..3].to_string(), &unified[3..])
    } else if let Some(rest) = unified.strip_prefix('/') {
        ("/".to_string(), rest)
    } else {
        (String::new(), unified.as_str())
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().map(|last| *last != "..").unwrap_or(false) {
                    segments.pop();
                } else if prefix.is_empty() {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    format!("{prefix}{}", segments.join("/"))
}

pub fn join(base: &str, relative: &str) -> String {
    if is_absolute(relative) {
        return normalize(relative);
    }
    normalize(&format!("{}/{}", base.trim_end_matches(['/', '\\']), relative))
}

/// Directory part of a path or url, without the trailing separator.
pub fn dirname(path: &str) -> String {
    let unified = path.replace('\\', "/");
    match unified.rfind('/') {
        Some(0) => "/".to_string(),
        Some(index) => unified[..index].to_string(),
        None => String::new(),
    }
}

/// Case-insensitive lookup key for a path or url.
pub fn canonical_key(path: &str) -> String {
    if is_url(path) {
        path.to_lowercase()
    } else {
        normalize(path).to_lowercase()
    }
}

/// Path component of an http(s) url, percent-decoded, without query or fragment.
pub fn url_path(candidate: &str) -> Option<String> {
    let parsed = Url::parse(candidate).ok()?;
    Some(percent_decode_str(parsed.path()).decode_utf8_lossy().into_owned())
}

/// Resolves `reference` against the location of `base`, which may be a url or a path.
pub fn resolve_against(base: &str, reference: &str) -> String {
    if is_url(reference) || is_absolute(reference) {
        return reference.to_string();
    }
    if is_url(base) {
        if let Ok(joined) = Url::parse(base).and_then(|base| base.join(reference)) {
            return joined.to_string();
        }
    }
    join(&dirname(base), reference)
}

pub fn file_exists(path: &str) -> bool {
    !is_url(path) && std::path::Path::new(path).is_file()
}
