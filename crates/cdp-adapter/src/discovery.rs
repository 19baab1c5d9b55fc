//! Locating the websocket endpoint of an already running target.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CdpConfig;
use crate::error::CdpError;

/// One entry of the `/json/list` endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

/// Queries `http://address:port/json/list` and picks one attachable target.
pub async fn discover(
    address: &str,
    port: u16,
    url_filter: Option<&str>,
    config: &CdpConfig,
) -> Result<String, CdpError> {
    let list_url = format!("http://{address}:{port}/json/list");
    debug!(target: "cdp-discovery", %list_url, "listing targets");

    let client = reqwest::Client::builder()
        .timeout(config.discovery_timeout())
        .build()
        .map_err(|err| CdpError::Discovery(err.to_string()))?;
    let targets: Vec<TargetDescriptor> = client
        .get(&list_url)
        .send()
        .await
        .map_err(|err| CdpError::Discovery(format!("{list_url}: {err}")))?
        .json()
        .await
        .map_err(|err| CdpError::Discovery(format!("{list_url}: {err}")))?;

    let endpoint = select_target(&targets, url_filter)?;
    info!(target: "cdp-discovery", %endpoint, "selected target");
    Ok(endpoint)
}

fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_ascii_lowercase()
}

fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return true;
    };
    if !candidate.starts_with(first) {
        return false;
    }
    let mut rest = &candidate[first.len()..];
    let segments: Vec<&str> = parts.collect();
    let Some((last, middle)) = segments.split_last() else {
        return rest.is_empty();
    };
    for segment in middle {
        match rest.find(segment) {
            Some(index) => rest = &rest[index + segment.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

/// Picks a target: exact url matches first, then wildcard or substring matches, then
/// (without a filter) every page-like target. Returns the first candidate exposing a
/// websocket endpoint.
pub fn select_target(
    targets: &[TargetDescriptor],
    url_filter: Option<&str>,
) -> Result<String, CdpError> {
    let debuggable: Vec<&TargetDescriptor> = targets
        .iter()
        .filter(|target| target.kind == "page" || target.kind == "node")
        .collect();

    let candidates: Vec<&TargetDescriptor> = match url_filter {
        Some(filter) if !filter.is_empty() => {
            let wanted = normalize_url(filter);
            let exact: Vec<_> = debuggable
                .iter()
                .copied()
                .filter(|target| normalize_url(&target.url) == wanted)
                .collect();
            if !exact.is_empty() {
                exact
            } else {
                debuggable
                    .iter()
                    .copied()
                    .filter(|target| {
                        let url = normalize_url(&target.url);
                        if wanted.contains('*') {
                            wildcard_match(&wanted, &url)
                        } else {
                            url.contains(&wanted)
                        }
                    })
                    .collect()
            }
        }
        _ => debuggable,
    };

    if candidates.is_empty() {
        return Err(CdpError::Discovery(match url_filter {
            Some(filter) => format!("no debuggable target matches '{filter}'"),
            None => "no debuggable targets".to_string(),
        }));
    }

    candidates
        .iter()
        .find_map(|target| target.web_socket_debugger_url.clone())
        .ok_or_else(|| {
            CdpError::Discovery(format!(
                "{} matching target(s) found but none is attachable; is another debugger attached?",
                candidates.len()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(url: &str, ws: Option<&str>) -> TargetDescriptor {
        TargetDescriptor {
            id: url.to_string(),
            kind: "page".to_string(),
            title: String::new(),
            url: url.to_string(),
            web_socket_debugger_url: ws.map(str::to_string),
        }
    }

    #[test]
    fn exact_match_beats_substring() {
        let targets = vec![
            target("http://localhost:8080/index.html?debug", Some("ws://a")),
            target("http://localhost:8080/INDEX.html/", Some("ws://b")),
        ];
        let selected =
            select_target(&targets, Some("http://localhost:8080/index.html")).expect("target");
        assert_eq!(selected, "ws://b");
    }

    #[test]
    fn wildcard_filter_matches() {
        let targets = vec![
            target("http://other.test/", Some("ws://other")),
            target("http://localhost:3000/app/main", Some("ws://app")),
        ];
        let selected = select_target(&targets, Some("http://localhost:*/app/*")).expect("target");
        assert_eq!(selected, "ws://app");
    }

    #[test]
    fn skips_non_page_targets_and_unattachable_ones() {
        let mut worker = target("http://localhost/worker.js", Some("ws://worker"));
        worker.kind = "service_worker".to_string();
        let targets = vec![
            worker,
            target("http://localhost/", None),
            target("http://localhost/#second", Some("ws://second")),
        ];
        assert_eq!(select_target(&targets, None).expect("target"), "ws://second");
    }

    #[test]
    fn all_matches_attached_elsewhere_is_an_error() {
        let targets = vec![target("http://localhost/", None), target("http://localhost/a", None)];
        let err = select_target(&targets, Some("localhost")).expect_err("none attachable");
        assert!(matches!(err, CdpError::Discovery(message) if message.contains("none is attachable")));
    }

    #[test]
    fn no_match_is_an_error() {
        let targets = vec![target("http://localhost/", Some("ws://a"))];
        assert!(select_target(&targets, Some("http://example.com")).is_err());
    }
}
