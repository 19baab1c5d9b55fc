use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::percent_decode_str;
use tracing::{debug, warn};

use crate::paths;
use crate::SourceMapError;

/// Fetches map text from data uris, local files, or http(s).
#[derive(Clone, Debug, Default)]
pub struct MapLoader {
    client: reqwest::Client,
}

impl MapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map text for `generated_path`. When `map_url` cannot be read, `<generated>.map`
    /// next to a local generated file is probed before giving up.
    pub async fn fetch(&self, generated_path: &str, map_url: &str) -> Option<String> {
        let primary = self.read_reference(generated_path, map_url).await;
        let err = match primary {
            Ok(text) => return Some(text),
            Err(err) => err,
        };

        if !paths::is_url(generated_path) {
            let probe = format!("{generated_path}.map");
            if let Ok(text) = tokio::fs::read_to_string(&probe).await {
                debug!(target: "source-maps", %probe, %err, "declared map unreadable, using sibling .map");
                return Some(text);
            }
        }

        warn!(target: "source-maps", generated_path, map_url, %err, "no source map available");
        None
    }

    async fn read_reference(
        &self,
        generated_path: &str,
        map_url: &str,
    ) -> Result<String, SourceMapError> {
        if paths::is_data_uri(map_url) {
            return decode_data_uri(map_url);
        }

        let location = if paths::is_file_url(map_url) {
            paths::file_url_to_path(map_url).unwrap_or_else(|| map_url.to_string())
        } else {
            paths::resolve_against(generated_path, map_url)
        };

        if paths::is_url(&location) {
            return self.download(&location).await;
        }

        tokio::fs::read_to_string(&location)
            .await
            .map_err(|source| SourceMapError::Io {
                path: location.clone(),
                source,
            })
    }

    async fn download(&self, url: &str) -> Result<String, SourceMapError> {
        let fetch_err = |message: String| SourceMapError::Fetch {
            url: url.to_string(),
            message,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| fetch_err(err.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_err(format!("status {}", response.status())));
        }
        response.text().await.map_err(|err| fetch_err(err.to_string()))
    }
}

fn decode_data_uri(uri: &str) -> Result<String, SourceMapError> {
    let (header, payload) = uri.split_once(',').ok_or(SourceMapError::DataUri)?;
    if header.to_ascii_lowercase().ends_with(";base64") {
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|_| SourceMapError::DataUri)?;
        String::from_utf8(bytes).map_err(|_| SourceMapError::DataUri)
    } else {
        Ok(percent_decode_str(payload).decode_utf8_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_and_plain_data_uris() {
        let encoded = STANDARD.encode(r#"{"version":3}"#);
        let uri = format!("data:application/json;charset=utf-8;base64,{encoded}");
        assert_eq!(decode_data_uri(&uri).expect("base64"), r#"{"version":3}"#);
        assert_eq!(
            decode_data_uri("data:application/json,%7B%7D").expect("plain"),
            "{}"
        );
        assert!(decode_data_uri("data:application/json;base64").is_err());
    }

    #[tokio::test]
    async fn missing_map_falls_back_to_sibling_probe() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generated = dir.path().join("app.js");
        std::fs::write(&generated, "console.log(1)").expect("write js");
        std::fs::write(dir.path().join("app.js.map"), "{}").expect("write map");

        let loader = MapLoader::new();
        let generated = generated.to_string_lossy().to_string();
        let text = loader.fetch(&generated, "does-not-exist.map").await;
        assert_eq!(text.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn unreadable_map_without_probe_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generated = dir.path().join("lib.js").to_string_lossy().to_string();
        let loader = MapLoader::new();
        assert!(loader.fetch(&generated, "lib.js.map").await.is_none());
    }
}
