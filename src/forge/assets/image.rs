// SPDX-License-Identifier: MIT

//! Image acquisition through the Google Custom Search JSON API

use super::{ImageOutcome, ImageSearch};
use crate::adk::error::{ForgeError, ModelError};
use crate::forge::config::AssetSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

const SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Words kept for the fallback query
const FALLBACK_WORDS: usize = 6;

/// Links of the image results in a search response
pub fn parse_candidates(body: &Value) -> Vec<String> {
    body.get("items")
        .and_then(|items| items.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("link").and_then(|l| l.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Only absolute http(s) links are downloaded
pub fn validate_link(link: &str) -> Option<Url> {
    let url = Url::parse(link).ok()?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Some(url),
        _ => None,
    }
}

/// Recognise common raster formats by their magic bytes
pub fn looks_like_image(bytes: &[u8]) -> bool {
    bytes.starts_with(b"\x89PNG\r\n\x1a\n")
        || bytes.starts_with(&[0xFF, 0xD8, 0xFF])
        || bytes.starts_with(b"GIF87a")
        || bytes.starts_with(b"GIF89a")
        || (bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP")
        || bytes.starts_with(b"BM")
}

/// Whether a body of `size` bytes is over the download limit
fn exceeds_limit(size: Option<u64>, max_bytes: u64) -> bool {
    size.map_or(false, |n| n > max_bytes)
}

/// Shorter query tried when the full description finds nothing
fn fallback_query(description: &str) -> Option<String> {
    let words: Vec<&str> = description.split_whitespace().collect();
    if words.len() <= FALLBACK_WORDS {
        return None;
    }
    Some(words[..FALLBACK_WORDS].join(" "))
}

pub struct GoogleImageSearch {
    client: Client,
    api_key: String,
    cse_id: String,
    candidates: u32,
    max_bytes: u64,
}

impl GoogleImageSearch {
    /// Reads `GOOGLE_API_KEY` and `GOOGLE_CSE_ID`
    pub fn new(settings: &AssetSettings) -> Result<Self, ForgeError> {
        let api_key = env::var("GOOGLE_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing("GOOGLE_API_KEY".to_string()))?;
        let cse_id = env::var("GOOGLE_CSE_ID")
            .map_err(|_| ForgeError::config("GOOGLE_CSE_ID must be set for image search"))?;
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            client,
            api_key,
            cse_id,
            candidates: settings.image_candidates.clamp(1, 10),
            max_bytes: settings.max_image_bytes,
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<String>, ForgeError> {
        let mut url = Url::parse(SEARCH_URL).map_err(|e| ForgeError::other(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("cx", &self.cse_id)
            .append_pair("key", &self.api_key)
            .append_pair("searchType", "image")
            .append_pair("num", &self.candidates.to_string())
            .append_pair("safe", "active");

        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ForgeError::api("google_cse", format!("{}: {}", status, text)));
        }

        let body: Value = resp.json().await?;
        Ok(parse_candidates(&body))
    }

    /// Download one candidate; `None` when it is not a usable image
    async fn download(&self, link: &str) -> Option<Vec<u8>> {
        let url = validate_link(link)?;
        let resp = self.client.get(url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }

        let is_image = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return None;
        }

        if exceeds_limit(resp.content_length(), self.max_bytes) {
            log::warn!("Image at {} is larger than {} bytes", link, self.max_bytes);
            return None;
        }

        // Content-Length may be absent or wrong
        let mut resp = resp;
        let mut bytes = Vec::new();
        while let Some(chunk) = resp.chunk().await.ok()? {
            if exceeds_limit(Some((bytes.len() + chunk.len()) as u64), self.max_bytes) {
                log::warn!("Image at {} exceeded {} bytes while downloading", link, self.max_bytes);
                return None;
            }
            bytes.extend_from_slice(&chunk);
        }
        looks_like_image(&bytes).then_some(bytes)
    }
}

#[async_trait]
impl ImageSearch for GoogleImageSearch {
    async fn fetch(&self, description: &str, target: &Path) -> Result<ImageOutcome, ForgeError> {
        let mut queries = vec![description.to_string()];
        queries.extend(fallback_query(description));

        for query in queries {
            log::info!("Searching images for '{}'", query);
            for link in self.search(&query).await? {
                match self.download(&link).await {
                    Some(bytes) => {
                        if let Some(parent) = target.parent() {
                            tokio::fs::create_dir_all(parent).await?;
                        }
                        tokio::fs::write(target, &bytes).await?;
                        log::info!("Image saved to {}", target.display());
                        return Ok(ImageOutcome::Saved(target.to_path_buf()));
                    }
                    None => log::warn!("Invalid image candidate skipped: {}", link),
                }
            }
        }

        log::warn!("No image results for '{}'", description);
        Ok(ImageOutcome::NoResults)
    }
}

/// Stands in when no search credentials are configured; every lookup comes
/// back empty so image references are rolled back
pub struct DisabledImageSearch;

#[async_trait]
impl ImageSearch for DisabledImageSearch {
    async fn fetch(&self, description: &str, _target: &Path) -> Result<ImageOutcome, ForgeError> {
        log::warn!("Image search disabled, skipping '{}'", description);
        Ok(ImageOutcome::NoResults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_candidates() {
        let body = json!({
            "items": [
                {"link": "https://example.com/a.png"},
                {"title": "no link"},
                {"link": "http://example.com/b.jpg"}
            ]
        });
        assert_eq!(
            parse_candidates(&body),
            vec!["https://example.com/a.png", "http://example.com/b.jpg"]
        );
        assert!(parse_candidates(&json!({"searchInformation": {}})).is_empty());
    }

    #[test]
    fn test_validate_link() {
        assert!(validate_link("https://upload.wikimedia.org/x.png").is_some());
        assert!(validate_link("ftp://example.com/x.png").is_none());
        assert!(validate_link("data:image/png;base64,AAAA").is_none());
        assert!(validate_link("not a url").is_none());
    }

    #[test]
    fn test_looks_like_image() {
        assert!(looks_like_image(b"\x89PNG\r\n\x1a\n...."));
        assert!(looks_like_image(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(looks_like_image(b"RIFF\0\0\0\0WEBPVP8 "));
        assert!(!looks_like_image(b"<!DOCTYPE html>"));
        assert!(!looks_like_image(b""));
    }

    #[test]
    fn test_exceeds_limit() {
        assert!(exceeds_limit(Some(11), 10));
        assert!(!exceeds_limit(Some(10), 10));
        assert!(!exceeds_limit(None, 10));
    }

    #[test]
    fn test_fallback_query() {
        assert_eq!(fallback_query("a steam locomotive"), None);
        assert_eq!(
            fallback_query("a cross section of a steam locomotive boiler with labels"),
            Some("a cross section of a steam".to_string())
        );
    }
}
