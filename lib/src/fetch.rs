//! Retrieval of remote documents, used to download the prefix registry.
//!
//! Requests negotiate JSON-LD/JSON first and reject bodies that are obviously HTML
//! (error pages, captive portals) so a bad download never lands in the cache.

use crate::errors::OfflineRetrievalError;
use anyhow::{anyhow, Result};
use log::debug;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;

/// Options that control how remote documents are fetched.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Fail immediately when `true`; callers use this to guard offline modes.
    pub offline: bool,
    /// Overall network timeout applied to individual HTTP requests.
    pub timeout: Duration,
    /// Ordered list of media types to negotiate, highest priority first.
    pub accept_order: Vec<&'static str>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        const DEFAULT_ACCEPT: &[&str] = &["application/ld+json", "application/json"];
        Self {
            offline: false,
            timeout: Duration::from_secs(30),
            accept_order: DEFAULT_ACCEPT.to_vec(),
        }
    }
}

impl FetchOptions {
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }
}

/// Successful network fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub bytes: Vec<u8>,
    pub final_url: String,
    pub content_type: Option<String>,
}

/// Builds a weighted `Accept` header string honoring the provided priority order.
fn build_accept(accept_order: &[&'static str]) -> String {
    if accept_order.is_empty() {
        return "*/*".to_string();
    }
    let mut parts = Vec::new();
    let mut q = 1.0f32;
    for t in accept_order {
        parts.push(format!("{t}; q={:.2}", q));
        q = (q - 0.1f32).max(0.1f32);
    }
    parts.push("*/*; q=0.05".to_string());
    parts.join(", ")
}

/// Returns `true` when the response appears to be HTML instead of JSON.
fn looks_like_html(content_type: Option<&str>, bytes: &[u8]) -> bool {
    if let Some(ct) = content_type {
        let lc = ct.to_ascii_lowercase();
        if lc.contains("text/html") || lc.contains("application/xhtml") {
            return true;
        }
    }
    let prefix_len = bytes.len().min(512);
    if let Ok(snippet) = std::str::from_utf8(&bytes[..prefix_len]) {
        let lower = snippet.to_ascii_lowercase();
        return lower.contains("<html") || lower.contains("<!doctype html");
    }
    false
}

/// Downloads `url`, following redirects, and returns the body.
pub fn fetch_document(url: &str, opts: &FetchOptions) -> Result<FetchResult> {
    if opts.offline {
        return Err(anyhow!(OfflineRetrievalError {
            file: url.to_string()
        }));
    }
    let client = Client::builder().timeout(opts.timeout).build()?;
    let accept = build_accept(&opts.accept_order);
    debug!("Fetching {url} (Accept: {accept})");
    let resp = client.get(url).header(ACCEPT, accept).send()?;
    let status = resp.status();
    let final_url = resp.url().to_string();
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = resp.bytes()?.to_vec();

    if !status.is_success() {
        return Err(anyhow!("Failed to fetch {url}: HTTP {status}"));
    }
    if looks_like_html(content_type.as_deref(), &bytes) {
        return Err(anyhow!(
            "Failed to fetch {url}: server answered with HTML instead of JSON"
        ));
    }
    Ok(FetchResult {
        bytes,
        final_url,
        content_type,
    })
}
