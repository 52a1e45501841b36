//! The prefix registry maps short identifier prefixes (`chebi`, `kegg`, ...) to the
//! namespace stem that turns a local identifier into a full IRI.
//!
//! A registry is built once per run, either from a pre-built mapping or through a
//! [`RegistryLoader`] that reads a cached copy of the prefix.cc JSON-LD context and
//! downloads it on first use. The hand-curated [`PREFIX_OVERRIDES`] table is applied
//! before every lookup.

use crate::consts::{DEFAULT_REGISTRY_CACHE, DEFAULT_REGISTRY_URL, PREFIX_OVERRIDES};
use crate::errors::OfflineRetrievalError;
use crate::fetch::{fetch_document, FetchOptions};
use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// Lowercases a raw prefix token and removes all spaces.
pub fn normalize_prefix(token: &str) -> String {
    token.to_lowercase().replace(' ', "").trim().to_string()
}

/// A successful lookup: the canonical prefix (after overrides) and its namespace stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    pub prefix: &'a str,
    pub stem: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct PrefixRegistry {
    stems: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl PrefixRegistry {
    /// Creates a registry from `prefix -> stem` pairs using the default override table.
    pub fn new<I, K, V>(stems: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let overrides = PREFIX_OVERRIDES
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        Self {
            stems: stems
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            overrides,
        }
    }

    /// Replaces the override table.
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.overrides = overrides
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Parses a JSON document whose `@context` member maps prefixes to stems.
    pub fn from_context_json(bytes: &[u8]) -> Result<Self> {
        let doc: Value = serde_json::from_slice(bytes)?;
        Self::from_context_value(&doc)
    }

    fn from_context_value(doc: &Value) -> Result<Self> {
        let context = doc
            .get("@context")
            .and_then(Value::as_object)
            .ok_or_else(|| anyhow!("Registry document has no @context object"))?;
        let mut stems = HashMap::with_capacity(context.len());
        for (prefix, stem) in context {
            match stem.as_str() {
                Some(stem) => {
                    stems.insert(prefix.clone(), stem.to_string());
                }
                None => debug!("Skipping non-string registry entry for '{prefix}'"),
            }
        }
        Ok(Self::new(stems))
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    /// Returns the canonical prefix for an already-normalized token.
    pub fn canonical_prefix<'a>(&'a self, normalized: &'a str) -> &'a str {
        self.overrides
            .get(normalized)
            .map(String::as_str)
            .unwrap_or(normalized)
    }

    /// Looks up the canonical prefix and stem for a normalized token.
    pub fn resolve<'a>(&'a self, normalized: &'a str) -> Option<Resolution<'a>> {
        let prefix = self.canonical_prefix(normalized);
        self.stems.get(prefix).map(|stem| Resolution {
            prefix,
            stem: stem.as_str(),
        })
    }

    /// Convenience lookup for a token that has not been normalized yet.
    pub fn stem_for(&self, raw_token: &str) -> Option<String> {
        let normalized = normalize_prefix(raw_token);
        self.resolve(&normalized).map(|r| r.stem.to_string())
    }
}

/// Anything that can produce a [`PrefixRegistry`] for a pipeline run.
pub trait RegistrySource {
    fn load(&self) -> Result<PrefixRegistry>;
}

impl RegistrySource for PrefixRegistry {
    fn load(&self) -> Result<PrefixRegistry> {
        Ok(self.clone())
    }
}

/// Reads the registry from a local cache file, downloading it first when absent.
#[derive(Debug, Clone)]
pub struct RegistryLoader {
    pub url: String,
    pub cache_path: PathBuf,
    pub fetch: FetchOptions,
}

impl Default for RegistryLoader {
    fn default() -> Self {
        Self {
            url: DEFAULT_REGISTRY_URL.to_string(),
            cache_path: PathBuf::from(DEFAULT_REGISTRY_CACHE),
            fetch: FetchOptions::default(),
        }
    }
}

impl RegistryLoader {
    pub fn new(url: impl Into<String>, cache_path: impl Into<PathBuf>, fetch: FetchOptions) -> Self {
        Self {
            url: url.into(),
            cache_path: cache_path.into(),
            fetch,
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cache_path.exists()
    }

    /// Downloads the registry document and replaces the cached copy.
    pub fn refresh(&self) -> Result<()> {
        if self.fetch.offline {
            return Err(anyhow!(OfflineRetrievalError {
                file: self.url.clone()
            }));
        }
        let fetched = fetch_document(&self.url, &self.fetch)?;
        // validate before it can poison the cache
        PrefixRegistry::from_context_json(&fetched.bytes)
            .with_context(|| format!("Registry downloaded from {} is invalid", fetched.final_url))?;
        write_cache(&self.cache_path, &fetched.bytes)?;
        info!(
            "Cached prefix registry from {} at {}",
            fetched.final_url,
            self.cache_path.display()
        );
        Ok(())
    }

    fn read_cache(&self) -> Result<PrefixRegistry> {
        let file = File::open(&self.cache_path)?;
        file.lock_shared()?;
        let doc: Value = serde_json::from_reader(BufReader::new(&file))
            .with_context(|| format!("Failed to parse {}", self.cache_path.display()))?;
        file.unlock()?;
        PrefixRegistry::from_context_value(&doc)
    }
}

impl RegistrySource for RegistryLoader {
    fn load(&self) -> Result<PrefixRegistry> {
        if !self.is_cached() {
            self.refresh()?;
        }
        let registry = self.read_cache()?;
        info!("Registry build finished, total items: {}", registry.len());
        Ok(registry)
    }
}

fn write_cache(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.part");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)?;
    file.lock_exclusive()?;
    file.write_all(bytes)?;
    file.sync_all()?;
    file.unlock()?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
