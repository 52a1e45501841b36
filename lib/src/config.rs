//! Defines the configuration structures for triplesplit.
//! This includes the main `Config` struct persisted as JSON, the store endpoint and
//! registry settings, and the saved split job that becomes a [`SplitConfig`].

use crate::consts::{DEFAULT_FLUSH_THRESHOLD, DEFAULT_REGISTRY_CACHE, DEFAULT_REGISTRY_URL};
use crate::expand::UriExpansion;
use crate::fetch::FetchOptions;
use crate::options::WriteMode;
use crate::pipeline::SplitConfig;
use crate::registry::RegistryLoader;
use anyhow::{anyhow, Result};
use oxigraph::model::NamedNode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "triplesplit.json";
/// Variable name that redirects every derived triple into one graph.
pub const OUTPUT_GRAPH_VARIABLE: &str = "outputGraph";

fn default_timeout_secs() -> u64 {
    300
}

fn default_flush_threshold() -> usize {
    DEFAULT_FLUSH_THRESHOLD
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// SPARQL 1.1 query endpoint.
    pub query_url: String,
    /// SPARQL 1.1 update endpoint; the query endpoint is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_url: Option<String>,
    /// Graph Store Protocol endpoint used for bulk writes when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_store_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EndpointConfig {
    pub fn new(query_url: impl Into<String>) -> Self {
        Self {
            query_url: query_url.into(),
            update_url: None,
            graph_store_url: None,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub url: String,
    pub cache_path: PathBuf,
    // never download; a cached copy is still used
    #[serde(default)]
    pub offline: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REGISTRY_URL.to_string(),
            cache_path: PathBuf::from(DEFAULT_REGISTRY_CACHE),
            offline: false,
        }
    }
}

impl RegistryConfig {
    pub fn loader(&self) -> RegistryLoader {
        let fetch = FetchOptions {
            offline: self.offline,
            timeout: Duration::from_secs(60),
            ..FetchOptions::default()
        };
        RegistryLoader::new(self.url.clone(), self.cache_path.clone(), fetch)
    }
}

/// A split job as saved in the configuration file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SplitSettings {
    pub class_to_split: String,
    pub property_to_split: String,
    #[serde(with = "serde_regex")]
    pub delimiter: Regex,
    #[serde(default)]
    pub delete_split_triples: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_delimiter: Option<String>,
    /// Absent keeps literals, `"infer"` resolves identifiers, any other value is a prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_expansion: Option<String>,
}

impl SplitSettings {
    pub fn to_split_config(&self, output_graph: Option<NamedNode>) -> Result<SplitConfig> {
        let mut builder = SplitConfig::builder()
            .class_to_split(NamedNode::new(&self.class_to_split)?)
            .property_to_split(NamedNode::new(&self.property_to_split)?)
            .delimiter(self.delimiter.as_str())
            .source_triples(self.delete_split_triples)
            .uri_expansion(UriExpansion::from_option(self.uri_expansion.as_deref()));
        if let Some(trim) = &self.trim_delimiter {
            builder = builder.trim_delimiter(trim.clone());
        }
        if let Some(graph) = output_graph {
            builder = builder.output_graph(graph);
        }
        Ok(builder.build()?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointConfig>,
    // local oxigraph directory; takes precedence over the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<SplitSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            store_path: None,
            registry: RegistryConfig::default(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            dry_run: false,
            split: None,
        }
    }
}

impl Config {
    pub fn write_mode(&self) -> WriteMode {
        WriteMode::from(self.dry_run)
    }

    pub fn save_to_file(&self, file: &Path) -> Result<()> {
        let config_str = serde_json::to_string_pretty(&self)?;
        let mut file = std::fs::File::create(file)?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }

    pub fn from_file(file: &Path) -> Result<Self> {
        let file = std::fs::File::open(file)?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Prints out the current Config in a clear and readable way for command line output.
    pub fn print(&self) {
        println!("Configuration:");
        match (&self.store_path, &self.endpoint) {
            (Some(path), _) => println!("  Local store: {}", path.display()),
            (None, Some(endpoint)) => {
                println!("  Query endpoint: {}", endpoint.query_url);
                if let Some(update) = &endpoint.update_url {
                    println!("  Update endpoint: {}", update);
                }
                if let Some(gsp) = &endpoint.graph_store_url {
                    println!("  Graph store endpoint: {}", gsp);
                }
                if let Some(user) = &endpoint.username {
                    println!("  User: {}", user);
                }
                println!("  Timeout: {}s", endpoint.timeout_secs);
            }
            (None, None) => println!("  Store: <not configured>"),
        }
        println!("  Registry: {}", self.registry.url);
        println!("  Registry cache: {}", self.registry.cache_path.display());
        println!("  Offline: {}", self.registry.offline);
        println!("  Flush threshold: {}", self.flush_threshold);
        println!("  Dry run: {}", self.dry_run);
        if let Some(split) = &self.split {
            println!("  Split:");
            println!("    Class: {}", split.class_to_split);
            println!("    Property: {}", split.property_to_split);
            println!("    Delimiter: {}", split.delimiter);
            if let Some(trim) = &split.trim_delimiter {
                println!("    Trim: {}", trim);
            }
            println!(
                "    URI expansion: {}",
                UriExpansion::from_option(split.uri_expansion.as_deref())
            );
            println!("    Delete split triples: {}", split.delete_split_triples);
        }
    }
}

/// Parses `key:value` variables, splitting each on its first `:` so values may be IRIs.
pub fn parse_variables(vars: &[String]) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for var in vars {
        let (key, value) = var
            .split_once(':')
            .ok_or_else(|| anyhow!("Variable '{var}' is not of the form key:value"))?;
        out.insert(key.trim().to_string(), value.to_string());
    }
    Ok(out)
}

/// The `outputGraph` variable, if any, as an IRI.
pub fn output_graph(vars: &HashMap<String, String>) -> Result<Option<NamedNode>> {
    vars.get(OUTPUT_GRAPH_VARIABLE)
        .map(|g| {
            NamedNode::new(g.as_str())
                .map_err(|e| anyhow!("{OUTPUT_GRAPH_VARIABLE} '{g}' is not an IRI: {e}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SourceTriples;
    use tempfile::tempdir;

    fn settings() -> SplitSettings {
        SplitSettings {
            class_to_split: "http://example.org/Drug".to_string(),
            property_to_split: "http://example.org/xref".to_string(),
            delimiter: Regex::new(",").unwrap(),
            delete_split_triples: true,
            trim_delimiter: Some("\"".to_string()),
            uri_expansion: Some("infer".to_string()),
        }
    }

    #[test]
    fn test_parse_variables_splits_on_first_colon() {
        let vars = parse_variables(&[
            "outputGraph:http://example.org/g9".to_string(),
            "user:alice".to_string(),
        ])
        .unwrap();
        assert_eq!(vars["outputGraph"], "http://example.org/g9");
        assert_eq!(vars["user"], "alice");
        assert_eq!(
            output_graph(&vars).unwrap(),
            Some(NamedNode::new("http://example.org/g9").unwrap())
        );
        assert!(parse_variables(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn test_output_graph_must_be_iri() {
        let vars = parse_variables(&["outputGraph:not an iri".to_string()]).unwrap();
        assert!(output_graph(&vars).is_err());
        assert_eq!(output_graph(&HashMap::new()).unwrap(), None);
    }

    #[test]
    fn test_settings_to_split_config() {
        let config = settings().to_split_config(None).unwrap();
        assert_eq!(config.class_to_split.as_str(), "http://example.org/Drug");
        assert_eq!(config.delimiter, ",");
        assert_eq!(config.source_triples, SourceTriples::Delete);
        assert_eq!(config.uri_expansion, UriExpansion::Infer);
        assert_eq!(config.trim_delimiter.as_deref(), Some("\""));
        assert!(config.output_graph.is_none());
    }

    #[test]
    fn test_config_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let mut endpoint = EndpointConfig::new("http://localhost:7200/repositories/kb");
        endpoint.username = Some("admin".to_string());
        let config = Config {
            endpoint: Some(endpoint.clone()),
            split: Some(settings()),
            ..Config::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.endpoint, Some(endpoint));
        assert_eq!(loaded.flush_threshold, DEFAULT_FLUSH_THRESHOLD);
        assert_eq!(loaded.registry, RegistryConfig::default());
        assert_eq!(loaded.split.unwrap().delimiter.as_str(), ",");
    }

    #[test]
    fn test_invalid_delimiter_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"split": {"class_to_split": "http://x.org/C", "property_to_split": "http://x.org/p", "delimiter": "("}}"#,
        )
        .unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"endpoint": {"query_url": "http://localhost/sparql"}}"#)
                .unwrap();
        assert!(!config.dry_run);
        assert_eq!(config.write_mode(), WriteMode::Commit);
        let endpoint = config.endpoint.as_ref().unwrap();
        assert_eq!(endpoint.timeout_secs, 300);
        assert!(endpoint.update_url.is_none());
    }
}
