//! The split pipeline: query, split, expand, batch, flush and optionally delete.
//!
//! A run moves through `Querying -> Streaming -> Flushing -> (Deleting) -> Done`.
//! Records are streamed from the store one at a time; each value is cut into
//! fragments, every fragment becomes one derived triple, and derived triples are
//! written in per-graph batches. The matched source triples are deleted only after the
//! stream was consumed and the last batch was acknowledged.
//!
//! Runs are not idempotent: running the same job twice without deleting the source
//! triples writes the derived triples twice.

use crate::batch::{BatchAccumulator, FlushPolicy, ThresholdPolicy};
use crate::expand::{ExpansionContext, ExpansionPolicy, UriExpansion};
use crate::options::SourceTriples;
use crate::query::MatchCriteria;
use crate::registry::{RegistryLoader, RegistrySource};
use crate::split::{Delimiter, FragmentSplitter};
use crate::store::TripleStore;
use anyhow::Result;
use chrono::prelude::*;
use derive_builder::Builder;
use log::{info, warn};
use oxigraph::model::NamedNode;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// One split job.
#[derive(Debug, Clone, Builder)]
#[builder(
    pattern = "owned",
    setter(into),
    build_fn(validate = "Self::validate")
)]
pub struct SplitConfig {
    pub class_to_split: NamedNode,
    pub property_to_split: NamedNode,
    /// Regular expression separating values; `,"` splits only before a quote.
    pub delimiter: String,
    #[builder(default)]
    pub source_triples: SourceTriples,
    /// Token stripped once from both ends of every fragment.
    #[builder(default, setter(into, strip_option))]
    pub trim_delimiter: Option<String>,
    #[builder(default)]
    pub uri_expansion: UriExpansion,
    /// Graph receiving every derived triple instead of the record's own graph.
    #[builder(default, setter(into, strip_option))]
    pub output_graph: Option<NamedNode>,
}

impl SplitConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(delimiter) = &self.delimiter {
            Delimiter::parse(delimiter).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

impl SplitConfig {
    pub fn builder() -> SplitConfigBuilder {
        SplitConfigBuilder::default()
    }

    pub fn criteria(&self, delimiter: &Delimiter) -> MatchCriteria {
        MatchCriteria::new(
            self.class_to_split.clone(),
            self.property_to_split.clone(),
            delimiter.filter_pattern(),
        )
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct SplitReport {
    /// Source records read from the store.
    pub records: usize,
    pub triples_written: usize,
    pub flushes: usize,
    /// Whether the source triples were deleted. Always false for dry runs.
    pub deleted: bool,
    /// Nothing was committed; written counts are what would have been written.
    pub dry_run: bool,
    /// Normalized prefixes seen while inferring IRIs.
    pub prefixes: BTreeSet<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SplitReport {
    pub fn print(&self) {
        println!("{self}");
    }
}

impl fmt::Display for SplitReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "Split report (dry run, nothing written or deleted):")?;
        } else {
            writeln!(f, "Split report:")?;
        }
        writeln!(f, "  Records: {}", self.records)?;
        writeln!(f, "  Triples written: {}", self.triples_written)?;
        writeln!(f, "  Flushes: {}", self.flushes)?;
        writeln!(f, "  Source triples deleted: {}", self.deleted)?;
        if !self.prefixes.is_empty() {
            let prefixes: Vec<&str> = self.prefixes.iter().map(String::as_str).collect();
            writeln!(f, "  Prefixes: {}", prefixes.join(", "))?;
        }
        let elapsed = self.finished_at - self.started_at;
        write!(
            f,
            "  Duration: {}.{:03}s",
            elapsed.num_seconds(),
            elapsed.num_milliseconds() % 1000
        )
    }
}

pub struct SplitPipeline<'a, S: TripleStore + ?Sized> {
    store: &'a S,
    config: SplitConfig,
    registry: Option<&'a dyn RegistrySource>,
    flush_policy: Box<dyn FlushPolicy>,
}

impl<'a, S: TripleStore + ?Sized> SplitPipeline<'a, S> {
    pub fn new(store: &'a S, config: SplitConfig) -> Self {
        Self {
            store,
            config,
            registry: None,
            flush_policy: Box::new(ThresholdPolicy::default()),
        }
    }

    /// Source of the prefix registry for `infer` runs; the cached prefix.cc
    /// context is used otherwise.
    pub fn with_registry(mut self, registry: &'a dyn RegistrySource) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_flush_policy(mut self, policy: Box<dyn FlushPolicy>) -> Self {
        self.flush_policy = policy;
        self
    }

    fn expansion_policy(&self) -> Result<ExpansionPolicy> {
        match &self.config.uri_expansion {
            UriExpansion::Literal => Ok(ExpansionPolicy::literal()),
            UriExpansion::FixedPrefix(prefix) => Ok(ExpansionPolicy::fixed_prefix(prefix.clone())),
            UriExpansion::Infer => {
                let registry = match self.registry {
                    Some(source) => source.load()?,
                    None => RegistryLoader::default().load()?,
                };
                ExpansionPolicy::infer(registry, &self.config.property_to_split)
            }
        }
    }

    pub fn run(self) -> Result<SplitReport> {
        let started_at = Utc::now();
        let delimiter = Delimiter::parse(&self.config.delimiter)?;
        let criteria = self.config.criteria(&delimiter);
        // registry failures surface before the store is queried
        let mut policy = self.expansion_policy()?;
        let splitter = FragmentSplitter::new(delimiter, self.config.trim_delimiter.clone());

        info!(
            "Splitting {} on instances of {} against {} store (expansion: {})",
            self.config.property_to_split,
            self.config.class_to_split,
            self.store.store_type(),
            self.config.uri_expansion
        );

        let SplitPipeline {
            store,
            config,
            flush_policy,
            ..
        } = self;
        let mut batch = BatchAccumulator::new(flush_policy);
        let streamed = stream(
            store,
            &criteria,
            &splitter,
            &mut policy,
            &mut batch,
            config.output_graph.as_ref(),
        )
        .and_then(|records| batch.final_flush(store).map(|_| records));
        let records = match streamed {
            Ok(records) => records,
            Err(e) => {
                if config.source_triples.is_delete() {
                    warn!("Split did not complete, source triples are left in place");
                }
                return Err(e);
            }
        };

        let dry_run = store.is_dry_run();
        if config.source_triples.is_delete() {
            info!("Deleting split source values of {}", criteria.property);
            store.delete_matching(&criteria)?;
        }
        let deleted = config.source_triples.is_delete() && !dry_run;

        Ok(SplitReport {
            records,
            triples_written: batch.written(),
            flushes: batch.flushes(),
            deleted,
            dry_run,
            prefixes: policy.seen_prefixes(),
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Streams every matching record through the splitter and the expansion policy.
/// The cursor is dropped before this returns.
fn stream<S: TripleStore + ?Sized>(
    store: &S,
    criteria: &MatchCriteria,
    splitter: &FragmentSplitter,
    policy: &mut ExpansionPolicy,
    batch: &mut BatchAccumulator,
    output_graph: Option<&NamedNode>,
) -> Result<usize> {
    let mut cursor = store.select_matching(criteria)?.peekable();
    let mut records = 0;
    while let Some(record) = cursor.next() {
        let record = record?;
        records += 1;
        let ctx = ExpansionContext {
            subject: &record.subject,
            predicate: &record.predicate,
            property: &criteria.property,
            graph: output_graph.unwrap_or(&record.graph),
        };
        for fragment in splitter.split(&record.value) {
            batch.add(policy.expand(fragment, &ctx)?)?;
        }
        let has_more = cursor.peek().is_some();
        batch.maybe_flush(store, has_more)?;
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(local: &str) -> NamedNode {
        NamedNode::new(format!("http://example.org/{local}")).unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let config = SplitConfig::builder()
            .class_to_split(ex("Drug"))
            .property_to_split(ex("xref"))
            .delimiter(",")
            .build()
            .unwrap();
        assert_eq!(config.source_triples, SourceTriples::Keep);
        assert_eq!(config.uri_expansion, UriExpansion::Literal);
        assert!(config.trim_delimiter.is_none());
        assert!(config.output_graph.is_none());
    }

    #[test]
    fn test_builder_rejects_bad_delimiter() {
        let err = SplitConfig::builder()
            .class_to_split(ex("Drug"))
            .property_to_split(ex("xref"))
            .delimiter("[")
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn test_builder_requires_class() {
        assert!(SplitConfig::builder()
            .property_to_split(ex("xref"))
            .delimiter(",")
            .build()
            .is_err());
    }

    #[test]
    fn test_criteria_uses_filter_pattern() {
        let config = SplitConfig::builder()
            .class_to_split(ex("Drug"))
            .property_to_split(ex("xref"))
            .delimiter(",\"")
            .source_triples(true)
            .build()
            .unwrap();
        let delimiter = Delimiter::parse(&config.delimiter).unwrap();
        let criteria = config.criteria(&delimiter);
        assert_eq!(criteria.pattern, ",\"");
        assert_eq!(criteria.class, ex("Drug"));
        assert!(config.source_triples.is_delete());
    }
}
