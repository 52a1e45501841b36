//! In-memory accumulation of derived triples and their periodic flush to a store.
//!
//! Triples are grouped by named graph. A flush writes every group with one
//! [`TripleStore::insert_triples`] call per graph, so graphs are never mixed in a
//! single write. When to flush is decided by an injected [`FlushPolicy`].

use crate::consts::DEFAULT_FLUSH_THRESHOLD;
use crate::store::TripleStore;
use anyhow::{anyhow, Result};
use log::{debug, info};
use oxigraph::model::{GraphName, NamedNode, Quad, Triple};
use std::collections::HashMap;

pub trait FlushPolicy {
    fn should_flush(&self, pending: usize, has_more_input: bool) -> bool;
}

/// Flushes once more than `threshold` triples are pending, and at end of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub threshold: usize,
}

impl ThresholdPolicy {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_THRESHOLD)
    }
}

impl FlushPolicy for ThresholdPolicy {
    fn should_flush(&self, pending: usize, has_more_input: bool) -> bool {
        pending > self.threshold || !has_more_input
    }
}

#[derive(Debug)]
struct GraphBatch {
    graph: NamedNode,
    triples: Vec<Triple>,
}

pub struct BatchAccumulator {
    groups: Vec<GraphBatch>,
    index: HashMap<NamedNode, usize>,
    pending: usize,
    written: usize,
    flushes: usize,
    policy: Box<dyn FlushPolicy>,
}

impl Default for BatchAccumulator {
    fn default() -> Self {
        Self::new(Box::new(ThresholdPolicy::default()))
    }
}

impl BatchAccumulator {
    pub fn new(policy: Box<dyn FlushPolicy>) -> Self {
        Self {
            groups: Vec::new(),
            index: HashMap::new(),
            pending: 0,
            written: 0,
            flushes: 0,
            policy,
        }
    }

    /// Triples added since the last flush.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Triples written by all flushes so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Number of flushes that wrote at least one triple.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Distinct graphs with pending triples.
    pub fn pending_graphs(&self) -> usize {
        self.groups.len()
    }

    pub fn add(&mut self, quad: Quad) -> Result<()> {
        let graph = match quad.graph_name {
            GraphName::NamedNode(graph) => graph,
            other => {
                return Err(anyhow!(
                    "Derived triples must target a named graph, got {other}"
                ))
            }
        };
        let triple = Triple::new(quad.subject, quad.predicate, quad.object);
        let idx = match self.index.get(&graph) {
            Some(idx) => *idx,
            None => {
                self.groups.push(GraphBatch {
                    graph: graph.clone(),
                    triples: Vec::new(),
                });
                self.index.insert(graph, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[idx].triples.push(triple);
        self.pending += 1;
        Ok(())
    }

    /// Flushes if the policy asks for it. Returns the number of triples written.
    pub fn maybe_flush<S: TripleStore + ?Sized>(
        &mut self,
        store: &S,
        has_more_input: bool,
    ) -> Result<usize> {
        if !self.policy.should_flush(self.pending, has_more_input) {
            return Ok(0);
        }
        let flushed = self.flush(store)?;
        if flushed > 0 {
            if has_more_input {
                info!("Updated triples: {}", self.written);
            } else {
                info!("Total updated triples: {}", self.written);
            }
        }
        Ok(flushed)
    }

    /// Writes whatever is still pending.
    pub fn final_flush<S: TripleStore + ?Sized>(&mut self, store: &S) -> Result<usize> {
        let flushed = self.flush(store)?;
        if flushed > 0 {
            info!("Total updated triples: {}", self.written);
        }
        Ok(flushed)
    }

    fn flush<S: TripleStore + ?Sized>(&mut self, store: &S) -> Result<usize> {
        if self.pending == 0 {
            return Ok(0);
        }
        let mut done = 0;
        let mut outcome = Ok(());
        for group in &self.groups {
            debug!("Writing {} triples to {}", group.triples.len(), group.graph);
            if let Err(e) = store.insert_triples(group.graph.as_ref(), &group.triples) {
                outcome = Err(e);
                break;
            }
            done += 1;
        }

        // groups that were written leave the batch even if a later graph failed
        let flushed: usize = self.groups.drain(..done).map(|g| g.triples.len()).sum();
        self.pending -= flushed;
        self.written += flushed;
        self.index = self
            .groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.graph.clone(), i))
            .collect();
        outcome?;

        self.flushes += 1;
        Ok(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MatchCriteria;
    use crate::store::RecordCursor;
    use oxigraph::model::{Literal, NamedNodeRef};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingStore {
        writes: RefCell<Vec<(NamedNode, usize)>>,
        fail_on: Option<NamedNode>,
    }

    impl TripleStore for RecordingStore {
        fn store_type(&self) -> String {
            "recording".to_string()
        }

        fn select_matching<'a>(&'a self, _: &MatchCriteria) -> Result<RecordCursor<'a>> {
            Ok(Box::new(std::iter::empty()))
        }

        fn insert_triples(&self, graph: NamedNodeRef<'_>, triples: &[Triple]) -> Result<()> {
            if self.fail_on.as_ref().map(|g| g.as_ref()) == Some(graph) {
                return Err(anyhow!("write to {graph} refused"));
            }
            self.writes
                .borrow_mut()
                .push((graph.into_owned(), triples.len()));
            Ok(())
        }

        fn delete_matching(&self, _: &MatchCriteria) -> Result<()> {
            Ok(())
        }
    }

    fn quad(graph: &str, n: usize) -> Quad {
        Quad::new(
            NamedNode::new(format!("http://example.org/s{n}")).unwrap(),
            NamedNode::new("http://example.org/p").unwrap(),
            Literal::new_simple_literal(n.to_string()),
            NamedNode::new(format!("http://example.org/{graph}")).unwrap(),
        )
    }

    #[test]
    fn test_default_threshold() {
        let policy = ThresholdPolicy::default();
        assert_eq!(policy.threshold, 1_000_000);
        assert!(!policy.should_flush(1_000_000, true));
        assert!(policy.should_flush(1_000_001, true));
        assert!(policy.should_flush(0, false));
    }

    #[test]
    fn test_flush_after_threshold_exceeded() {
        let store = RecordingStore::default();
        let mut batch = BatchAccumulator::new(Box::new(ThresholdPolicy::new(5)));
        for n in 0..5 {
            batch.add(quad("g1", n)).unwrap();
            assert_eq!(batch.maybe_flush(&store, true).unwrap(), 0);
        }
        assert_eq!(batch.flushes(), 0);
        assert_eq!(batch.pending(), 5);

        batch.add(quad("g1", 5)).unwrap();
        assert_eq!(batch.maybe_flush(&store, true).unwrap(), 6);
        assert_eq!(batch.flushes(), 1);
        assert_eq!(batch.pending(), 0);
        assert_eq!(batch.written(), 6);
    }

    #[test]
    fn test_end_of_input_flushes_remainder_once() {
        let store = RecordingStore::default();
        let mut batch = BatchAccumulator::new(Box::new(ThresholdPolicy::new(100)));
        batch.add(quad("g1", 0)).unwrap();
        batch.add(quad("g1", 1)).unwrap();
        assert_eq!(batch.maybe_flush(&store, false).unwrap(), 2);
        assert_eq!(batch.final_flush(&store).unwrap(), 0);
        assert_eq!(store.writes.borrow().len(), 1);
    }

    #[test]
    fn test_empty_flush_writes_nothing() {
        let store = RecordingStore::default();
        let mut batch = BatchAccumulator::default();
        assert_eq!(batch.maybe_flush(&store, false).unwrap(), 0);
        assert_eq!(batch.final_flush(&store).unwrap(), 0);
        assert!(store.writes.borrow().is_empty());
        assert_eq!(batch.flushes(), 0);
    }

    #[test]
    fn test_one_write_per_graph() {
        let store = RecordingStore::default();
        let mut batch = BatchAccumulator::default();
        batch.add(quad("g1", 0)).unwrap();
        batch.add(quad("g2", 1)).unwrap();
        batch.add(quad("g1", 2)).unwrap();
        assert_eq!(batch.pending_graphs(), 2);
        batch.final_flush(&store).unwrap();
        let writes = store.writes.borrow();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].0.as_str(), "http://example.org/g1");
        assert_eq!(writes[0].1, 2);
        assert_eq!(writes[1].0.as_str(), "http://example.org/g2");
        assert_eq!(writes[1].1, 1);
    }

    #[test]
    fn test_failed_write_keeps_unwritten_graphs() {
        let store = RecordingStore {
            fail_on: Some(NamedNode::new("http://example.org/g2").unwrap()),
            ..Default::default()
        };
        let mut batch = BatchAccumulator::default();
        batch.add(quad("g1", 0)).unwrap();
        batch.add(quad("g2", 1)).unwrap();
        batch.add(quad("g2", 2)).unwrap();
        assert!(batch.final_flush(&store).is_err());
        assert_eq!(batch.written(), 1);
        assert_eq!(batch.pending(), 2);
        assert_eq!(batch.pending_graphs(), 1);
        assert_eq!(batch.flushes(), 0);
    }

    #[test]
    fn test_default_graph_rejected() {
        let mut batch = BatchAccumulator::default();
        let q = Quad::new(
            NamedNode::new("http://example.org/s").unwrap(),
            NamedNode::new("http://example.org/p").unwrap(),
            Literal::new_simple_literal("v"),
            GraphName::DefaultGraph,
        );
        assert!(batch.add(q).is_err());
        assert_eq!(batch.pending(), 0);
    }
}
