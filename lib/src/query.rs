//! Builds the SPARQL text exchanged with a store from structured match criteria.
//!
//! Only typed terms reach the generated text: IRIs come from validated [`NamedNode`]s
//! and the regex pattern is rendered through [`Literal`], so quoting and escaping are
//! handled by the RDF model rather than by string concatenation of user input.

use crate::consts::TYPE;
use oxigraph::model::{Literal, NamedNode, NamedNodeRef, Triple};
use std::fmt::Write;

pub const VAR_SUBJECT: &str = "s";
pub const VAR_VALUE: &str = "toSplit";
pub const VAR_GRAPH: &str = "g";

/// Which triples a split run touches: literals of `property` on IRI-named instances of
/// `class` whose value matches `pattern`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCriteria {
    pub class: NamedNode,
    pub property: NamedNode,
    pub pattern: String,
}

impl MatchCriteria {
    pub fn new(class: NamedNode, property: NamedNode, pattern: impl Into<String>) -> Self {
        Self {
            class,
            property,
            pattern: pattern.into(),
        }
    }

    fn where_block(&self, value_var: &str) -> String {
        let pattern = Literal::new_simple_literal(&self.pattern);
        format!(
            "GRAPH ?{VAR_GRAPH} {{ ?{VAR_SUBJECT} {TYPE} {class} ; {property} ?{value_var} . \
             FILTER(isIRI(?{VAR_SUBJECT}) && isLiteral(?{value_var}) \
             && regex(str(?{value_var}), {pattern})) }}",
            class = self.class,
            property = self.property,
        )
    }
}

/// `SELECT ?s ?toSplit ?g` over every named graph.
pub fn select_matching(criteria: &MatchCriteria) -> String {
    format!(
        "SELECT ?{VAR_SUBJECT} ?{VAR_VALUE} ?{VAR_GRAPH} WHERE {{ {} }}",
        criteria.where_block(VAR_VALUE)
    )
}

/// Deletes exactly the triples [`select_matching`] returns, each from its own graph.
pub fn delete_matching(criteria: &MatchCriteria) -> String {
    format!(
        "DELETE {{ GRAPH ?{VAR_GRAPH} {{ ?{VAR_SUBJECT} {property} ?o }} }} WHERE {{ {} }}",
        criteria.where_block("o"),
        property = criteria.property,
    )
}

/// `INSERT DATA` for a set of triples into one named graph.
pub fn insert_data(graph: NamedNodeRef<'_>, triples: &[Triple]) -> String {
    let mut out = format!("INSERT DATA {{ GRAPH {graph} {{\n");
    for triple in triples {
        // writing to a String cannot fail
        let _ = writeln!(out, "{triple} .");
    }
    out.push_str("} }");
    out
}
