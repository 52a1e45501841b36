//! Turning one raw fragment into an output triple.
//!
//! Three policies exist. `Literal` keeps the fragment as a plain literal, `FixedPrefix`
//! prepends a configured namespace and emits an IRI, and `Infer` parses a compact
//! `prefix:id` identifier and resolves the prefix through a [`PrefixRegistry`].
//! Fragments whose prefix cannot be resolved are kept as literals under an `x-ref`
//! predicate, and fixed-prefix fragments that do not form an IRI stay literals under
//! the original predicate, so no data is dropped.

use crate::consts::{INFER, RESOLVED_SUFFIX, UNRESOLVED_SUFFIX};
use crate::registry::{normalize_prefix, PrefixRegistry};
use anyhow::{anyhow, Result};
use log::{debug, warn};
use oxigraph::model::{GraphName, Literal, NamedNode, Quad, Term};
use std::collections::BTreeSet;
use std::fmt;

/// The configured `uriExpansion` value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UriExpansion {
    #[default]
    Literal,
    FixedPrefix(String),
    Infer,
}

impl UriExpansion {
    /// `None` keeps literals, `"infer"` resolves identifiers, anything else is a fixed prefix.
    pub fn from_option(value: Option<&str>) -> Self {
        match value {
            None => UriExpansion::Literal,
            Some(INFER) => UriExpansion::Infer,
            Some(prefix) => UriExpansion::FixedPrefix(prefix.to_string()),
        }
    }

    pub fn as_option(&self) -> Option<&str> {
        match self {
            UriExpansion::Literal => None,
            UriExpansion::FixedPrefix(prefix) => Some(prefix),
            UriExpansion::Infer => Some(INFER),
        }
    }

    pub fn needs_registry(&self) -> bool {
        matches!(self, UriExpansion::Infer)
    }
}

impl fmt::Display for UriExpansion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UriExpansion::Literal => write!(f, "literal"),
            UriExpansion::FixedPrefix(prefix) => write!(f, "prefix <{prefix}>"),
            UriExpansion::Infer => write!(f, "infer"),
        }
    }
}

/// Everything about the source record an expansion needs besides the fragment.
#[derive(Debug, Clone)]
pub struct ExpansionContext<'a> {
    pub subject: &'a NamedNode,
    pub predicate: &'a NamedNode,
    /// The property being split; rewritten predicates are derived from it.
    pub property: &'a NamedNode,
    pub graph: &'a NamedNode,
}

impl ExpansionContext<'_> {
    fn quad(&self, predicate: NamedNode, object: impl Into<Term>) -> Quad {
        Quad::new(
            self.subject.clone(),
            predicate,
            object,
            GraphName::NamedNode(self.graph.clone()),
        )
    }
}

/// The namespace of a property IRI: everything up to and including its last `/`.
pub fn property_base(property: &NamedNode) -> Option<&str> {
    let iri = property.as_str();
    iri.rfind('/').map(|idx| &iri[..=idx])
}

/// Splits a `prefix:id` fragment at the separator chosen for it.
///
/// Fragments mentioning `url` split at the first `:` so schemes like `http://` stay in
/// the identifier; all others split at the last `:` so prefixes may contain colons.
pub fn split_identifier(fragment: &str) -> Option<(&str, &str)> {
    let idx = if fragment.contains("url") {
        fragment.find(':')?
    } else {
        fragment.rfind(':')?
    };
    Some((&fragment[..idx], &fragment[idx + 1..]))
}

/// Drops trailing annotation text, e.g. `"12345 (database X)"` becomes `"12345 "`.
pub fn strip_annotation(fragment: &str) -> &str {
    match fragment.find('(') {
        Some(idx) => &fragment[..idx],
        None => fragment,
    }
}

#[derive(Debug, Clone)]
pub struct InferState {
    registry: PrefixRegistry,
    x_ref: NamedNode,
    base: String,
    seen: BTreeSet<String>,
}

/// A ready-to-use expansion policy.
#[derive(Debug, Clone)]
pub enum ExpansionPolicy {
    Literal,
    FixedPrefix(String),
    Infer(Box<InferState>),
}

impl ExpansionPolicy {
    pub fn literal() -> Self {
        ExpansionPolicy::Literal
    }

    pub fn fixed_prefix(prefix: impl Into<String>) -> Self {
        ExpansionPolicy::FixedPrefix(prefix.into())
    }

    /// Builds the inference policy for `property`, which must contain a `/`.
    pub fn infer(registry: PrefixRegistry, property: &NamedNode) -> Result<Self> {
        let base = property_base(property)
            .ok_or_else(|| {
                anyhow!("Cannot derive x-ref predicates from {property}: the IRI has no '/'")
            })?
            .to_string();
        let x_ref = NamedNode::new(format!("{base}{UNRESOLVED_SUFFIX}"))?;
        Ok(ExpansionPolicy::Infer(Box::new(InferState {
            registry,
            x_ref,
            base,
            seen: BTreeSet::new(),
        })))
    }

    /// Normalized prefixes encountered so far, resolved or not.
    pub fn seen_prefixes(&self) -> BTreeSet<String> {
        match self {
            ExpansionPolicy::Infer(state) => state.seen.clone(),
            _ => BTreeSet::new(),
        }
    }

    pub fn expand(&mut self, fragment: &str, ctx: &ExpansionContext<'_>) -> Result<Quad> {
        match self {
            ExpansionPolicy::Literal => Ok(ctx.quad(
                ctx.predicate.clone(),
                Literal::new_simple_literal(fragment),
            )),
            ExpansionPolicy::FixedPrefix(prefix) => {
                match NamedNode::new(format!("{prefix}{}", fragment.trim())) {
                    Ok(object) => Ok(ctx.quad(ctx.predicate.clone(), object)),
                    Err(e) => {
                        warn!(
                            "Fragment '{fragment}' with prefix <{prefix}> is not an IRI ({e}), \
                             keeping it as a literal"
                        );
                        Ok(ctx.quad(
                            ctx.predicate.clone(),
                            Literal::new_simple_literal(fragment),
                        ))
                    }
                }
            }
            ExpansionPolicy::Infer(state) => Ok(state.expand(fragment, ctx)),
        }
    }
}

impl InferState {
    fn expand(&mut self, fragment: &str, ctx: &ExpansionContext<'_>) -> Quad {
        let truncated = strip_annotation(fragment);
        let Some((prefix_part, id_part)) = split_identifier(truncated) else {
            return ctx.quad(
                ctx.predicate.clone(),
                Literal::new_simple_literal(truncated),
            );
        };

        let prefix = normalize_prefix(prefix_part);
        self.seen.insert(prefix.clone());

        if let Some(resolution) = self.registry.resolve(&prefix) {
            let object = NamedNode::new(format!("{}{}", resolution.stem, id_part.trim()));
            let predicate =
                NamedNode::new(format!("{}{RESOLVED_SUFFIX}{}", self.base, resolution.prefix));
            if let (Ok(object), Ok(predicate)) = (object, predicate) {
                return ctx.quad(predicate, object);
            }
            debug!("Resolved '{fragment}' does not form a valid IRI, keeping it as x-ref");
        }

        ctx.quad(self.x_ref.clone(), Literal::new_simple_literal(fragment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EX: &str = "http://example.org/";

    fn nn(local: &str) -> NamedNode {
        NamedNode::new(format!("{EX}{local}")).unwrap()
    }

    fn registry() -> PrefixRegistry {
        PrefixRegistry::new([
            ("chebi", "http://purl.obolibrary.org/obo/CHEBI_"),
            ("kegg", "http://identifiers.org/kegg/"),
            ("url", "http://identifiers.org/url/"),
        ])
    }

    struct Fixture {
        subject: NamedNode,
        property: NamedNode,
        graph: NamedNode,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                subject: nn("drug1"),
                property: nn("xref"),
                graph: nn("g1"),
            }
        }

        fn ctx(&self) -> ExpansionContext<'_> {
            ExpansionContext {
                subject: &self.subject,
                predicate: &self.property,
                property: &self.property,
                graph: &self.graph,
            }
        }
    }

    #[test]
    fn test_uri_expansion_from_option() {
        assert_eq!(UriExpansion::from_option(None), UriExpansion::Literal);
        assert_eq!(UriExpansion::from_option(Some("infer")), UriExpansion::Infer);
        assert_eq!(
            UriExpansion::from_option(Some("http://x.org/")),
            UriExpansion::FixedPrefix("http://x.org/".to_string())
        );
        assert!(UriExpansion::Infer.needs_registry());
        assert_eq!(UriExpansion::Infer.as_option(), Some("infer"));
    }

    #[test]
    fn test_literal_policy() {
        let f = Fixture::new();
        let quad = ExpansionPolicy::literal().expand("aspirin", &f.ctx()).unwrap();
        assert_eq!(quad.predicate, f.property);
        assert_eq!(quad.object, Term::from(Literal::new_simple_literal("aspirin")));
        assert_eq!(quad.graph_name, GraphName::NamedNode(f.graph.clone()));
    }

    #[test]
    fn test_fixed_prefix_policy() {
        let f = Fixture::new();
        let mut policy = ExpansionPolicy::fixed_prefix("http://identifiers.org/go/GO:");
        let quad = policy.expand("0008150", &f.ctx()).unwrap();
        assert_eq!(
            quad.object,
            Term::from(NamedNode::new("http://identifiers.org/go/GO:0008150").unwrap())
        );
        assert_eq!(quad.predicate, f.property);

        // surrounding whitespace is not part of the identifier
        let quad = policy.expand(" 0009987 ", &f.ctx()).unwrap();
        assert_eq!(
            quad.object,
            Term::from(NamedNode::new("http://identifiers.org/go/GO:0009987").unwrap())
        );
    }

    #[test]
    fn test_fixed_prefix_invalid_iri_stays_literal() {
        let f = Fixture::new();
        let mut policy = ExpansionPolicy::fixed_prefix("http://identifiers.org/go/GO:");
        let quad = policy.expand("has space", &f.ctx()).unwrap();
        assert_eq!(quad.predicate, f.property);
        assert_eq!(
            quad.object,
            Term::from(Literal::new_simple_literal("has space"))
        );
    }

    #[test]
    fn test_infer_without_colon_is_literal() {
        let f = Fixture::new();
        let mut policy = ExpansionPolicy::infer(registry(), &f.property).unwrap();
        let quad = policy.expand("plain value", &f.ctx()).unwrap();
        assert_eq!(quad.predicate, f.property);
        assert_eq!(
            quad.object,
            Term::from(Literal::new_simple_literal("plain value"))
        );
        assert!(policy.seen_prefixes().is_empty());
    }

    #[test]
    fn test_infer_resolves_with_override() {
        let f = Fixture::new();
        let mut policy = ExpansionPolicy::infer(registry(), &f.property).unwrap();
        let quad = policy.expand(" KEGG Compound:C00002", &f.ctx()).unwrap();
        assert_eq!(quad.predicate, nn("x-kegg"));
        assert_eq!(
            quad.object,
            Term::from(NamedNode::new("http://identifiers.org/kegg/C00002").unwrap())
        );
        assert!(policy.seen_prefixes().contains("keggcompound"));
    }

    #[test]
    fn test_infer_strips_annotation() {
        let f = Fixture::new();
        let mut policy = ExpansionPolicy::infer(registry(), &f.property).unwrap();
        let quad = policy.expand("ChEBI:15365 (aspirin)", &f.ctx()).unwrap();
        assert_eq!(quad.predicate, nn("x-chebi"));
        assert_eq!(
            quad.object,
            Term::from(NamedNode::new("http://purl.obolibrary.org/obo/CHEBI_15365").unwrap())
        );
    }

    #[test]
    fn test_infer_miss_keeps_untruncated_fragment() {
        let f = Fixture::new();
        let mut policy = ExpansionPolicy::infer(registry(), &f.property).unwrap();
        let quad = policy.expand("Foo DB:42 (note)", &f.ctx()).unwrap();
        assert_eq!(quad.predicate, nn("x-ref"));
        assert_eq!(
            quad.object,
            Term::from(Literal::new_simple_literal("Foo DB:42 (note)"))
        );
        assert!(policy.seen_prefixes().contains("foodb"));
    }

    #[test]
    fn test_infer_url_splits_on_first_colon() {
        assert_eq!(
            split_identifier("url:http://example.org/a"),
            Some(("url", "http://example.org/a"))
        );
        assert_eq!(split_identifier("a:b:c"), Some(("a:b", "c")));
        assert_eq!(split_identifier("abc"), None);

        let f = Fixture::new();
        let mut policy = ExpansionPolicy::infer(registry(), &f.property).unwrap();
        let quad = policy.expand("URL:http://example.org/a", &f.ctx()).unwrap();
        // "URL" uppercase does not contain "url", so the last colon is used
        assert_eq!(quad.predicate, nn("x-ref"));
        let quad = policy.expand("url:http://example.org/a", &f.ctx()).unwrap();
        assert_eq!(quad.predicate, nn("x-url"));
    }

    #[test]
    fn test_infer_invalid_iri_falls_back_to_x_ref() {
        let f = Fixture::new();
        let mut policy = ExpansionPolicy::infer(registry(), &f.property).unwrap();
        let quad = policy.expand("chebi:12 34", &f.ctx()).unwrap();
        assert_eq!(quad.predicate, nn("x-ref"));
    }

    #[test]
    fn test_infer_requires_slash_in_property() {
        let property = NamedNode::new("urn:xref").unwrap();
        assert!(ExpansionPolicy::infer(registry(), &property).is_err());
        assert_eq!(property_base(&nn("a/b")), Some("http://example.org/a/"));
    }
}
