//! Constants shared across the split pipeline: vocabulary terms, registry defaults,
//! batching limits and the hand-curated prefix override table.

use oxigraph::model::NamedNodeRef;

pub const TYPE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#type");

/// Well-known location of the prefix registry document (a JSON-LD `@context`).
pub const DEFAULT_REGISTRY_URL: &str = "http://prefix.cc/context";
/// File name of the on-disk registry cache, relative to the working directory.
pub const DEFAULT_REGISTRY_CACHE: &str = "registry.json";

/// Pending triples above this count trigger an immediate flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1_000_000;

/// `uriExpansion` value selecting identifier resolution.
pub const INFER: &str = "infer";

/// Delimiter text that means "comma immediately followed by a quote".
pub const COMMA_BEFORE_QUOTE: &str = ",\"";

/// Predicate suffix for fragments whose prefix could not be resolved.
pub const UNRESOLVED_SUFFIX: &str = "x-ref";
/// Predicate suffix prepended to a resolved canonical prefix.
pub const RESOLVED_SUFFIX: &str = "x-";

// normalized token -> canonical registry prefix; for prefixes the registry lacks
// or maps under a different name
pub const PREFIX_OVERRIDES: [(&str, &str); 11] = [
    ("keggcompound", "kegg"),
    ("keggdrug", "kegg"),
    ("drugbank", "drugbank"),
    ("uniprotkb", "uniprot"),
    ("clinicaltrials.gov", "clinicaltrials"),
    ("drugsproductdatabase(dpd)", "dpd"),
    ("nationaldrugcodedirectory", "ndc"),
    ("therapeutictargetsdatabase", "ttd"),
    ("fdadruglabelatdailymed", "dailymed"),
    ("chebi:chebi", "chebi"),
    ("pubchemcompound", "b2rpubchem"),
];
