//! The store client boundary.
//!
//! [`TripleStore`] is everything the split pipeline needs from a store: a streaming
//! select of matching records, a bulk write of triples into one named graph, and a
//! delete of the matched source triples. [`SparqlEndpoint`] speaks the SPARQL 1.1
//! Protocol (and optionally the Graph Store Protocol) over HTTP, [`LocalStore`] wraps
//! an embedded oxigraph store, and [`DryRunStore`] forwards reads while discarding
//! writes. Cursors and HTTP responses release their resources when dropped.

use crate::config::{Config, EndpointConfig};
use crate::errors::EndpointError;
use crate::query::{self, MatchCriteria, VAR_GRAPH, VAR_SUBJECT, VAR_VALUE};
use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::{GraphNameRef, NamedNode, NamedNodeRef, Quad, Term, Triple};
use oxigraph::sparql::results::{
    QueryResultsFormat, QueryResultsParser, ReaderQueryResultsParserOutput,
};
use oxigraph::sparql::{QueryResults, QuerySolution, SparqlEvaluator};
use oxigraph::store::{StorageError, Store};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// One matched value: `subject property value` in `graph`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub subject: NamedNode,
    pub predicate: NamedNode,
    pub value: String,
    pub graph: NamedNode,
}

/// A streaming cursor over matched records.
pub type RecordCursor<'a> = Box<dyn Iterator<Item = Result<SourceRecord>> + 'a>;

pub trait TripleStore {
    /// Returns a short description of the store (e.g., "sparql", "memory", "dry-run")
    fn store_type(&self) -> String;

    /// Streams every record matching `criteria`.
    fn select_matching<'a>(&'a self, criteria: &MatchCriteria) -> Result<RecordCursor<'a>>;

    /// Writes `triples` into `graph` in a single call.
    fn insert_triples(&self, graph: NamedNodeRef<'_>, triples: &[Triple]) -> Result<()>;

    /// Removes every source triple matching `criteria`.
    fn delete_matching(&self, criteria: &MatchCriteria) -> Result<()>;

    /// True when writes and deletes are discarded instead of committed.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Converts a result row into a record; rows with a blank-node subject are skipped.
fn record_from_solution(
    solution: &QuerySolution,
    property: &NamedNode,
) -> Result<Option<SourceRecord>> {
    let subject = match solution.get(VAR_SUBJECT) {
        Some(Term::NamedNode(s)) => s.clone(),
        Some(other) => {
            warn!("Skipping record with non-IRI subject {other}");
            return Ok(None);
        }
        None => return Err(anyhow!("Result row is missing ?{VAR_SUBJECT}")),
    };
    let value = match solution.get(VAR_VALUE) {
        Some(Term::Literal(l)) => l.value().to_string(),
        Some(other) => {
            warn!("Skipping record of {subject} with non-literal value {other}");
            return Ok(None);
        }
        None => return Err(anyhow!("Result row is missing ?{VAR_VALUE}")),
    };
    let graph = match solution.get(VAR_GRAPH) {
        Some(Term::NamedNode(g)) => g.clone(),
        other => return Err(anyhow!("Result row has no named ?{VAR_GRAPH}: {other:?}")),
    };
    Ok(Some(SourceRecord {
        subject,
        predicate: property.clone(),
        value,
        graph,
    }))
}

/// Opens the store described by `config`: a local oxigraph directory when `store_path`
/// is set, otherwise the configured SPARQL endpoint.
pub fn open_store(config: &Config) -> Result<Box<dyn TripleStore>> {
    let store: Box<dyn TripleStore> = match (&config.store_path, &config.endpoint) {
        (Some(path), _) => Box::new(LocalStore::open(path)?),
        (None, Some(endpoint)) => Box::new(SparqlEndpoint::new(endpoint)?),
        (None, None) => {
            return Err(anyhow!(
                "No store configured: set an endpoint query URL or a local store path"
            ))
        }
    };
    if config.write_mode().is_dry_run() {
        return Ok(Box::new(DryRunStore::new(store)));
    }
    Ok(store)
}

#[derive(Debug, Clone)]
struct Credentials {
    username: String,
    password: Option<String>,
}

/// A remote store reached over the SPARQL 1.1 Protocol.
#[derive(Debug, Clone)]
pub struct SparqlEndpoint {
    client: Client,
    query_url: Url,
    update_url: Url,
    graph_store_url: Option<Url>,
    credentials: Option<Credentials>,
}

impl SparqlEndpoint {
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let query_url = Url::parse(&config.query_url)?;
        let update_url = match &config.update_url {
            Some(u) => Url::parse(u)?,
            None => query_url.clone(),
        };
        let graph_store_url = config
            .graph_store_url
            .as_deref()
            .map(Url::parse)
            .transpose()?;
        let credentials = config.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: config.password.clone(),
        });
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            query_url,
            update_url,
            graph_store_url,
            credentials,
        })
    }

    pub fn query_url(&self) -> &Url {
        &self.query_url
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(c) => req.basic_auth(&c.username, c.password.as_ref()),
            None => req,
        }
    }

    fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let url = resp.url().to_string();
        let body = resp.text().unwrap_or_default();
        Err(EndpointError {
            url,
            status: status.as_u16(),
            body,
        }
        .into())
    }

    fn update(&self, text: &str) -> Result<()> {
        debug!("SPARQL update against {}:\n{}", self.update_url, text);
        let req = self
            .client
            .post(self.update_url.clone())
            .form(&[("update", text)]);
        Self::check(self.authed(req).send()?)?;
        Ok(())
    }

    fn post_ntriples(&self, base: &Url, graph: NamedNodeRef<'_>, triples: &[Triple]) -> Result<()> {
        let mut url = base.clone();
        url.query_pairs_mut().append_pair("graph", graph.as_str());
        let mut serializer = RdfSerializer::from_format(RdfFormat::NTriples).for_writer(Vec::new());
        for triple in triples {
            serializer.serialize_triple(triple.as_ref())?;
        }
        let body = serializer.finish()?;
        debug!("POST {} triples ({} bytes) to {}", triples.len(), body.len(), url);
        let req = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/n-triples")
            .body(body);
        Self::check(self.authed(req).send()?)?;
        Ok(())
    }
}

impl TripleStore for SparqlEndpoint {
    fn store_type(&self) -> String {
        "sparql".to_string()
    }

    fn select_matching<'a>(&'a self, criteria: &MatchCriteria) -> Result<RecordCursor<'a>> {
        let text = query::select_matching(criteria);
        debug!("SPARQL query against {}:\n{}", self.query_url, text);
        let req = self
            .client
            .post(self.query_url.clone())
            .header(ACCEPT, "application/sparql-results+json")
            .form(&[("query", text.as_str())]);
        let resp = Self::check(self.authed(req).send()?)?;
        let parsed = QueryResultsParser::from_format(QueryResultsFormat::Json).for_reader(resp)?;
        let ReaderQueryResultsParserOutput::Solutions(solutions) = parsed else {
            return Err(anyhow!(
                "Endpoint {} answered a SELECT with a boolean result",
                self.query_url
            ));
        };
        let property = criteria.property.clone();
        Ok(Box::new(solutions.filter_map(move |solution| {
            solution
                .map_err(anyhow::Error::from)
                .and_then(|s| record_from_solution(&s, &property))
                .transpose()
        })))
    }

    fn insert_triples(&self, graph: NamedNodeRef<'_>, triples: &[Triple]) -> Result<()> {
        if triples.is_empty() {
            return Ok(());
        }
        match &self.graph_store_url {
            Some(base) => self.post_ntriples(base, graph, triples),
            None => self.update(&query::insert_data(graph, triples)),
        }
    }

    fn delete_matching(&self, criteria: &MatchCriteria) -> Result<()> {
        self.update(&query::delete_matching(criteria))
    }
}

/// An embedded oxigraph store, in memory or persisted to a directory.
pub struct LocalStore {
    store: Store,
    location: Option<PathBuf>,
}

impl LocalStore {
    pub fn new() -> Result<Self> {
        Ok(Self {
            store: Store::new()?,
            location: None,
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            store: Store::open(path)?,
            location: Some(path.to_path_buf()),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Loads TriG or N-Quads data, keeping its named graphs.
    pub fn load(&self, format: RdfFormat, data: &[u8]) -> Result<()> {
        let parser = RdfParser::from_format(format);
        let mut loader = self.store.bulk_loader();
        loader.load_from_reader(parser, std::io::Cursor::new(data))?;
        loader.commit()?;
        Ok(())
    }

    /// All triples of one named graph.
    pub fn graph_triples(&self, graph: NamedNodeRef<'_>) -> Result<Vec<Triple>> {
        let mut out = Vec::new();
        for quad in self
            .store
            .quads_for_pattern(None, None, None, Some(GraphNameRef::NamedNode(graph)))
        {
            let quad = quad?;
            out.push(Triple::new(quad.subject, quad.predicate, quad.object));
        }
        Ok(out)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.store.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.store.is_empty()?)
    }
}

impl TripleStore for LocalStore {
    fn store_type(&self) -> String {
        match &self.location {
            Some(_) => "persistent".to_string(),
            None => "memory".to_string(),
        }
    }

    fn select_matching<'a>(&'a self, criteria: &MatchCriteria) -> Result<RecordCursor<'a>> {
        let text = query::select_matching(criteria);
        debug!("Local query:\n{text}");
        let results = SparqlEvaluator::new()
            .parse_query(&text)?
            .on_store(&self.store)
            .execute()?;
        let QueryResults::Solutions(solutions) = results else {
            return Err(anyhow!("Local store answered a SELECT without solutions"));
        };
        let property = criteria.property.clone();
        Ok(Box::new(solutions.filter_map(move |solution| {
            solution
                .map_err(anyhow::Error::from)
                .and_then(|s| record_from_solution(&s, &property))
                .transpose()
        })))
    }

    fn insert_triples(&self, graph: NamedNodeRef<'_>, triples: &[Triple]) -> Result<()> {
        let quads = triples
            .iter()
            .map(|t| t.clone().in_graph(graph.into_owned()))
            .map(Ok::<Quad, StorageError>);
        let mut loader = self.store.bulk_loader();
        loader.load_ok_quads::<_, StorageError>(quads)?;
        loader.commit()?;
        Ok(())
    }

    fn delete_matching(&self, criteria: &MatchCriteria) -> Result<()> {
        let text = query::delete_matching(criteria);
        debug!("Local update:\n{text}");
        SparqlEvaluator::new()
            .parse_update(&text)?
            .on_store(&self.store)
            .execute()?;
        Ok(())
    }
}

/// Reads from the wrapped store but only logs writes and deletes.
pub struct DryRunStore {
    inner: Box<dyn TripleStore>,
    discarded: Cell<usize>,
}

impl DryRunStore {
    pub fn new(inner: Box<dyn TripleStore>) -> Self {
        Self {
            inner,
            discarded: Cell::new(0),
        }
    }

    /// Number of triples that would have been written.
    pub fn discarded(&self) -> usize {
        self.discarded.get()
    }
}

impl TripleStore for DryRunStore {
    fn store_type(&self) -> String {
        format!("dry-run ({})", self.inner.store_type())
    }

    fn select_matching<'a>(&'a self, criteria: &MatchCriteria) -> Result<RecordCursor<'a>> {
        self.inner.select_matching(criteria)
    }

    fn insert_triples(&self, graph: NamedNodeRef<'_>, triples: &[Triple]) -> Result<()> {
        self.discarded.set(self.discarded.get() + triples.len());
        info!("[dry run] would write {} triples to {}", triples.len(), graph);
        Ok(())
    }

    fn delete_matching(&self, criteria: &MatchCriteria) -> Result<()> {
        info!(
            "[dry run] would delete values of {} on instances of {}",
            criteria.property, criteria.class
        );
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
