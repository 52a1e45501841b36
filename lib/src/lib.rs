//! Splits multi-valued literals stored in a triple store into one triple per value.
//!
//! A [`pipeline::SplitPipeline`] selects every literal of a property on instances of a
//! class, cuts each value on a delimiter, optionally turns each piece into an IRI, and
//! writes the results back in batches through a [`store::TripleStore`].

extern crate derive_builder;

pub mod batch;
pub mod config;
pub mod consts;
pub mod errors;
pub mod expand;
pub mod fetch;
pub mod options;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod split;
pub mod store;

pub use pipeline::{SplitConfig, SplitPipeline, SplitReport};
pub use store::{DryRunStore, LocalStore, SparqlEndpoint, TripleStore};
