//! Repository layer
//!
//! Stateless clients for the external services the stages talk to. They
//! are trait-based so stages can be tested against in-process fakes.

mod sparql;

pub use sparql::SparqlRepository;

pub use sparql::{HttpSparqlRepository, SPARQL_RESULTS_JSON};
