//! Embedded Oxigraph store behind the [`SparqlStore`] seam.
//!
//! Runs the exact SPARQL text the consumer would send to a remote endpoint, against an
//! in-memory `oxigraph::store::Store`. Useful for local runs and for exercising the whole
//! pipeline without a triplestore.
//!
//! # Example
//!
//! ```ignore
//! use delta_consumer::querying::oxigraph_adapter::OxigraphStore;
//! use delta_consumer::querying::query_processing::SparqlStore;
//!
//! let store = OxigraphStore::new()?;
//! store.update("INSERT DATA { <http://ex.org/a> <http://ex.org/p> \"x\" }").await?;
//! let bindings = store.query("SELECT ?o WHERE { ?s ?p ?o }").await?;
//! ```

use crate::core::{Literal, Term};
use crate::querying::query_processing::{Binding, SparqlStore, StoreError};
use async_trait::async_trait;
use oxigraph::model::Term as OxTerm;
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;

pub struct OxigraphStore {
    store: Store,
}

impl From<oxigraph::store::StorageError> for StoreError {
    fn from(err: oxigraph::store::StorageError) -> Self {
        StoreError::Query(err.to_string())
    }
}

impl From<oxigraph::sparql::QueryEvaluationError> for StoreError {
    fn from(err: oxigraph::sparql::QueryEvaluationError) -> Self {
        StoreError::Query(err.to_string())
    }
}

impl OxigraphStore {
    pub fn new() -> Result<Self, StoreError> {
        Ok(Self { store: Store::new()? })
    }

    /// The underlying store, for direct inspection.
    pub fn inner(&self) -> &Store {
        &self.store
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.store.len()?)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.store.is_empty()?)
    }
}

fn convert_term(term: &OxTerm) -> Option<Term> {
    match term {
        OxTerm::NamedNode(node) => Some(Term::Iri(node.as_str().to_string())),
        OxTerm::Literal(literal) => {
            let language = literal.language().map(str::to_string);
            let datatype = language.is_none().then(|| literal.datatype().as_str().to_string());
            Some(Term::Literal(Literal { value: literal.value().to_string(), datatype, language }))
        }
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

#[async_trait]
impl SparqlStore for OxigraphStore {
    async fn query(&self, query: &str) -> Result<Vec<Binding>, StoreError> {
        let evaluator = SparqlEvaluator::new();
        let parsed_query =
            evaluator.parse_query(query).map_err(|e| StoreError::Query(e.to_string()))?;
        let results = parsed_query.on_store(&self.store).execute()?;

        let mut bindings = Vec::new();
        if let QueryResults::Solutions(solutions) = results {
            for solution in solutions {
                let solution = solution?;
                let mut binding = Binding::new();
                for (var, term) in solution.iter() {
                    // Blank nodes never reach the consumer's data model.
                    if let Some(term) = convert_term(term) {
                        binding.insert(var.as_str().to_string(), term);
                    }
                }
                bindings.push(binding);
            }
        }
        Ok(bindings)
    }

    async fn update(&self, update: &str) -> Result<(), StoreError> {
        SparqlEvaluator::new()
            .parse_update(update)
            .map_err(|e| StoreError::Query(e.to_string()))?
            .on_store(&self.store)
            .execute()
            .map_err(|e| StoreError::Query(e.to_string()))
    }
}
