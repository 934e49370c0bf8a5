//! The store seam: every read and write the consumer performs goes through [`SparqlStore`].

use crate::core::Term;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// One solution of a SELECT query, keyed by variable name (without `?`).
pub type Binding = HashMap<String, Term>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The endpoint could not be reached or the connection broke.
    #[error("HTTP error: {0}")]
    Http(String),
    /// The endpoint answered with a non-success status.
    #[error("store responded with status {status}: {body}")]
    Status { status: u16, body: String },
    /// The endpoint answered with a body that is not valid SPARQL JSON results.
    #[error("could not decode store response: {0}")]
    Decode(String),
    /// The query or update was rejected (syntax or evaluation error).
    #[error("query error: {0}")]
    Query(String),
}

impl StoreError {
    /// Whether a retry may succeed. Rejected queries and client errors never will.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(_) => true,
            StoreError::Status { status, .. } => *status >= 500 || *status == 429,
            StoreError::Decode(_) | StoreError::Query(_) => false,
        }
    }
}

#[async_trait]
pub trait SparqlStore: Send + Sync {
    /// Run a SELECT query and return its solutions.
    async fn query(&self, query: &str) -> Result<Vec<Binding>, StoreError>;

    /// Run a SPARQL update.
    async fn update(&self, update: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: SparqlStore + ?Sized> SparqlStore for Arc<S> {
    async fn query(&self, query: &str) -> Result<Vec<Binding>, StoreError> {
        (**self).query(query).await
    }

    async fn update(&self, update: &str) -> Result<(), StoreError> {
        (**self).update(update).await
    }
}

/// Read an IRI binding from a solution.
pub fn binding_iri<'a>(binding: &'a Binding, variable: &str) -> Option<&'a str> {
    binding.get(variable).and_then(Term::as_iri)
}

/// Read the lexical value of any binding from a solution.
pub fn binding_value<'a>(binding: &'a Binding, variable: &str) -> Option<&'a str> {
    binding.get(variable).map(Term::value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Http("connection refused".into()).is_transient());
        assert!(StoreError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!StoreError::Status { status: 400, body: String::new() }.is_transient());
        assert!(!StoreError::Query("syntax".into()).is_transient());
    }
}
