//! The landing zone: a mirror graph of every raw statement the consumer ingested.
//!
//! Mapping rules are evaluated against this graph, so a rule joining several statements
//! still matches when those statements arrived in different delta files.

use crate::core::{escape_iri, Quad};
use crate::querying::query_processing::{binding_value, SparqlStore};
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_BATCH_SIZE: usize = 100;

pub struct LandingZone {
    store: Arc<dyn SparqlStore>,
    graph: String,
    batch_size: usize,
}

impl LandingZone {
    pub fn new(store: Arc<dyn SparqlStore>, graph: impl Into<String>) -> Self {
        Self { store, graph: graph.into(), batch_size: DEFAULT_BATCH_SIZE }
    }

    /// Number of statements sent per update request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn graph(&self) -> &str {
        &self.graph
    }

    pub async fn insert(&self, statements: &[Quad]) -> Result<()> {
        self.write("INSERT", statements).await
    }

    pub async fn delete(&self, statements: &[Quad]) -> Result<()> {
        self.write("DELETE", statements).await
    }

    /// Remove every statement from the mirror graph.
    pub async fn flush(&self) -> Result<()> {
        info!(graph = %self.graph, "flushing landing zone");
        self.store.update(&format!("DROP SILENT GRAPH {}", escape_iri(&self.graph))).await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        let query = format!(
            "SELECT (COUNT(*) AS ?count) WHERE {{ GRAPH {} {{ ?s ?p ?o }} }}",
            escape_iri(&self.graph)
        );
        let bindings = self.store.query(&query).await?;
        Ok(bindings
            .first()
            .and_then(|b| binding_value(b, "count"))
            .and_then(|count| count.parse().ok())
            .unwrap_or(0))
    }

    pub async fn contains(&self, statement: &Quad) -> Result<bool> {
        let query = format!(
            "SELECT ?s WHERE {{ GRAPH {} {{ {} }} }} LIMIT 1",
            escape_iri(&self.graph),
            statement.to_triple_string()
        );
        Ok(!self.store.query(&query).await?.is_empty())
    }

    async fn write(&self, operation: &str, statements: &[Quad]) -> Result<()> {
        let triples = serialize_distinct(statements);
        if triples.is_empty() {
            return Ok(());
        }
        debug!(operation, graph = %self.graph, statements = triples.len(), "updating landing zone");
        for chunk in triples.chunks(self.batch_size) {
            let update = format!(
                "{} DATA {{\n  GRAPH {} {{\n    {}\n  }}\n}}",
                operation,
                escape_iri(&self.graph),
                chunk.join("\n    ")
            );
            self.store.update(&update).await?;
        }
        Ok(())
    }
}

/// The statements as SPARQL triples, without their graph, first occurrence kept.
fn serialize_distinct(statements: &[Quad]) -> Vec<String> {
    let mut seen = HashSet::new();
    statements
        .iter()
        .filter(|&quad| seen.insert(quad.triple_key()))
        .map(Quad::to_triple_string)
        .collect()
}
