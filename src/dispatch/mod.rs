//! What happens with the statements of a changeset once the landing zone is up to date.
//!
//! The strategy is picked by configuration:
//!
//! - [`SingleGraphDispatch`] copies the raw statements into one target graph
//! - [`CustomDispatch`] re-derives the target graph through the mapping rules
//! - [`NoOpDispatch`] does nothing; only the landing zone is maintained

use crate::core::{escape_iri, ChangeSide, Quad};
use crate::mapping::engine::MappingEngine;
use crate::querying::query_processing::SparqlStore;
use crate::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DispatchStrategy {
    #[default]
    SingleGraph,
    Custom,
    NoOp,
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Dispatch one side of a changeset. `context` holds the statements enrichment added.
    async fn dispatch(&self, side: ChangeSide, original: &[Quad], context: &[Quad]) -> Result<()>;

    /// Dispatch one batch of an initial sync dump.
    async fn dispatch_initial_batch(&self, statements: &[Quad]) -> Result<()>;

    /// Called once every dump batch was dispatched.
    async fn finish_initial_sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Writes statements with `INSERT DATA`/`DELETE DATA` into one graph, or into the graph each
/// statement came from when no target graph is configured.
pub struct SingleGraphDispatch {
    store: Arc<dyn SparqlStore>,
    target_graph: Option<String>,
    batch_size: usize,
}

impl SingleGraphDispatch {
    pub fn new(store: Arc<dyn SparqlStore>, target_graph: Option<String>, batch_size: usize) -> Self {
        Self { store, target_graph, batch_size: batch_size.max(1) }
    }

    async fn write(&self, operation: &str, statements: &[Quad]) -> Result<()> {
        let mut by_graph: BTreeMap<Option<&str>, Vec<String>> = BTreeMap::new();
        for quad in statements {
            let graph = self.target_graph.as_deref().or(quad.graph.as_deref());
            let triples = by_graph.entry(graph).or_default();
            let triple = quad.to_triple_string();
            if !triples.contains(&triple) {
                triples.push(triple);
            }
        }

        for (graph, triples) in by_graph {
            for chunk in triples.chunks(self.batch_size) {
                let body = chunk.join("\n    ");
                let update = match graph {
                    Some(graph) => format!(
                        "{} DATA {{\n  GRAPH {} {{\n    {}\n  }}\n}}",
                        operation,
                        escape_iri(graph),
                        body
                    ),
                    None => format!("{} DATA {{\n    {}\n}}", operation, body),
                };
                self.store.update(&update).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for SingleGraphDispatch {
    fn name(&self) -> &'static str {
        "single-graph"
    }

    async fn dispatch(&self, side: ChangeSide, original: &[Quad], _context: &[Quad]) -> Result<()> {
        if original.is_empty() {
            return Ok(());
        }
        debug!(?side, statements = original.len(), "dispatching to target graph");
        match side {
            ChangeSide::Deletes => self.write("DELETE", original).await,
            ChangeSide::Inserts => self.write("INSERT", original).await,
        }
    }

    async fn dispatch_initial_batch(&self, statements: &[Quad]) -> Result<()> {
        self.write("INSERT", statements).await
    }
}

/// Re-derives the target graph through the mapping rules.
///
/// Deletes are matched on the original statements only: a context statement matched with
/// full binding would retract derivations that still hold.
pub struct CustomDispatch {
    engine: Arc<MappingEngine>,
}

impl CustomDispatch {
    pub fn new(engine: Arc<MappingEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Dispatcher for CustomDispatch {
    fn name(&self) -> &'static str {
        "custom"
    }

    async fn dispatch(&self, side: ChangeSide, original: &[Quad], context: &[Quad]) -> Result<()> {
        match side {
            ChangeSide::Deletes => {
                self.engine.apply_deletes(original).await?;
            }
            ChangeSide::Inserts => {
                let statements: Vec<Quad> = original.iter().chain(context).cloned().collect();
                self.engine.apply_inserts(&statements).await?;
            }
        }
        Ok(())
    }

    async fn dispatch_initial_batch(&self, _statements: &[Quad]) -> Result<()> {
        // Batches only land in the landing zone; the rules run once the dump is complete.
        Ok(())
    }

    async fn finish_initial_sync(&self) -> Result<()> {
        let rules = self.engine.initial_mapping().await?;
        info!(rules, "initial mapping done");
        Ok(())
    }
}

pub struct NoOpDispatch;

#[async_trait]
impl Dispatcher for NoOpDispatch {
    fn name(&self) -> &'static str {
        "no-op"
    }

    async fn dispatch(&self, side: ChangeSide, original: &[Quad], _context: &[Quad]) -> Result<()> {
        debug!(?side, statements = original.len(), "no dispatch configured");
        Ok(())
    }

    async fn dispatch_initial_batch(&self, _statements: &[Quad]) -> Result<()> {
        Ok(())
    }
}
