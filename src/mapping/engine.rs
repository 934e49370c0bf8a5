//! Applies the updates matched for a batch of statements to the target store.

use crate::core::{ChangeSide, Quad};
use crate::mapping::matcher::{BindingPolicy, BoundUpdate, Matcher};
use crate::querying::query_processing::SparqlStore;
use crate::registry::rule_registry::RuleRegistry;
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// The rule-driven remapping engine.
///
/// The compiled updates read the landing-zone graph and write the target graph in a single
/// request, so `store` must reach both graphs.
pub struct MappingEngine {
    registry: Arc<RuleRegistry>,
    store: Arc<dyn SparqlStore>,
    matcher: Matcher,
}

impl MappingEngine {
    pub fn new(
        registry: Arc<RuleRegistry>,
        store: Arc<dyn SparqlStore>,
        insert_policy: BindingPolicy,
    ) -> Self {
        Self { registry, store, matcher: Matcher::new(insert_policy) }
    }

    /// The updates `statements` trigger, in statement order, without duplicates.
    pub fn plan(&self, statements: &[Quad], side: ChangeSide) -> Result<Vec<BoundUpdate>> {
        let rules = self.registry.rules()?;
        let mut seen = HashSet::new();
        let mut planned = Vec::new();
        for statement in statements {
            for update in self.matcher.match_quad(&rules, statement, side) {
                if seen.insert(update.sparql.clone()) {
                    planned.push(update);
                }
            }
        }
        Ok(planned)
    }

    /// Run the updates for `statements`. Returns the number of updates executed.
    pub async fn apply(&self, statements: &[Quad], side: ChangeSide) -> Result<usize> {
        let planned = self.plan(statements, side)?;
        for update in &planned {
            debug!(rule = %update.rule, kind = ?update.kind, "executing mapping update");
            self.store.update(&update.sparql).await?;
        }
        if !planned.is_empty() {
            info!(statements = statements.len(), updates = planned.len(), ?side, "remapped statements");
        }
        Ok(planned.len())
    }

    pub async fn apply_deletes(&self, statements: &[Quad]) -> Result<usize> {
        self.apply(statements, ChangeSide::Deletes).await
    }

    pub async fn apply_inserts(&self, statements: &[Quad]) -> Result<usize> {
        self.apply(statements, ChangeSide::Inserts).await
    }

    /// Run every rule's insert shape without bindings, deriving the target graph from the
    /// whole landing zone.
    pub async fn initial_mapping(&self) -> Result<usize> {
        let rules = self.registry.rules()?;
        for rule in rules.iter() {
            info!(rule = %rule.name, "running initial mapping");
            self.store.update(&rule.insert_shape.render(&[])).await?;
        }
        Ok(rules.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Term, RDF_TYPE};
    use crate::parsing::rule_parser::{RuleCompiler, RuleSource};
    use crate::querying::oxigraph_adapter::OxigraphStore;

    const LZ: &str = "http://ex.org/lz";
    const TARGET: &str = "http://ex.org/target";

    fn engine(store: Arc<OxigraphStore>) -> MappingEngine {
        let registry = RuleRegistry::from_sources(
            RuleCompiler::new(LZ, TARGET),
            vec![RuleSource::new(
                "human.rq",
                "PREFIX ex: <http://example.org/> CONSTRUCT { ?s a ex:Human } WHERE { ?s a ex:Person }",
            )],
        );
        MappingEngine::new(Arc::new(registry), store, BindingPolicy::SubjectOnly)
    }

    async fn count_humans(store: &OxigraphStore) -> usize {
        store
            .query(&format!(
                "SELECT ?s WHERE {{ GRAPH <{}> {{ ?s a <http://example.org/Human> }} }}",
                TARGET
            ))
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_duplicate_updates_are_planned_once() {
        let engine = engine(Arc::new(OxigraphStore::new().unwrap()));
        let statement =
            Quad::new("http://example.org/A", RDF_TYPE, Term::iri("http://example.org/Person"), None);
        let planned = engine.plan(&[statement.clone(), statement], ChangeSide::Inserts).unwrap();
        assert_eq!(planned.len(), 1);
    }

    #[tokio::test]
    async fn test_initial_mapping_derives_from_landing_zone() {
        let store = Arc::new(OxigraphStore::new().unwrap());
        store
            .update(&format!(
                "INSERT DATA {{ GRAPH <{}> {{ <http://example.org/A> a <http://example.org/Person> . <http://example.org/B> a <http://example.org/Person> }} }}",
                LZ
            ))
            .await
            .unwrap();

        let engine = engine(Arc::clone(&store));
        assert_eq!(engine.initial_mapping().await.unwrap(), 1);
        assert_eq!(count_humans(&store).await, 2);
    }
}
