mod common;

use common::*;
use delta_consumer::core::{ChangeSet, Literal, Quad, Term, RDF_TYPE};
use delta_consumer::dispatch::CustomDispatch;
use delta_consumer::execution::DeltaPipeline;
use delta_consumer::mapping::{BindingPolicy, MappingEngine};
use delta_consumer::parsing::{RuleCompiler, RuleSource};
use delta_consumer::querying::oxigraph_adapter::OxigraphStore;
use delta_consumer::registry::RuleRegistry;
use delta_consumer::storage::LandingZone;
use std::sync::Arc;

const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";

const RULES: &[(&str, &str)] = &[
    (
        "human.rq",
        "PREFIX ex: <http://example.org/> CONSTRUCT { ?s a ex:Human } WHERE { ?s a ex:Person }",
    ),
    (
        "label.rq",
        "PREFIX ex: <http://example.org/>
CONSTRUCT { ?s ex:label ?name } WHERE { ?s a ex:Person ; ex:name ?name }",
    ),
    (
        "adult.rq",
        "PREFIX ex: <http://example.org/>
PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>
CONSTRUCT { ?s a ex:Adult } WHERE { ?s ex:age \"18\"^^xsd:integer }",
    ),
    (
        "greeting.rq",
        "PREFIX ex: <http://example.org/>
CONSTRUCT { ?s ex:greets ex:English } WHERE { ?s ex:says \"hello\"@en }",
    ),
];

fn pipeline(store: &Arc<OxigraphStore>) -> DeltaPipeline {
    let sources = RULES.iter().map(|(name, text)| RuleSource::new(*name, *text)).collect();
    let registry = RuleRegistry::from_sources(RuleCompiler::new(LZ_GRAPH, TARGET_GRAPH), sources);
    let engine = MappingEngine::new(Arc::new(registry), store.clone(), BindingPolicy::SubjectOnly);
    DeltaPipeline::new(
        Arc::new(CustomDispatch::new(Arc::new(engine))),
        Some(LandingZone::new(store.clone(), LZ_GRAPH)),
        None,
    )
}

fn person(subject: &str) -> Quad {
    Quad::new(ex(subject), RDF_TYPE, Term::iri(ex("Person")), None)
}

async fn target_has(store: &OxigraphStore, triple: &str) -> bool {
    graph_contains(store, TARGET_GRAPH, triple).await
}

#[tokio::test]
async fn test_landing_zone_insert_is_idempotent() {
    let store = new_store();
    let landing_zone = LandingZone::new(store.clone(), LZ_GRAPH).with_batch_size(1);
    let name = quad("A", "name", Term::literal("Alice"));

    landing_zone.insert(&[name.clone(), name.clone()]).await.unwrap();
    landing_zone.insert(&[name.clone()]).await.unwrap();
    assert_eq!(landing_zone.count().await.unwrap(), 1);

    landing_zone.delete(&[quad("A", "name", Term::literal("Bob"))]).await.unwrap();
    assert_eq!(landing_zone.count().await.unwrap(), 1, "deleting an absent statement is a no-op");

    landing_zone.delete(&[name.clone()]).await.unwrap();
    assert!(!landing_zone.contains(&name).await.unwrap());
}

#[tokio::test]
async fn test_deleted_source_statement_retracts_derivation() {
    let store = new_store();
    let pipeline = pipeline(&store);
    let name = quad("A", "name", Term::literal("Alice"));

    pipeline.process_message(&inserts(vec![person("A"), name.clone()])).await.unwrap();
    assert!(target_has(&store, "<http://example.org/A> a <http://example.org/Human>").await);
    assert!(target_has(&store, "<http://example.org/A> <http://example.org/label> \"Alice\"").await);

    pipeline.process_message(&deletes(vec![name])).await.unwrap();
    assert!(
        !target_has(&store, "<http://example.org/A> <http://example.org/label> ?label").await,
        "the label goes with the name"
    );
    assert!(target_has(&store, "<http://example.org/A> a <http://example.org/Human>").await);
}

#[tokio::test]
async fn test_deleted_type_retracts_every_dependent_derivation() {
    let store = new_store();
    let pipeline = pipeline(&store);

    pipeline
        .process_message(&inserts(vec![person("A"), quad("A", "name", Term::literal("Alice"))]))
        .await
        .unwrap();
    pipeline.process_message(&deletes(vec![person("A")])).await.unwrap();

    assert_eq!(count_in_graph(&store, TARGET_GRAPH).await, 0);
    assert_eq!(count_in_graph(&store, LZ_GRAPH).await, 1, "the name stays mirrored");
}

#[tokio::test]
async fn test_delete_only_retracts_the_matching_value() {
    let store = new_store();
    let pipeline = pipeline(&store);

    pipeline
        .process_message(&inserts(vec![
            person("A"),
            quad("A", "name", Term::literal("Alice")),
            quad("A", "name", Term::literal("Ally")),
        ]))
        .await
        .unwrap();
    pipeline
        .process_message(&deletes(vec![quad("A", "name", Term::literal("Ally"))]))
        .await
        .unwrap();

    assert!(target_has(&store, "<http://example.org/A> <http://example.org/label> \"Alice\"").await);
    assert!(!target_has(&store, "<http://example.org/A> <http://example.org/label> \"Ally\"").await);
}

#[tokio::test]
async fn test_literal_patterns_respect_datatype_and_language() {
    let store = new_store();
    let pipeline = pipeline(&store);

    let changeset = ChangeSet {
        inserts: vec![
            quad("A", "age", Term::Literal(Literal::typed("18", XSD_INTEGER))),
            quad("B", "age", Term::literal("18")),
            quad("C", "says", Term::Literal(Literal::language_tagged("hello", "en"))),
            quad("D", "says", Term::Literal(Literal::language_tagged("hello", "nl"))),
            quad("E", "says", Term::literal("hello")),
        ],
        deletes: vec![],
    };
    pipeline.process_message(&vec![changeset]).await.unwrap();

    assert!(target_has(&store, "<http://example.org/A> a <http://example.org/Adult>").await);
    assert!(!target_has(&store, "<http://example.org/B> ?p ?o").await, "a plain string is not an integer");
    assert!(target_has(&store, "<http://example.org/C> <http://example.org/greets> ?o").await);
    assert!(!target_has(&store, "<http://example.org/D> ?p ?o").await, "the language must agree");
    assert!(!target_has(&store, "<http://example.org/E> ?p ?o").await);
}

#[tokio::test]
async fn test_unmatched_statements_only_reach_the_landing_zone() {
    let store = new_store();
    let pipeline = pipeline(&store);

    let processed = pipeline
        .process_message(&inserts(vec![quad("A", "unmapped", Term::literal("x"))]))
        .await
        .unwrap();

    assert_eq!(processed.inserts, 1);
    assert_eq!(count_in_graph(&store, LZ_GRAPH).await, 1);
    assert_eq!(count_in_graph(&store, TARGET_GRAPH).await, 0);
}
