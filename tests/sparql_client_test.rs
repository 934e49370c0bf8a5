use delta_consumer::core::{Literal, Term};
use delta_consumer::querying::query_processing::{SparqlStore, StoreError};
use delta_consumer::querying::retry::{RetryPolicy, RetryingStore};
use delta_consumer::querying::sparql_client::SparqlClient;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint(server: &MockServer) -> String {
    format!("{}/sparql", server.uri())
}

#[tokio::test]
async fn test_query_decodes_json_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sparql"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("query="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "head": {"vars": ["s", "label", "age", "node"]},
            "results": {"bindings": [{
                "s": {"type": "uri", "value": "http://example.org/A"},
                "label": {"type": "literal", "value": "Alice", "xml:lang": "en"},
                "age": {"type": "typed-literal", "value": "3",
                        "datatype": "http://www.w3.org/2001/XMLSchema#integer"},
                "node": {"type": "bnode", "value": "b0"}
            }]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SparqlClient::new(endpoint(&server)).unwrap();
    let bindings = client.query("SELECT * WHERE { ?s ?p ?o }").await.unwrap();

    assert_eq!(bindings.len(), 1);
    let row = &bindings[0];
    assert_eq!(row.get("s"), Some(&Term::iri("http://example.org/A")));
    assert_eq!(row.get("label"), Some(&Term::Literal(Literal::language_tagged("Alice", "en"))));
    assert_eq!(
        row.get("age"),
        Some(&Term::Literal(Literal::typed("3", "http://www.w3.org/2001/XMLSchema#integer")))
    );
    assert!(row.get("node").is_none(), "blank nodes are dropped from bindings");
}

#[tokio::test]
async fn test_update_is_sent_as_form_with_extra_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sparql"))
        .and(header("mu-auth-sudo", "true"))
        .and(body_string_contains("update=INSERT"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = SparqlClient::new(endpoint(&server)).unwrap().with_header("mu-auth-sudo", "true").unwrap();
    client
        .update("INSERT DATA { <http://example.org/A> <http://example.org/p> 1 }")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_error_status_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sparql"))
        .respond_with(ResponseTemplate::new(400).set_body_string("syntax error"))
        .mount(&server)
        .await;

    let client = SparqlClient::new(endpoint(&server)).unwrap();
    let err = client.update("INSERT DATA {").await.unwrap_err();

    assert_eq!(err.to_string(), "store responded with status 400: syntax error");
    assert!(!err.is_transient(), "a rejected update will not succeed on retry");
}

#[tokio::test]
async fn test_retrying_client_recovers_from_unavailable_store() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sparql"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sparql"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client: Arc<dyn SparqlStore> = Arc::new(SparqlClient::new(endpoint(&server)).unwrap());
    let store = RetryingStore::new(client, RetryPolicy::new(3, Duration::ZERO));
    store
        .update("INSERT DATA { <http://example.org/A> <http://example.org/p> 1 }")
        .await
        .expect("the third attempt succeeds");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transient() {
    let client = SparqlClient::with_timeout("http://127.0.0.1:1/sparql", Duration::from_secs(2)).unwrap();
    let err = client.query("ASK {}").await.unwrap_err();
    assert!(matches!(err, StoreError::Http(_)), "got {:?}", err);
    assert!(err.is_transient());
}
