use delta_consumer::core::Term;
use delta_consumer::sources::{DeltaSource, DumpSource, ProducerClient, ProducerConfig, SourceError};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use std::io::Write;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAYLOAD: &str = r#"[{
  "inserts": [
    {"subject": {"type": "uri", "value": "http://example.org/A"},
     "predicate": {"type": "uri", "value": "http://example.org/name"},
     "object": {"type": "literal", "value": "Alice"}}
  ],
  "deletes": []
}]"#;

fn config(server: &MockServer, folder: &TempDir) -> ProducerConfig {
    ProducerConfig {
        base_url: server.uri(),
        delta_file_folder: folder.path().join("deltas"),
        dump_file_folder: folder.path().join("dumps"),
        ..ProducerConfig::default()
    }
}

fn files_body() -> serde_json::Value {
    json!({
        "data": [
            {"id": "f3", "attributes": {"name": "f3.json", "created": "2024-03-02T12:00:00.000Z"}},
            {"id": "f1", "attributes": {"name": "f1.json", "created": "2024-03-01T09:00:00.000Z"}},
            {"id": "f2", "attributes": {"name": "f2.json", "created": "2024-03-02T10:00:00.000Z",
                                        "format": "application/gzip"}}
        ]
    })
}

fn since() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339("2024-03-01T09:00:00Z").unwrap().with_timezone(&chrono::Utc)
}

#[tokio::test]
async fn test_files_since_filters_and_orders() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sync/files"))
        .and(query_param("since", "2024-03-01T09:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(files_body()))
        .expect(1)
        .mount(&server)
        .await;

    let folder = tempfile::tempdir().unwrap();
    let client = ProducerClient::new(config(&server, &folder)).unwrap();
    let files = client.files_since(since()).await.unwrap();

    let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["f2.json", "f3.json"], "a file created at the checkpoint is not consumed again");
    assert!(files[0].is_gzip());
    assert!(!files[1].is_gzip());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sync/files"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let folder = tempfile::tempdir().unwrap();
    let client = ProducerClient::new(config(&server, &folder)).unwrap();
    let err = client.files_since(since()).await.unwrap_err();

    assert!(matches!(err, SourceError::Status { status: 502, .. }), "got {:?}", err);
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_load_decodes_and_discards_the_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/f1/download"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAYLOAD))
        .mount(&server)
        .await;

    let folder = tempfile::tempdir().unwrap();
    let client = ProducerClient::new(config(&server, &folder)).unwrap();
    let file = client_file("f1", "f1.json", None);

    let message = client.load(&file).await.unwrap();
    assert_eq!(message.len(), 1);
    assert_eq!(message[0].inserts[0].object, Term::literal("Alice"));
    assert!(!folder.path().join("deltas").join("f1.json").exists());
    assert!(!folder.path().join("deltas").join(file.day_folder()).exists());
}

#[tokio::test]
async fn test_load_rejects_names_outside_the_folder() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/f1/download"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAYLOAD))
        .expect(0)
        .mount(&server)
        .await;

    let folder = tempfile::tempdir().unwrap();
    let outside = folder.path().join("outside.json");
    std::fs::write(&outside, "untouched").unwrap();
    let mut config = config(&server, &folder);
    config.keep_delta_files = true;
    let client = ProducerClient::new(config).unwrap();

    let absolute = outside.to_string_lossy().into_owned();
    for name in [absolute.as_str(), "../outside.json", "nested/f1.json", ".."] {
        let err = client.load(&client_file("f1", name, None)).await.unwrap_err();
        assert!(matches!(err, SourceError::UnsafeFileName(_)), "{}: got {:?}", name, err);
        client
            .remove_file(&client_file("f1", name, None))
            .await
            .expect("an unsafe name has nothing kept to remove");
    }
    assert_eq!(std::fs::read_to_string(&outside).unwrap(), "untouched");
}

#[tokio::test]
async fn test_malformed_payload_does_not_leave_the_download_behind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/f1/download"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let folder = tempfile::tempdir().unwrap();
    let client = ProducerClient::new(config(&server, &folder)).unwrap();

    let err = client.load(&client_file("f1", "f1.json", None)).await.unwrap_err();
    assert!(matches!(err, SourceError::Payload(_)), "got {:?}", err);
    assert!(!folder.path().join("deltas").join("f1.json").exists());
}

#[tokio::test]
async fn test_load_gzip_and_keep_in_day_folder() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(PAYLOAD.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/f2/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(compressed))
        .mount(&server)
        .await;

    let folder = tempfile::tempdir().unwrap();
    let mut config = config(&server, &folder);
    config.keep_delta_files = true;
    let client = ProducerClient::new(config).unwrap();
    let file = client_file("f2", "f2.json", Some("application/gzip"));

    let message = client.load(&file).await.unwrap();
    assert_eq!(message[0].inserts.len(), 1);

    let kept = folder.path().join("deltas").join("2024-03-02").join("f2.json");
    assert!(kept.exists(), "kept files are grouped by creation day");
    assert!(!folder.path().join("deltas").join("f2.json").exists());

    client.remove_file(&file).await.unwrap();
    assert!(!kept.exists());
    client.remove_file(&file).await.expect("removing twice is not an error");
}

#[tokio::test]
async fn test_login_cookie_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/login"))
        .and(header("key", "s3cret"))
        .respond_with(ResponseTemplate::new(201).insert_header("set-cookie", "proxy_session=abc; Path=/"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sync/files"))
        .and(header("cookie", "proxy_session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(files_body()))
        .expect(2)
        .mount(&server)
        .await;

    let folder = tempfile::tempdir().unwrap();
    let mut config = config(&server, &folder);
    config.login_endpoint = Some(format!("{}/sync/login", server.uri()));
    config.secret_key = Some("s3cret".to_string());
    let client = ProducerClient::new(config).unwrap();

    assert_eq!(client.files_since(since()).await.unwrap().len(), 2);
    assert_eq!(client.files_since(since()).await.unwrap().len(), 2, "the session is reused");
}

#[tokio::test]
async fn test_rejected_session_logs_in_again() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/login"))
        .respond_with(ResponseTemplate::new(201).insert_header("set-cookie", "proxy_session=abc; Path=/"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sync/files"))
        .respond_with(ResponseTemplate::new(400))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sync/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(files_body()))
        .mount(&server)
        .await;

    let folder = tempfile::tempdir().unwrap();
    let mut config = config(&server, &folder);
    config.login_endpoint = Some(format!("{}/sync/login", server.uri()));
    config.secret_key = Some("s3cret".to_string());
    let client = ProducerClient::new(config).unwrap();

    assert_eq!(client.files_since(since()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_login_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let folder = tempfile::tempdir().unwrap();
    let mut config = config(&server, &folder);
    config.login_endpoint = Some(format!("{}/sync/login", server.uri()));
    config.secret_key = Some("wrong".to_string());
    let client = ProducerClient::new(config).unwrap();

    let err = client.files_since(since()).await.unwrap_err();
    assert!(matches!(err, SourceError::Login(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_latest_dump_follows_the_distribution() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/datasets"))
        .and(query_param("filter[subject]", "http://example.org/dataset"))
        .and(query_param("filter[:has-no:next-version]", "yes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "attributes": {"release-date": "2024-03-05T06:00:00Z", "title": "Nightly dump"},
                "relationships": {"distributions": {"links": {"related": "/datasets/d1/distributions"}}}
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/datasets/d1/distributions"))
        .and(query_param("include", "subject"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"relationships": {"subject": {"data": {"type": "files", "id": "file-9"}}}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/file-9/download"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<http://example.org/A> a <http://example.org/Person> ."))
        .mount(&server)
        .await;

    let folder = tempfile::tempdir().unwrap();
    let mut config = config(&server, &folder);
    config.dataset_subject = Some("http://example.org/dataset".to_string());
    let client = ProducerClient::new(config).unwrap();

    let dump = client.latest_dump().await.unwrap().expect("a dump is published");
    assert_eq!(dump.id, "file-9");
    assert_eq!(dump.name, "Nightly dump");
    assert_eq!(dump.created.to_rfc3339(), "2024-03-05T06:00:00+00:00");

    let downloaded = client.download_dump(&dump).await.unwrap();
    assert_eq!(downloaded, folder.path().join("dumps").join("file-9.ttl"));
    assert!(std::fs::read_to_string(downloaded).unwrap().contains("Person"));
}

#[tokio::test]
async fn test_no_dataset_means_no_dump() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/datasets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let folder = tempfile::tempdir().unwrap();
    let client = ProducerClient::new(config(&server, &folder)).unwrap();
    assert_eq!(client.latest_dump().await.unwrap(), None);
}

fn client_file(id: &str, name: &str, format: Option<&str>) -> delta_consumer::sources::DeltaFile {
    delta_consumer::sources::DeltaFile {
        id: id.to_string(),
        name: name.to_string(),
        created: chrono::DateTime::parse_from_rfc3339("2024-03-02T10:00:00Z").unwrap().with_timezone(&chrono::Utc),
        format: format.map(str::to_string),
    }
}
