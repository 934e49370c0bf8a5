//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use delta_consumer::config::ConsumerConfig;
use delta_consumer::core::{ChangeSet, DeltaMessage, Quad, Term};
use delta_consumer::querying::query_processing::{Binding, SparqlStore, StoreError};
use delta_consumer::querying::oxigraph_adapter::OxigraphStore;
use delta_consumer::sources::{DeltaFile, DeltaSource, DumpFile, DumpSource, SourceError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const EX: &str = "http://example.org/";
pub const LZ_GRAPH: &str = "http://example.org/graphs/landing-zone";
pub const TARGET_GRAPH: &str = "http://example.org/graphs/target";
pub const JOBS_GRAPH: &str = "http://example.org/graphs/jobs";

pub fn ex(local: &str) -> String {
    format!("{}{}", EX, local)
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

pub fn quad(s: &str, p: &str, o: Term) -> Quad {
    Quad::new(ex(s), ex(p), o, None)
}

pub fn inserts(statements: Vec<Quad>) -> DeltaMessage {
    vec![ChangeSet { inserts: statements, deletes: vec![] }]
}

pub fn deletes(statements: Vec<Quad>) -> DeltaMessage {
    vec![ChangeSet { inserts: vec![], deletes: statements }]
}

pub fn delta_file(name: &str, created: DateTime<Utc>) -> DeltaFile {
    DeltaFile { id: format!("id-{}", name), name: name.to_string(), created, format: None }
}

/// Configuration against the shared fixtures; nothing is read from the network.
pub fn test_config() -> ConsumerConfig {
    let mut config = ConsumerConfig::default();
    config.jobs_graph = JOBS_GRAPH.to_string();
    config.landing_zone_graph = LZ_GRAPH.to_string();
    config.target_graph = Some(TARGET_GRAPH.to_string());
    config.wait_for_initial_sync = false;
    config.start_from_delta_timestamp = Some(at(1, 0));
    config
}

pub fn new_store() -> Arc<OxigraphStore> {
    Arc::new(OxigraphStore::new().unwrap())
}

pub async fn count_in_graph(store: &OxigraphStore, graph: &str) -> usize {
    store
        .query(&format!("SELECT * WHERE {{ GRAPH <{}> {{ ?s ?p ?o }} }}", graph))
        .await
        .unwrap()
        .len()
}

pub async fn graph_contains(store: &OxigraphStore, graph: &str, triple: &str) -> bool {
    !store
        .query(&format!("SELECT * WHERE {{ GRAPH <{}> {{ {} }} }}", graph, triple))
        .await
        .unwrap()
        .is_empty()
}

/// Delta files served from memory. A file without a message fails to load.
#[derive(Default)]
pub struct MockDeltaSource {
    files: Mutex<Vec<(DeltaFile, Option<DeltaMessage>)>>,
    pub loaded: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
}

impl MockDeltaSource {
    pub fn publish(&self, file: DeltaFile, message: DeltaMessage) {
        self.files.lock().unwrap().push((file, Some(message)));
    }

    pub fn publish_broken(&self, file: DeltaFile) {
        self.files.lock().unwrap().push((file, None));
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeltaSource for MockDeltaSource {
    async fn files_since(&self, since: DateTime<Utc>) -> Result<Vec<DeltaFile>, SourceError> {
        let files = self.files.lock().unwrap().iter().map(|(file, _)| file.clone()).collect();
        Ok(delta_consumer::sources::delta_source::unconsumed(files, since))
    }

    async fn load(&self, file: &DeltaFile) -> Result<DeltaMessage, SourceError> {
        self.loaded.lock().unwrap().push(file.name.clone());
        let files = self.files.lock().unwrap();
        match files.iter().find(|(candidate, _)| candidate == file) {
            Some((_, Some(message))) => Ok(message.clone()),
            _ => Err(SourceError::Decode(format!("cannot decode {}", file.name))),
        }
    }

    async fn remove_file(&self, file: &DeltaFile) -> Result<(), SourceError> {
        self.removed.lock().unwrap().push(file.name.clone());
        Ok(())
    }
}

/// A dump written to a temporary folder.
pub struct MockDumpSource {
    dump: Option<(DumpFile, String)>,
    dir: tempfile::TempDir,
}

impl MockDumpSource {
    pub fn new(dump: Option<(DumpFile, &str)>) -> Self {
        Self {
            dump: dump.map(|(file, turtle)| (file, turtle.to_string())),
            dir: tempfile::tempdir().unwrap(),
        }
    }
}

#[async_trait]
impl DumpSource for MockDumpSource {
    async fn latest_dump(&self) -> Result<Option<DumpFile>, SourceError> {
        Ok(self.dump.as_ref().map(|(file, _)| file.clone()))
    }

    async fn download_dump(&self, dump: &DumpFile) -> Result<PathBuf, SourceError> {
        let (_, turtle) = self.dump.as_ref().ok_or_else(|| SourceError::Decode("no dump".into()))?;
        let path = self.dir.path().join(format!("{}.ttl", dump.id));
        std::fs::write(&path, turtle)?;
        Ok(path)
    }
}

/// Fails the first `failures` updates with a 503, then delegates.
pub struct FlakyStore {
    inner: Arc<dyn SparqlStore>,
    failures: u32,
    pub calls: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn SparqlStore>, failures: u32) -> Self {
        Self { inner, failures, calls: AtomicU32::new(0) }
    }
}

#[async_trait]
impl SparqlStore for FlakyStore {
    async fn query(&self, query: &str) -> Result<Vec<Binding>, StoreError> {
        self.inner.query(query).await
    }

    async fn update(&self, update: &str) -> Result<(), StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(StoreError::Status { status: 503, body: format!("unavailable ({})", call) });
        }
        self.inner.update(update).await
    }
}

pub fn bindings_to_map(bindings: &[Binding], key: &str, value: &str) -> HashMap<String, String> {
    bindings
        .iter()
        .filter_map(|b| Some((b.get(key)?.value().to_string(), b.get(value)?.value().to_string())))
        .collect()
}
