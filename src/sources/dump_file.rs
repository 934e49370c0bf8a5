//! Producer dumps: a Turtle snapshot of the whole dataset, used by the initial sync.

use crate::core::{Literal, Quad, Term, XSD_STRING};
use crate::sources::delta_source::DeltaFile;
use crate::sources::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{NamedOrBlankNode, Term as OxTerm};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// The latest dump distribution the producer published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpFile {
    pub id: String,
    pub name: String,
    /// Release date of the dataset; delta files after it are still to be consumed.
    pub created: DateTime<Utc>,
}

/// The dump as a checkpoint: delta files are consumed from its release date on.
impl From<&DumpFile> for DeltaFile {
    fn from(dump: &DumpFile) -> Self {
        DeltaFile { id: dump.id.clone(), name: dump.name.clone(), created: dump.created, format: None }
    }
}

#[async_trait]
pub trait DumpSource: Send + Sync {
    /// The most recent dump, if the producer published one.
    async fn latest_dump(&self) -> Result<Option<DumpFile>, SourceError>;

    /// Download `dump` and return where it was stored.
    async fn download_dump(&self, dump: &DumpFile) -> Result<PathBuf, SourceError>;
}

/// Parse the Turtle file at `path` on a blocking thread and receive its statements in
/// batches of `batch_size`.
///
/// Statements with blank nodes are skipped. A parse error ends the stream with an `Err`.
pub fn stream_dump(path: PathBuf, batch_size: usize) -> mpsc::Receiver<Result<Vec<Quad>, SourceError>> {
    let (tx, rx) = mpsc::channel(2);
    let batch_size = batch_size.max(1);

    tokio::task::spawn_blocking(move || {
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                let _ = tx.blocking_send(Err(SourceError::Io(e)));
                return;
            }
        };

        let mut batch = Vec::with_capacity(batch_size);
        let mut skipped = 0usize;
        let mut total = 0usize;
        for parsed in RdfParser::from_format(RdfFormat::Turtle).for_reader(BufReader::new(file)) {
            let quad = match parsed {
                Ok(quad) => quad,
                Err(e) => {
                    let _ = tx.blocking_send(Err(SourceError::Rdf(e.to_string())));
                    return;
                }
            };
            match convert_quad(&quad) {
                Some(quad) => batch.push(quad),
                None => skipped += 1,
            }
            if batch.len() == batch_size {
                total += batch.len();
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                if tx.blocking_send(Ok(full)).is_err() {
                    return;
                }
            }
        }
        total += batch.len();
        if !batch.is_empty() {
            let _ = tx.blocking_send(Ok(batch));
        }
        if skipped > 0 {
            warn!(skipped, path = %path.display(), "skipped dump statements with blank nodes");
        }
        info!(statements = total, path = %path.display(), "parsed dump");
    });

    rx
}

fn convert_quad(quad: &oxigraph::model::Quad) -> Option<Quad> {
    let subject = match &quad.subject {
        NamedOrBlankNode::NamedNode(node) => node.as_str().to_string(),
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    let object = match &quad.object {
        OxTerm::NamedNode(node) => Term::Iri(node.as_str().to_string()),
        OxTerm::Literal(literal) => {
            let language = literal.language().map(str::to_string);
            // Producers write xsd:string explicitly; it is the default datatype.
            let datatype = Some(literal.datatype().as_str())
                .filter(|dt| language.is_none() && *dt != XSD_STRING)
                .map(str::to_string);
            Term::Literal(Literal { value: literal.value().to_string(), datatype, language })
        }
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(Quad::new(subject, quad.predicate.as_str(), object, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_dump_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.ttl");
        std::fs::write(
            &path,
            r#"@prefix ex: <http://example.org/> .
            ex:A a ex:Person ; ex:name "Alice" ; ex:label "A"@en .
            ex:B a ex:Person ; ex:knows [ ex:name "anonymous" ] .
            "#,
        )
        .unwrap();

        let mut rx = stream_dump(path, 2);
        let mut batches = Vec::new();
        while let Some(batch) = rx.recv().await {
            batches.push(batch.unwrap());
        }
        let total: usize = batches.iter().map(Vec::len).sum();
        assert_eq!(total, 4, "statements with blank nodes are skipped");
        assert!(batches.iter().all(|b| b.len() <= 2));
        assert!(batches
            .iter()
            .flatten()
            .any(|q| q.object == Term::Literal(Literal::simple("Alice"))));
    }

    #[tokio::test]
    async fn test_stream_dump_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttl");
        std::fs::write(&path, "<http://ex.org/a> <http://ex.org/p> .").unwrap();

        let mut rx = stream_dump(path, 10);
        let mut saw_error = false;
        while let Some(batch) = rx.recv().await {
            saw_error |= batch.is_err();
        }
        assert!(saw_error);
    }
}
