//! Decoding of delta file payloads into a [`DeltaMessage`].
//!
//! A delta file is a JSON array of changesets:
//!
//! ```json
//! [
//!   {
//!     "inserts": [{"subject": {"type": "uri", "value": "http://ex.org/a"},
//!                  "predicate": {"type": "uri", "value": "http://ex.org/name"},
//!                  "object": {"type": "literal", "value": "A", "xml:lang": "en"},
//!                  "graph": {"type": "uri", "value": "http://ex.org/g"}}],
//!     "deletes": []
//!   }
//! ]
//! ```
//!
//! The payload may be gzip compressed.

use crate::core::{ChangeSet, DeltaMessage, Quad, SparqlJsonTerm, Term};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::io::Read;
use thiserror::Error;
use tracing::warn;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum ChangesetError {
    #[error("could not decompress delta payload: {0}")]
    Gzip(#[from] std::io::Error),
    #[error("delta payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{position} must be an IRI, got {kind} '{value}'")]
    NotAnIri { position: &'static str, kind: String, value: String },
    #[error("unsupported object term type '{kind}' for value '{value}'")]
    UnsupportedObject { kind: String, value: String },
    #[error("invalid language tag '{tag}' on literal '{value}'")]
    InvalidLanguageTag { tag: String, value: String },
}

#[derive(Debug, Deserialize)]
struct RawChangeSet {
    #[serde(default)]
    inserts: Vec<RawQuad>,
    #[serde(default)]
    deletes: Vec<RawQuad>,
}

#[derive(Debug, Deserialize)]
struct RawQuad {
    subject: SparqlJsonTerm,
    predicate: SparqlJsonTerm,
    object: SparqlJsonTerm,
    #[serde(default)]
    graph: Option<SparqlJsonTerm>,
}

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Inflate `bytes` when they carry the gzip magic number, or return them unchanged.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, ChangesetError> {
    if !is_gzip(bytes) {
        return Ok(bytes.to_vec());
    }
    let mut inflated = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut inflated)?;
    Ok(inflated)
}

/// Decode a delta payload, gzip compressed or not.
///
/// Statements with a blank node in any position are skipped with a warning: they cannot be
/// matched against the landing zone across files.
pub fn parse_delta_message(bytes: &[u8]) -> Result<DeltaMessage, ChangesetError> {
    let payload = decompress(bytes)?;
    let raw: Vec<RawChangeSet> = serde_json::from_slice(&payload)?;

    raw.into_iter()
        .map(|changeset| {
            Ok(ChangeSet {
                inserts: convert_quads(changeset.inserts)?,
                deletes: convert_quads(changeset.deletes)?,
            })
        })
        .collect()
}

fn convert_quads(raw: Vec<RawQuad>) -> Result<Vec<Quad>, ChangesetError> {
    let mut quads = Vec::with_capacity(raw.len());
    for quad in raw {
        if let Some(quad) = convert_quad(quad)? {
            quads.push(quad);
        }
    }
    Ok(quads)
}

fn is_blank(term: &SparqlJsonTerm) -> bool {
    term.kind == "bnode"
}

/// `[A-Za-z]+(-[A-Za-z0-9]+)*`, the shape SPARQL accepts after `@`.
fn is_language_tag(tag: &str) -> bool {
    let mut subtags = tag.split('-');
    let primary = subtags.next().unwrap_or_default();
    !primary.is_empty()
        && primary.chars().all(|c| c.is_ascii_alphabetic())
        && subtags.all(|subtag| !subtag.is_empty() && subtag.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn expect_iri(position: &'static str, term: SparqlJsonTerm) -> Result<String, ChangesetError> {
    match term.kind.as_str() {
        "uri" => Ok(term.value),
        _ => Err(ChangesetError::NotAnIri { position, kind: term.kind, value: term.value }),
    }
}

fn convert_quad(raw: RawQuad) -> Result<Option<Quad>, ChangesetError> {
    let blank = is_blank(&raw.subject)
        || is_blank(&raw.object)
        || raw.graph.as_ref().is_some_and(is_blank);
    if blank {
        warn!(
            subject = %raw.subject.value,
            predicate = %raw.predicate.value,
            "skipping statement with a blank node"
        );
        return Ok(None);
    }

    let subject = expect_iri("subject", raw.subject)?;
    let predicate = expect_iri("predicate", raw.predicate)?;
    let graph = raw.graph.map(|g| expect_iri("graph", g)).transpose()?;
    let object = Term::try_from(raw.object)
        .map_err(|e| ChangesetError::UnsupportedObject { kind: e.kind, value: e.value })?;
    if let Term::Literal(literal) = &object {
        if let Some(tag) = literal.language.as_deref().filter(|tag| !is_language_tag(tag)) {
            return Err(ChangesetError::InvalidLanguageTag {
                tag: tag.to_string(),
                value: literal.value.clone(),
            });
        }
    }

    Ok(Some(Quad { subject, predicate, object, graph }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Literal;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const PAYLOAD: &str = r#"[
      {
        "inserts": [
          {"subject": {"type": "uri", "value": "http://ex.org/A"},
           "predicate": {"type": "uri", "value": "http://ex.org/name"},
           "object": {"type": "literal", "value": "Alice", "xml:lang": "en"},
           "graph": {"type": "uri", "value": "http://ex.org/g"}},
          {"subject": {"type": "bnode", "value": "b0"},
           "predicate": {"type": "uri", "value": "http://ex.org/name"},
           "object": {"type": "literal", "value": "ignored"}}
        ],
        "deletes": [
          {"subject": {"type": "uri", "value": "http://ex.org/A"},
           "predicate": {"type": "uri", "value": "http://ex.org/age"},
           "object": {"type": "typed-literal", "value": "3", "datatype": "http://www.w3.org/2001/XMLSchema#integer"}}
        ]
      },
      {"inserts": []}
    ]"#;

    #[test]
    fn test_parse_plain_payload() {
        let message = parse_delta_message(PAYLOAD.as_bytes()).unwrap();
        assert_eq!(message.len(), 2);
        assert_eq!(message[0].inserts.len(), 1, "blank node statement is skipped");
        assert_eq!(
            message[0].inserts[0].object,
            Term::Literal(Literal::language_tagged("Alice", "en"))
        );
        assert_eq!(message[0].inserts[0].graph.as_deref(), Some("http://ex.org/g"));
        assert_eq!(message[0].deletes[0].graph, None);
        assert!(message[1].is_empty());
    }

    #[test]
    fn test_parse_gzip_payload() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(PAYLOAD.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        assert!(is_gzip(&compressed));
        let message = parse_delta_message(&compressed).unwrap();
        assert_eq!(message.len(), 2);
    }

    #[test]
    fn test_literal_subject_is_rejected() {
        let payload = r#"[{"inserts": [{"subject": {"type": "literal", "value": "x"},
            "predicate": {"type": "uri", "value": "http://ex.org/p"},
            "object": {"type": "uri", "value": "http://ex.org/o"}}]}]"#;
        let err = parse_delta_message(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, ChangesetError::NotAnIri { position: "subject", .. }));
    }

    #[test]
    fn test_language_tags() {
        let payload = |tag: &str| {
            format!(
                r#"[{{"inserts": [{{"subject": {{"type": "uri", "value": "http://ex.org/A"}},
                "predicate": {{"type": "uri", "value": "http://ex.org/name"}},
                "object": {{"type": "literal", "value": "A", "xml:lang": "{}"}}}}]}}]"#,
                tag
            )
        };
        for tag in ["en", "en-GB", "zh-Hant-TW", "x-private1"] {
            assert!(parse_delta_message(payload(tag).as_bytes()).is_ok(), "{}", tag);
        }
        for tag in ["en }", "en-", "-en", "1en", "en_GB", "en . } INSERT"] {
            let err = parse_delta_message(payload(tag).as_bytes()).unwrap_err();
            assert!(matches!(err, ChangesetError::InvalidLanguageTag { .. }), "{}: got {:?}", tag, err);
        }

        let message = parse_delta_message(payload("").as_bytes()).unwrap();
        assert_eq!(message[0].inserts[0].object, Term::literal("A"), "an empty tag means no language");
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(matches!(parse_delta_message(b"{not json"), Err(ChangesetError::Json(_))));
    }
}
