//! SPARQL text encoding of terms and decoding of SPARQL-JSON terms.

use crate::core::{Literal, Quad, Term, XSD_STRING};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A term in the `application/sparql-results+json` shape, which is also the shape producers
/// use inside delta files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparqlJsonTerm {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(default, alias = "xml:lang", skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

#[derive(Debug, Error)]
#[error("unsupported term type '{kind}' for value '{value}'")]
pub struct UnsupportedTerm {
    pub kind: String,
    pub value: String,
}

impl TryFrom<SparqlJsonTerm> for Term {
    type Error = UnsupportedTerm;

    fn try_from(term: SparqlJsonTerm) -> Result<Self, Self::Error> {
        match term.kind.as_str() {
            "uri" => Ok(Term::Iri(term.value)),
            "literal" | "typed-literal" => Ok(Term::Literal(Literal {
                value: term.value,
                datatype: term.datatype,
                language: term.lang.filter(|lang| !lang.is_empty()),
            })),
            _ => Err(UnsupportedTerm { kind: term.kind, value: term.value }),
        }
    }
}

/// Encode a string as a SPARQL string literal, quotes included.
pub fn escape_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('"');
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped.push('"');
    escaped
}

/// Encode an IRI as a SPARQL IRIREF. Characters not allowed inside `<...>` are written as
/// `\uXXXX` escapes.
pub fn escape_iri(iri: &str) -> String {
    let mut escaped = String::with_capacity(iri.len() + 2);
    escaped.push('<');
    for c in iri.chars() {
        if matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\') || c <= ' ' {
            escaped.push_str(&format!("\\u{:04X}", c as u32));
        } else {
            escaped.push(c);
        }
    }
    escaped.push('>');
    escaped
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // xsd:string is written as a plain literal; both denote the same value.
        match (&self.language, &self.datatype) {
            (Some(language), _) => write!(f, "{}@{}", escape_string(&self.value), language),
            (None, Some(datatype)) if datatype != XSD_STRING => {
                write!(f, "{}^^{}", escape_string(&self.value), escape_iri(datatype))
            }
            _ => f.write_str(&escape_string(&self.value)),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => f.write_str(&escape_iri(iri)),
            Term::Literal(literal) => literal.fmt(f),
        }
    }
}

impl Quad {
    /// The statement as a SPARQL triple, terminated by ` .`.
    pub fn to_triple_string(&self) -> String {
        format!("{} {} {} .", escape_iri(&self.subject), escape_iri(&self.predicate), self.object)
    }
}
