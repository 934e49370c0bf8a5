//! Core data structures for the delta consumer.
//!
//! A delta file carries a [`DeltaMessage`]: an ordered list of [`ChangeSet`]s, each holding
//! the quads that were inserted and deleted at the producer. Everything downstream (landing
//! zone, type context, mapping rules, dispatching) works on these types.

use std::hash::{Hash, Hasher};

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// An RDF literal.
///
/// A literal without datatype and language is an `xsd:string`; a literal with a language
/// is an `rdf:langString`. Equality and hashing use these defaulted datatypes, so
/// `"a"` and `"a"^^xsd:string` are the same literal.
#[derive(Debug, Clone, Eq)]
pub struct Literal {
    pub value: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl Literal {
    pub fn simple(value: impl Into<String>) -> Self {
        Self { value: value.into(), datatype: None, language: None }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self { value: value.into(), datatype: Some(datatype.into()), language: None }
    }

    pub fn language_tagged(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self { value: value.into(), datatype: None, language: Some(language.into()) }
    }

    /// The datatype after defaulting: explicit datatype, else `rdf:langString` when a
    /// language is present, else `xsd:string`.
    pub fn effective_datatype(&self) -> &str {
        match (&self.datatype, &self.language) {
            (Some(datatype), _) => datatype,
            (None, Some(_)) => RDF_LANG_STRING,
            (None, None) => XSD_STRING,
        }
    }

    /// The language tag, with an absent tag read as the empty string.
    pub fn language_or_empty(&self) -> &str {
        self.language.as_deref().unwrap_or("")
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.effective_datatype() == other.effective_datatype()
            && self.language_or_empty() == other.language_or_empty()
    }
}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
        self.effective_datatype().hash(state);
        self.language_or_empty().hash(state);
    }
}

/// An RDF term in object position. Subjects, predicates and graphs are always IRIs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Iri(String),
    Literal(Literal),
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(value.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal(Literal::simple(value))
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            Term::Literal(_) => None,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Term::Iri(iri) => iri,
            Term::Literal(literal) => &literal.value,
        }
    }
}

/// One RDF statement as published in a delta file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Quad {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
    /// `None` means the default graph.
    pub graph: Option<String>,
}

impl Quad {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: Term,
        graph: Option<String>,
    ) -> Self {
        Self { subject: subject.into(), predicate: predicate.into(), object, graph }
    }

    pub fn is_type_statement(&self) -> bool {
        self.predicate == RDF_TYPE
    }

    /// The statement without its graph, used to deduplicate triples.
    pub fn triple_key(&self) -> (&str, &str, &Term) {
        (&self.subject, &self.predicate, &self.object)
    }

    pub fn in_graph(&self, graph: Option<&str>) -> Self {
        Self { graph: graph.map(str::to_string), ..self.clone() }
    }
}

/// The statements removed and added by one producer change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub inserts: Vec<Quad>,
    pub deletes: Vec<Quad>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }
}

/// The ordered changesets of one delta file.
pub type DeltaMessage = Vec<ChangeSet>;

/// Which side of a changeset a batch of statements comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeSide {
    Inserts,
    Deletes,
}

pub mod encoding;
pub use encoding::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_literal_equals_xsd_string() {
        assert_eq!(Literal::simple("x"), Literal::typed("x", XSD_STRING));
        assert_ne!(Literal::simple("x"), Literal::language_tagged("x", "en"));
        assert_ne!(Literal::simple("1"), Literal::typed("1", "http://www.w3.org/2001/XMLSchema#integer"));
    }

    #[test]
    fn test_effective_datatype() {
        assert_eq!(Literal::simple("x").effective_datatype(), XSD_STRING);
        assert_eq!(Literal::language_tagged("x", "nl").effective_datatype(), RDF_LANG_STRING);
    }
}
