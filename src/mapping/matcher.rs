//! Matching of one changed statement against the pattern triples of the compiled rules.
//!
//! A statement matches a pattern triple when every position is compatible:
//!
//! - a variable (or a blank node in the pattern) matches anything
//! - an IRI matches the same IRI
//! - a literal matches a literal with the same value when the languages agree (for a
//!   `rdf:langString` pattern) or the defaulted datatypes agree (for any other pattern)
//!
//! Every match produces a [`BoundUpdate`]: the rule's insert or delete shape restricted by a
//! `VALUES` row for the variables the [`BindingPolicy`] selects.

use crate::core::{ChangeSide, Literal, Quad, Term, RDF_LANG_STRING};
use crate::parsing::rule_parser::{MappingRule, PatternTerm, ShapeKind, TriplePattern};
use tracing::debug;

/// Which positions of an inserted statement are bound into the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingPolicy {
    /// Only the subject. The rule is re-evaluated for the whole subject, so derivations that
    /// need statements from earlier files are picked up as well.
    #[default]
    SubjectOnly,
    /// Subject, predicate and object.
    All,
}

/// One executable update derived from a match.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundUpdate {
    pub rule: String,
    pub kind: ShapeKind,
    pub bindings: Vec<(String, Term)>,
    pub sparql: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Subject,
    Predicate,
    Object,
}

pub struct Matcher {
    insert_policy: BindingPolicy,
}

impl Matcher {
    pub fn new(insert_policy: BindingPolicy) -> Self {
        Self { insert_policy }
    }

    /// All updates `quad` triggers on `side`. Deletes always bind every position.
    pub fn match_quad(&self, rules: &[MappingRule], quad: &Quad, side: ChangeSide) -> Vec<BoundUpdate> {
        let (policy, kind) = match side {
            ChangeSide::Inserts => (self.insert_policy, ShapeKind::Insert),
            ChangeSide::Deletes => (BindingPolicy::All, ShapeKind::Delete),
        };

        let mut updates = Vec::new();
        for rule in rules {
            for pattern in &rule.pattern_triples {
                let Some(bindings) = bind_triple(pattern, quad, policy) else {
                    continue;
                };
                let shape = match kind {
                    ShapeKind::Insert => &rule.insert_shape,
                    ShapeKind::Delete => &rule.delete_shape,
                };
                updates.push(BoundUpdate {
                    rule: rule.name.clone(),
                    kind,
                    sparql: shape.render(&bindings),
                    bindings,
                });
            }
        }

        if updates.is_empty() {
            debug!(statement = %quad.to_triple_string(), ?side, "no mapping rule matches");
        }
        updates
    }
}

/// Whether a pattern literal accepts an incoming literal.
pub fn literal_matches(pattern: &Literal, value: &Literal) -> bool {
    if pattern.value != value.value {
        return false;
    }
    if pattern.effective_datatype() == RDF_LANG_STRING {
        pattern.language_or_empty() == value.language_or_empty()
    } else {
        pattern.effective_datatype() == value.effective_datatype()
    }
}

pub fn term_matches(pattern: &PatternTerm, value: &Term) -> bool {
    match (pattern, value) {
        (PatternTerm::Variable(_) | PatternTerm::BlankNode(_), _) => true,
        (PatternTerm::Iri(expected), Term::Iri(actual)) => expected == actual,
        (PatternTerm::Literal(expected), Term::Literal(actual)) => literal_matches(expected, actual),
        _ => false,
    }
}

/// The `VALUES` row for `quad` against `pattern`, or `None` when it does not match.
///
/// A variable occurring more than once in the pattern triple must see the same term
/// everywhere.
pub fn bind_triple(
    pattern: &TriplePattern,
    quad: &Quad,
    policy: BindingPolicy,
) -> Option<Vec<(String, Term)>> {
    let subject = Term::Iri(quad.subject.clone());
    let predicate = Term::Iri(quad.predicate.clone());
    let positions = [
        (Position::Subject, &pattern.subject, &subject),
        (Position::Predicate, &pattern.predicate, &predicate),
        (Position::Object, &pattern.object, &quad.object),
    ];

    let mut seen: Vec<(&str, &Term)> = Vec::new();
    let mut bindings = Vec::new();
    for (position, pattern_term, value) in positions {
        if !term_matches(pattern_term, value) {
            return None;
        }
        let Some(variable) = pattern_term.variable_name() else {
            continue;
        };
        if let Some((_, bound)) = seen.iter().find(|(name, _)| *name == variable) {
            if *bound != value {
                return None;
            }
            continue;
        }
        seen.push((variable, value));
        if policy == BindingPolicy::All || position == Position::Subject {
            bindings.push((variable.to_string(), value.clone()));
        }
    }
    Some(bindings)
}
