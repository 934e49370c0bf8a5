use crate::core::{ChangeSet, Quad, Term, RDF_TYPE};
use std::collections::{BTreeSet, HashMap};

/// Subject to type IRIs, for the lifetime of one delta file.
#[derive(Debug, Clone, Default)]
pub struct TypeCache {
    types: HashMap<String, BTreeSet<String>>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache with every `rdf:type` statement of `changesets`, inserted or deleted.
    pub fn from_changesets(changesets: &[ChangeSet]) -> Self {
        let mut cache = Self::new();
        for changeset in changesets {
            for quad in changeset.inserts.iter().chain(&changeset.deletes) {
                if let (true, Term::Iri(class)) = (quad.is_type_statement(), &quad.object) {
                    cache.add(&quad.subject, [class.clone()]);
                }
            }
        }
        cache
    }

    pub fn has(&self, subject: &str) -> bool {
        self.types.contains_key(subject)
    }

    pub fn add(&mut self, subject: &str, types: impl IntoIterator<Item = String>) {
        self.types.entry(subject.to_string()).or_default().extend(types);
    }

    pub fn types(&self, subject: &str) -> impl Iterator<Item = &str> {
        self.types.get(subject).into_iter().flatten().map(String::as_str)
    }

    /// The cached types of `subject` as `rdf:type` statements in `graph`.
    pub fn statements(&self, subject: &str, graph: Option<&str>) -> Vec<Quad> {
        self.types(subject)
            .map(|class| {
                Quad::new(subject, RDF_TYPE, Term::iri(class), graph.map(str::to_string))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_from_inserts_and_deletes() {
        let changesets = vec![
            ChangeSet {
                inserts: vec![Quad::new("http://ex.org/A", RDF_TYPE, Term::iri("http://ex.org/Person"), None)],
                deletes: vec![],
            },
            ChangeSet {
                inserts: vec![Quad::new("http://ex.org/A", "http://ex.org/name", Term::literal("A"), None)],
                deletes: vec![Quad::new("http://ex.org/B", RDF_TYPE, Term::iri("http://ex.org/Dog"), None)],
            },
        ];
        let cache = TypeCache::from_changesets(&changesets);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.types("http://ex.org/B").collect::<Vec<_>>(), vec!["http://ex.org/Dog"]);
        assert!(!cache.has("http://ex.org/C"));
    }

    #[test]
    fn test_statements_are_deduplicated() {
        let mut cache = TypeCache::new();
        cache.add("http://ex.org/A", ["http://ex.org/T".to_string(), "http://ex.org/T".to_string()]);
        assert_eq!(cache.statements("http://ex.org/A", Some("http://ex.org/g")).len(), 1);
    }
}
