//! Adds type context and configured context statements to a changeset.
//!
//! Mapping rules often join on `rdf:type`, but a producer only publishes what changed: a
//! renamed person arrives without its type. Enrichment looks the missing types up (first in
//! the per-file [`TypeCache`], then in the landing zone) and runs the configured context
//! queries for statements that trigger them. The discovered statements are kept apart from
//! the original ones, see [`EnrichedChangeSet`].
//!
//! The context configuration is a JSON file:
//!
//! ```json
//! {
//!   "prefixes": "PREFIX ex: <http://example.org/>",
//!   "addTypes": { "scope": "inserts", "exhaustive": false },
//!   "contextQueries": [
//!     {
//!       "trigger": { "subjectType": "ex:Person" },
//!       "queryTemplate": "SELECT ?s ?p ?o WHERE { GRAPH <http://ex.org/lz> { BIND({{subject}} AS ?s) ?s ?p ?o } }"
//!     }
//!   ]
//! }
//! ```
//!
//! `{{subject}}` in a query template is replaced by the triggering statement's subject.

use crate::context::type_cache::TypeCache;
use crate::core::{escape_iri, ChangeSet, ChangeSide, Quad, Term, RDF_TYPE};
use crate::querying::query_processing::{binding_iri, SparqlStore};
use crate::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SUBJECT_PLACEHOLDER: &str = "{{subject}}";

/// Which changeset sides get their missing types added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeScope {
    #[default]
    None,
    Inserts,
    Deletes,
    All,
}

impl TypeScope {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "" | "none" => Ok(TypeScope::None),
            "inserts" => Ok(TypeScope::Inserts),
            "deletes" => Ok(TypeScope::Deletes),
            "all" => Ok(TypeScope::All),
            other => Err(Error::Config(format!("invalid addTypes scope: {}", other))),
        }
    }

    pub fn covers(self, side: ChangeSide) -> bool {
        matches!(
            (self, side),
            (TypeScope::All, _)
                | (TypeScope::Inserts, ChangeSide::Inserts)
                | (TypeScope::Deletes, ChangeSide::Deletes)
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContextConfig {
    #[serde(default)]
    prefixes: String,
    #[serde(default)]
    add_types: RawAddTypes,
    #[serde(default)]
    context_queries: Vec<RawContextQuery>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawAddTypes {
    #[serde(default)]
    scope: String,
    #[serde(default, alias = "exhausitive")]
    exhaustive: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContextQuery {
    trigger: RawTrigger,
    query_template: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrigger {
    subject_type: Option<String>,
    predicate_value: Option<String>,
}

/// When a statement needs a context query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextTrigger {
    /// The statement is `(?, rdf:type, <type>)`.
    SubjectType(String),
    /// The statement uses this predicate.
    Predicate(String),
}

impl ContextTrigger {
    pub fn fires_on(&self, quad: &Quad) -> bool {
        match self {
            ContextTrigger::SubjectType(class) => {
                quad.is_type_statement() && quad.object.as_iri() == Some(class.as_str())
            }
            ContextTrigger::Predicate(predicate) => quad.predicate == *predicate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextQuery {
    pub triggers: Vec<ContextTrigger>,
    pub query_template: String,
}

impl ContextQuery {
    pub fn fires_on(&self, quad: &Quad) -> bool {
        self.triggers.iter().any(|trigger| trigger.fires_on(quad))
    }

    pub fn render(&self, subject: &str) -> String {
        self.query_template.replace(SUBJECT_PLACEHOLDER, &escape_iri(subject))
    }
}

/// The compiled context configuration: prefixes expanded, scope validated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextConfig {
    pub scope: TypeScope,
    pub exhaustive: bool,
    pub context_queries: Vec<ContextQuery>,
}

impl ContextConfig {
    /// Only type enrichment, no context queries.
    pub fn types_only(scope: TypeScope, exhaustive: bool) -> Self {
        Self { scope, exhaustive, context_queries: Vec::new() }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawContextConfig = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("invalid context configuration: {}", e)))?;
        Self::compile(raw)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!(
            path = %path.display(),
            scope = ?config.scope,
            exhaustive = config.exhaustive,
            context_queries = config.context_queries.len(),
            "loaded context configuration"
        );
        Ok(config)
    }

    fn compile(raw: RawContextConfig) -> Result<Self> {
        let prefixes = parse_prefixes(&raw.prefixes)?;
        if prefixes.is_empty() {
            debug!("no prefixes defined in the context configuration");
        }

        let context_queries = raw
            .context_queries
            .into_iter()
            .map(|query| {
                let mut triggers = Vec::new();
                if let Some(class) = query.trigger.subject_type {
                    triggers.push(ContextTrigger::SubjectType(expand(&class, &prefixes)));
                }
                if let Some(predicate) = query.trigger.predicate_value {
                    triggers.push(ContextTrigger::Predicate(expand(&predicate, &prefixes)));
                }
                if triggers.is_empty() {
                    return Err(Error::Config(
                        "context query without subjectType or predicateValue trigger".to_string(),
                    ));
                }
                Ok(ContextQuery { triggers, query_template: query.query_template })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            scope: TypeScope::parse(&raw.add_types.scope)?,
            exhaustive: raw.add_types.exhaustive,
            context_queries,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.scope != TypeScope::None || !self.context_queries.is_empty()
    }
}

fn parse_prefixes(prologue: &str) -> Result<HashMap<String, String>> {
    let declaration = Regex::new(r"(?i)PREFIX\s+([A-Za-z0-9_.\-]*):\s*<([^>]*)>")
        .map_err(|e| Error::Config(e.to_string()))?;
    Ok(declaration
        .captures_iter(prologue)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect())
}

/// Expand `prefix:local` with the declared prefixes. `<iri>` loses its brackets.
fn expand(value: &str, prefixes: &HashMap<String, String>) -> String {
    let value = value.trim();
    if let Some(iri) = value.strip_prefix('<').and_then(|v| v.strip_suffix('>')) {
        return iri.to_string();
    }
    if let Some((prefix, local)) = value.split_once(':') {
        if let Some(base) = prefixes.get(prefix) {
            return format!("{}{}", base, local);
        }
    }
    value.to_string()
}

/// A changeset with the statements enrichment discovered, kept apart from the original.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnrichedChangeSet {
    pub original: ChangeSet,
    pub inserts_context: Vec<Quad>,
    pub deletes_context: Vec<Quad>,
}

impl EnrichedChangeSet {
    /// A changeset that needs no context.
    pub fn without_context(original: ChangeSet) -> Self {
        Self { original, ..Self::default() }
    }

    pub fn context(&self, side: ChangeSide) -> &[Quad] {
        match side {
            ChangeSide::Inserts => &self.inserts_context,
            ChangeSide::Deletes => &self.deletes_context,
        }
    }

    pub fn original_side(&self, side: ChangeSide) -> &[Quad] {
        match side {
            ChangeSide::Inserts => &self.original.inserts,
            ChangeSide::Deletes => &self.original.deletes,
        }
    }

    /// The original statements of `side` followed by their context.
    pub fn with_context(&self, side: ChangeSide) -> Vec<Quad> {
        self.original_side(side).iter().chain(self.context(side)).cloned().collect()
    }
}

/// Looks up context in the landing zone.
pub struct ContextEnricher {
    config: Arc<ContextConfig>,
    store: Arc<dyn SparqlStore>,
    landing_zone_graph: String,
}

impl ContextEnricher {
    pub fn new(
        config: Arc<ContextConfig>,
        store: Arc<dyn SparqlStore>,
        landing_zone_graph: impl Into<String>,
    ) -> Self {
        Self { config, store, landing_zone_graph: landing_zone_graph.into() }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Enrich both sides of `changeset`. The input is left untouched.
    pub async fn enrich(&self, changeset: &ChangeSet, cache: &mut TypeCache) -> Result<EnrichedChangeSet> {
        let mut enriched = EnrichedChangeSet::without_context(changeset.clone());
        for side in [ChangeSide::Deletes, ChangeSide::Inserts] {
            let statements = enriched.original_side(side);
            if statements.is_empty() {
                continue;
            }
            let context = self.side_context(statements, side, cache).await?;
            match side {
                ChangeSide::Inserts => enriched.inserts_context = context,
                ChangeSide::Deletes => enriched.deletes_context = context,
            }
        }
        Ok(enriched)
    }

    async fn side_context(
        &self,
        statements: &[Quad],
        side: ChangeSide,
        cache: &mut TypeCache,
    ) -> Result<Vec<Quad>> {
        let mut known: HashSet<(String, String, Term)> = statements
            .iter()
            .map(|q| (q.subject.clone(), q.predicate.clone(), q.object.clone()))
            .collect();
        let mut context = Vec::new();
        let mut push = |quad: Quad, context: &mut Vec<Quad>| {
            if known.insert((quad.subject.clone(), quad.predicate.clone(), quad.object.clone())) {
                context.push(quad);
            }
        };

        if self.config.scope.covers(side) {
            for quad in self.ensure_types(statements, self.config.exhaustive, cache).await? {
                push(quad, &mut context);
            }
        }

        for query in &self.config.context_queries {
            let triggered: Vec<String> = statements
                .iter()
                .chain(context.iter())
                .filter(|quad| query.fires_on(quad))
                .map(|quad| quad.subject.clone())
                .collect();
            for subject in triggered {
                debug!(subject = %subject, "statement triggers a context query");
                for quad in self.find_context(&query.render(&subject)).await? {
                    push(quad, &mut context);
                }
            }
        }
        Ok(context)
    }

    /// The `rdf:type` statements to add for the subjects of `statements`.
    ///
    /// Non exhaustive: only subjects without an `rdf:type` among `statements` are looked up,
    /// in `cache` first and in the landing zone on a miss. Exhaustive: every subject is looked
    /// up in the landing zone.
    pub async fn ensure_types(
        &self,
        statements: &[Quad],
        exhaustive: bool,
        cache: &mut TypeCache,
    ) -> Result<Vec<Quad>> {
        let mut subjects = Vec::new();
        for quad in statements {
            if !subjects.contains(&quad.subject.as_str()) {
                subjects.push(quad.subject.as_str());
            }
        }

        let graph = Some(self.landing_zone_graph.as_str());
        let mut added = Vec::new();
        for subject in subjects {
            if !exhaustive {
                let typed = statements.iter().any(|q| q.subject == subject && q.is_type_statement());
                if typed {
                    continue;
                }
                if cache.has(subject) {
                    added.extend(cache.statements(subject, graph));
                    continue;
                }
            }

            let types = self.find_subject_types(subject).await?;
            if types.is_empty() {
                warn!(
                    subject = %subject,
                    "no types found for subject, they will probably arrive in a later delta"
                );
                continue;
            }
            cache.add(subject, types);
            added.extend(cache.statements(subject, graph));
        }
        Ok(added)
    }

    async fn find_subject_types(&self, subject: &str) -> Result<Vec<String>> {
        let query = format!(
            "SELECT DISTINCT ?type WHERE {{\n  GRAPH {} {{\n    {} a ?type .\n  }}\n}}",
            escape_iri(&self.landing_zone_graph),
            escape_iri(subject)
        );
        let bindings = self.store.query(&query).await?;
        Ok(bindings.iter().filter_map(|b| binding_iri(b, "type").map(str::to_string)).collect())
    }

    async fn find_context(&self, query: &str) -> Result<Vec<Quad>> {
        let bindings = self.store.query(query).await?;
        Ok(bindings
            .into_iter()
            .filter_map(|mut binding| {
                let subject = binding.remove("s")?.as_iri()?.to_string();
                let predicate = binding.remove("p")?.as_iri()?.to_string();
                let object = binding.remove("o")?;
                Some(Quad::new(subject, predicate, object, Some(self.landing_zone_graph.clone())))
            })
            .collect())
    }
}

/// A type statement, for building changesets by hand.
pub fn type_statement(subject: &str, class: &str) -> Quad {
    Quad::new(subject, RDF_TYPE, Term::iri(class), None)
}
