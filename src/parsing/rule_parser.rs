//! Compiler for CONSTRUCT mapping rules.
//!
//! A mapping rule is a file holding one SPARQL CONSTRUCT query. The WHERE pattern describes
//! the data in the landing zone the rule reacts to, the template the triples it derives
//! into the target graph. Each rule compiles into two update shapes:
//!
//! - an insert shape: `INSERT { GRAPH <target> { template } } WHERE { GRAPH <landing> { pattern } }`
//! - a delete shape: `DELETE { GRAPH <target> { template } } WHERE { GRAPH <landing> { pattern } }`
//!
//! The shapes are completed with a `VALUES` clause by the matcher once an incoming triple
//! has been bound to one of the rule's pattern triples.
//!
//! # Example
//!
//! ```ignore
//! use delta_consumer::parsing::rule_parser::RuleCompiler;
//!
//! let compiler = RuleCompiler::new("http://mu.semte.ch/graphs/landing-zone", "http://mu.semte.ch/graphs/public");
//! let rule = compiler.compile_source(
//!     "person.rq",
//!     "PREFIX ex: <http://example.org/> CONSTRUCT { ?s a ex:Human } WHERE { ?s a ex:Person }",
//! )?;
//! println!("{}", rule.insert_shape.render(&[]));
//! ```

use crate::core::{escape_iri, Literal, Term};
use spargebra::algebra::{GraphPattern, PropertyPathExpression};
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern as SparqlTriplePattern};
use spargebra::Query;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("could not read mapping rules at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("rule {rule} is not valid SPARQL: {message}")]
    Syntax { rule: String, message: String },
    #[error("rule {rule} is a {form} query, only CONSTRUCT is supported")]
    NotConstruct { rule: String, form: &'static str },
    #[error("rule {rule} uses ?{variable} in its template but not in its pattern")]
    UnboundTemplateVariable { rule: String, variable: String },
    #[error("rule {rule} has a blank node in its template, which cannot be deleted")]
    BlankNodeInTemplate { rule: String },
    #[error("rule {rule} uses an unsupported construct: {message}")]
    Unsupported { rule: String, message: String },
}

/// A position of a triple pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternTerm {
    Variable(String),
    Iri(String),
    Literal(Literal),
    BlankNode(String),
}

impl PatternTerm {
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            PatternTerm::Variable(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for PatternTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternTerm::Variable(name) => write!(f, "?{}", name),
            PatternTerm::Iri(iri) => f.write_str(&escape_iri(iri)),
            PatternTerm::Literal(literal) => literal.fmt(f),
            PatternTerm::BlankNode(label) => write!(f, "_:{}", label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    pub subject: PatternTerm,
    pub predicate: PatternTerm,
    pub object: PatternTerm,
}

impl TriplePattern {
    pub fn new(subject: PatternTerm, predicate: PatternTerm, object: PatternTerm) -> Self {
        Self { subject, predicate, object }
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        [&self.subject, &self.predicate, &self.object].into_iter().filter_map(PatternTerm::variable_name)
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Insert,
    Delete,
}

impl ShapeKind {
    fn keyword(self) -> &'static str {
        match self {
            ShapeKind::Insert => "INSERT",
            ShapeKind::Delete => "DELETE",
        }
    }
}

/// A compiled update waiting for its `VALUES` bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateShape {
    pub kind: ShapeKind,
    head: String,
    where_clause: String,
}

impl UpdateShape {
    fn new(
        kind: ShapeKind,
        template: &[TriplePattern],
        pattern: &str,
        source_graph: &str,
        target_graph: &str,
    ) -> Self {
        let template = template.iter().map(|t| format!("    {}\n", t)).collect::<String>();
        let head = format!("{} {{\n  GRAPH {} {{\n{}  }}\n}}", kind.keyword(), escape_iri(target_graph), template);
        let where_clause = format!("  GRAPH {} {{\n    {}\n  }}\n", escape_iri(source_graph), pattern);
        Self { kind, head, where_clause }
    }

    /// The executable update, restricted by one `VALUES` row when `bindings` is not empty.
    pub fn render(&self, bindings: &[(String, Term)]) -> String {
        let mut update = format!("{}\nWHERE {{\n{}", self.head, self.where_clause);
        if !bindings.is_empty() {
            let variables = bindings.iter().map(|(var, _)| format!("?{}", var)).collect::<Vec<_>>();
            let values = bindings.iter().map(|(_, term)| term.to_string()).collect::<Vec<_>>();
            update.push_str(&format!(
                "  VALUES ({}) {{\n    ({})\n  }}\n",
                variables.join(" "),
                values.join(" ")
            ));
        }
        update.push('}');
        update
    }
}

/// A compiled mapping rule.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRule {
    /// Where the rule came from, usually its file path.
    pub name: String,
    /// Every triple pattern of the WHERE clause an incoming triple can be matched against.
    pub pattern_triples: Vec<TriplePattern>,
    pub insert_template: Vec<TriplePattern>,
    pub source_graph: String,
    pub target_graph: String,
    pub insert_shape: UpdateShape,
    pub delete_shape: UpdateShape,
}

/// The text of one rule and where it was read from.
#[derive(Debug, Clone)]
pub struct RuleSource {
    pub name: String,
    pub text: String,
}

impl RuleSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { name: name.into(), text: text.into() }
    }
}

pub struct RuleCompiler {
    source_graph: String,
    target_graph: String,
}

impl RuleCompiler {
    /// # Arguments
    /// * `source_graph` - The landing zone graph rule patterns are evaluated against
    /// * `target_graph` - The graph rule templates are written to
    pub fn new(source_graph: impl Into<String>, target_graph: impl Into<String>) -> Self {
        Self { source_graph: source_graph.into(), target_graph: target_graph.into() }
    }

    pub fn compile(&self, sources: &[RuleSource]) -> Result<Vec<MappingRule>, RuleError> {
        sources.iter().map(|source| self.compile_source(&source.name, &source.text)).collect()
    }

    /// Read and compile every `.rq` and `.sparql` file below `dir`.
    pub fn compile_dir(&self, dir: &Path) -> Result<Vec<MappingRule>, RuleError> {
        let sources = load_rule_sources(dir)?;
        let rules = self.compile(&sources)?;
        info!(count = rules.len(), folder = %dir.display(), "compiled mapping rules");
        Ok(rules)
    }

    pub fn compile_source(&self, name: &str, text: &str) -> Result<MappingRule, RuleError> {
        let query = Query::parse(text, None)
            .map_err(|e| RuleError::Syntax { rule: name.to_string(), message: e.to_string() })?;

        let (template, pattern) = match query {
            Query::Construct { template, pattern, .. } => (template, pattern),
            Query::Select { .. } => return Err(not_construct(name, "SELECT")),
            Query::Ask { .. } => return Err(not_construct(name, "ASK")),
            Query::Describe { .. } => return Err(not_construct(name, "DESCRIBE")),
        };

        let insert_template = template
            .iter()
            .map(|triple| convert_triple(name, triple))
            .collect::<Result<Vec<_>, _>>()?;

        if insert_template
            .iter()
            .flat_map(|t| [&t.subject, &t.predicate, &t.object])
            .any(|term| matches!(term, PatternTerm::BlankNode(_)))
        {
            return Err(RuleError::BlankNodeInTemplate { rule: name.to_string() });
        }

        let mut pattern_triples = Vec::new();
        let mut pattern_variables = BTreeSet::new();
        collect_pattern(name, &pattern, &mut pattern_triples, &mut pattern_variables)?;

        for triple in &insert_template {
            if let Some(variable) = triple.variables().find(|v| !pattern_variables.contains(*v)) {
                return Err(RuleError::UnboundTemplateVariable {
                    rule: name.to_string(),
                    variable: variable.to_string(),
                });
            }
        }

        let where_pattern = pattern.to_string();
        debug!(rule = name, triples = pattern_triples.len(), "compiled mapping rule");

        Ok(MappingRule {
            name: name.to_string(),
            insert_shape: UpdateShape::new(
                ShapeKind::Insert,
                &insert_template,
                &where_pattern,
                &self.source_graph,
                &self.target_graph,
            ),
            delete_shape: UpdateShape::new(
                ShapeKind::Delete,
                &insert_template,
                &where_pattern,
                &self.source_graph,
                &self.target_graph,
            ),
            pattern_triples,
            insert_template,
            source_graph: self.source_graph.clone(),
            target_graph: self.target_graph.clone(),
        })
    }
}

fn not_construct(name: &str, form: &'static str) -> RuleError {
    RuleError::NotConstruct { rule: name.to_string(), form }
}

/// Collect the rule files below `dir`, recursively, in a stable order.
pub fn load_rule_sources(dir: &Path) -> Result<Vec<RuleSource>, RuleError> {
    let mut files = Vec::new();
    collect_rule_files(dir, &mut files)?;
    files.sort();

    files
        .into_iter()
        .map(|path| {
            let text = std::fs::read_to_string(&path)
                .map_err(|source| RuleError::Io { path: path.clone(), source })?;
            Ok(RuleSource::new(path.display().to_string(), text))
        })
        .collect()
}

fn collect_rule_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), RuleError> {
    let entries =
        std::fs::read_dir(dir).map_err(|source| RuleError::Io { path: dir.to_path_buf(), source })?;
    for entry in entries {
        let path = entry.map_err(|source| RuleError::Io { path: dir.to_path_buf(), source })?.path();
        if path.is_dir() {
            collect_rule_files(&path, files)?;
        } else if matches!(path.extension().and_then(|e| e.to_str()), Some("rq") | Some("sparql")) {
            files.push(path);
        }
    }
    Ok(())
}

fn convert_term(rule: &str, term: &TermPattern) -> Result<PatternTerm, RuleError> {
    match term {
        TermPattern::NamedNode(node) => Ok(PatternTerm::Iri(node.as_str().to_string())),
        TermPattern::BlankNode(node) => Ok(PatternTerm::BlankNode(node.as_str().to_string())),
        TermPattern::Literal(literal) => {
            let language = literal.language().map(str::to_string);
            let datatype = language.is_none().then(|| literal.datatype().as_str().to_string());
            Ok(PatternTerm::Literal(Literal { value: literal.value().to_string(), datatype, language }))
        }
        TermPattern::Variable(variable) => Ok(PatternTerm::Variable(variable.as_str().to_string())),
        #[allow(unreachable_patterns)]
        _ => Err(RuleError::Unsupported {
            rule: rule.to_string(),
            message: format!("quoted triple {}", term),
        }),
    }
}

fn convert_predicate(predicate: &NamedNodePattern) -> PatternTerm {
    match predicate {
        NamedNodePattern::NamedNode(node) => PatternTerm::Iri(node.as_str().to_string()),
        NamedNodePattern::Variable(variable) => PatternTerm::Variable(variable.as_str().to_string()),
    }
}

fn convert_triple(rule: &str, triple: &SparqlTriplePattern) -> Result<TriplePattern, RuleError> {
    Ok(TriplePattern::new(
        convert_term(rule, &triple.subject)?,
        convert_predicate(&triple.predicate),
        convert_term(rule, &triple.object)?,
    ))
}

/// Walk the WHERE pattern, gathering the matchable triple patterns and every variable the
/// pattern can bind.
fn collect_pattern(
    rule: &str,
    pattern: &GraphPattern,
    triples: &mut Vec<TriplePattern>,
    variables: &mut BTreeSet<String>,
) -> Result<(), RuleError> {
    match pattern {
        GraphPattern::Bgp { patterns } => {
            for triple in patterns {
                let triple = convert_triple(rule, triple)?;
                variables.extend(triple.variables().map(str::to_string));
                triples.push(triple);
            }
        }
        GraphPattern::Path { subject, path, object } => {
            let subject = convert_term(rule, subject)?;
            let object = convert_term(rule, object)?;
            variables.extend(subject.variable_name().map(str::to_string));
            variables.extend(object.variable_name().map(str::to_string));
            if let PropertyPathExpression::NamedNode(predicate) = path {
                triples.push(TriplePattern::new(
                    subject,
                    PatternTerm::Iri(predicate.as_str().to_string()),
                    object,
                ));
            }
        }
        GraphPattern::Join { left, right }
        | GraphPattern::LeftJoin { left, right, .. }
        | GraphPattern::Union { left, right } => {
            collect_pattern(rule, left, triples, variables)?;
            collect_pattern(rule, right, triples, variables)?;
        }
        GraphPattern::Minus { left, .. } => collect_pattern(rule, left, triples, variables)?,
        GraphPattern::Extend { inner, variable, .. } => {
            variables.insert(variable.as_str().to_string());
            collect_pattern(rule, inner, triples, variables)?;
        }
        GraphPattern::Values { variables: values, .. } => {
            variables.extend(values.iter().map(|v| v.as_str().to_string()));
        }
        GraphPattern::Group { inner, variables: group_by, aggregates } => {
            variables.extend(group_by.iter().map(|v| v.as_str().to_string()));
            variables.extend(aggregates.iter().map(|(v, _)| v.as_str().to_string()));
            collect_pattern(rule, inner, triples, variables)?;
        }
        GraphPattern::Filter { inner, .. }
        | GraphPattern::Graph { inner, .. }
        | GraphPattern::OrderBy { inner, .. }
        | GraphPattern::Project { inner, .. }
        | GraphPattern::Distinct { inner }
        | GraphPattern::Reduced { inner }
        | GraphPattern::Slice { inner, .. } => collect_pattern(rule, inner, triples, variables)?,
        GraphPattern::Service { .. } => {
            return Err(RuleError::Unsupported {
                rule: rule.to_string(),
                message: "SERVICE clauses".to_string(),
            })
        }
        #[allow(unreachable_patterns)]
        _ => {}
    }
    Ok(())
}
