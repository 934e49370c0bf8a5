use std::{
    path::PathBuf,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::info;

use crate::parsing::rule_parser::{MappingRule, RuleCompiler, RuleError, RuleSource};

/// Where the registry reads its rule texts from.
#[derive(Debug, Clone)]
pub enum RuleOrigin {
    /// Every `.rq`/`.sparql` file below a folder.
    Folder(PathBuf),
    /// Rule texts held in memory.
    Sources(Vec<RuleSource>),
}

/// Compiled mapping rules, compiled on first use and reused until invalidated.
pub struct RuleRegistry {
    compiler: RuleCompiler,
    origin: RuleOrigin,
    compiled: RwLock<Option<Arc<Vec<MappingRule>>>>,
}

impl RuleRegistry {
    pub fn new(compiler: RuleCompiler, origin: RuleOrigin) -> Self {
        RuleRegistry { compiler, origin, compiled: RwLock::new(None) }
    }

    pub fn from_folder(compiler: RuleCompiler, folder: impl Into<PathBuf>) -> Self {
        Self::new(compiler, RuleOrigin::Folder(folder.into()))
    }

    pub fn from_sources(compiler: RuleCompiler, sources: Vec<RuleSource>) -> Self {
        Self::new(compiler, RuleOrigin::Sources(sources))
    }

    /// The compiled rules. The first call compiles them, later calls share the result.
    pub fn rules(&self) -> Result<Arc<Vec<MappingRule>>, RuleError> {
        if let Some(rules) = self.compiled.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(rules));
        }

        let mut compiled = self.compiled.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have compiled while we waited for the write lock.
        if let Some(rules) = compiled.as_ref() {
            return Ok(Arc::clone(rules));
        }

        let rules = Arc::new(match &self.origin {
            RuleOrigin::Folder(folder) => self.compiler.compile_dir(folder)?,
            RuleOrigin::Sources(sources) => self.compiler.compile(sources)?,
        });
        *compiled = Some(Arc::clone(&rules));
        Ok(rules)
    }

    /// Drop the compiled rules so the next [`RuleRegistry::rules`] call recompiles them.
    pub fn invalidate(&self) {
        info!("invalidating compiled mapping rules");
        *self.compiled.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}
