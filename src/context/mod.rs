//! Type context for changed subjects.

pub mod enrichment;
pub mod type_cache;

pub use enrichment::{ContextConfig, ContextEnricher, EnrichedChangeSet};
pub use type_cache::TypeCache;
