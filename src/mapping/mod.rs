//! Incremental remapping of changed statements through the compiled mapping rules.

pub mod engine;
pub mod matcher;

pub use engine::MappingEngine;
pub use matcher::{BindingPolicy, BoundUpdate, Matcher};
