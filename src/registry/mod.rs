pub mod rule_registry;

pub use rule_registry::RuleRegistry;
