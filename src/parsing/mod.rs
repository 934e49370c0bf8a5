pub mod changeset_parser;
pub mod rule_parser;

pub use changeset_parser::{parse_delta_message, ChangesetError};
pub use rule_parser::{MappingRule, RuleCompiler, RuleError, RuleSource};
