//! # Delta consumer
//!
//! A change-data-capture consumer for RDF. It pulls the ordered delta files a producer
//! publishes, mirrors the raw statements into a landing-zone graph, and re-derives a
//! target dataset through declarative CONSTRUCT mapping rules. Every run is recorded in a
//! job/task ledger kept in the triplestore, so a failed run can be resumed from the last
//! file that was applied.
//!
//! ## Features
//!
//! - Checkpointed, resumable delta ingestion with an auditable job/task ledger
//! - Incremental remapping of single changed triples through compiled rules
//! - Type context enrichment for out-of-order statements
//! - Initial sync from a producer dump
//!
//! ## Example
//!
//! ```rust
//! use delta_consumer::Result;
//!
//! fn example() -> Result<()> {
//!     println!("RDF delta consumer");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(missing_docs)]

/// Core data structures and types
pub mod core;

/// Consumer configuration
pub mod config;

/// Mapping rule and delta payload parsing
pub mod parsing;

/// Compiled rule memoization
pub mod registry;

/// Store access: the SPARQL seam, its HTTP and embedded implementations, retries
pub mod querying;

/// Pattern matching and incremental remapping
pub mod mapping;

/// Type context enrichment
pub mod context;

/// Landing-zone mirror graph
pub mod storage;

/// Job/task ledger
pub mod ledger;

/// Delta files, dumps and the producer client
pub mod sources;

/// Dispatch strategies
pub mod dispatch;

/// Sync orchestration
pub mod execution;

/// Consumer facade
pub mod api;

/// HTTP debug surface
pub mod http;

pub mod error {
    //! Error types and result definitions

    use crate::parsing::changeset_parser::ChangesetError;
    use crate::parsing::rule_parser::RuleError;
    use crate::querying::query_processing::StoreError;
    use crate::sources::SourceError;
    use std::fmt;

    /// Result type alias for consumer operations
    pub type Result<T> = std::result::Result<T, Error>;

    /// Main error type for the consumer
    #[derive(Debug)]
    pub enum Error {
        /// Configuration error
        Config(String),
        /// Store error
        Store(StoreError),
        /// Mapping rule error
        Rule(RuleError),
        /// Producer or file error
        Source(SourceError),
        /// Inconsistent ledger state
        Ledger(String),
        /// Input that will never succeed on retry
        MalformedInput(String),
        /// Neither the ledger nor the configuration provide a starting point
        NoCheckpoint(String),
        /// IO error
        Io(std::io::Error),
        /// Other error
        Other(String),
    }

    impl Error {
        /// Whether retrying the failed operation may succeed.
        pub fn is_transient(&self) -> bool {
            match self {
                Error::Store(err) => err.is_transient(),
                Error::Source(err) => err.is_transient(),
                _ => false,
            }
        }
    }

    impl fmt::Display for Error {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Error::Config(msg) => write!(f, "Configuration error: {}", msg),
                Error::Store(err) => write!(f, "Store error: {}", err),
                Error::Rule(err) => write!(f, "Rule error: {}", err),
                Error::Source(err) => write!(f, "Source error: {}", err),
                Error::Ledger(msg) => write!(f, "Ledger error: {}", msg),
                Error::MalformedInput(msg) => write!(f, "Malformed input: {}", msg),
                Error::NoCheckpoint(msg) => write!(f, "No checkpoint: {}", msg),
                Error::Io(err) => write!(f, "IO error: {}", err),
                Error::Other(msg) => write!(f, "Error: {}", msg),
            }
        }
    }

    impl std::error::Error for Error {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            match self {
                Error::Store(err) => Some(err),
                Error::Rule(err) => Some(err),
                Error::Source(err) => Some(err),
                Error::Io(err) => Some(err),
                _ => None,
            }
        }
    }

    impl From<std::io::Error> for Error {
        fn from(err: std::io::Error) -> Self {
            Error::Io(err)
        }
    }

    impl From<StoreError> for Error {
        fn from(err: StoreError) -> Self {
            Error::Store(err)
        }
    }

    impl From<RuleError> for Error {
        fn from(err: RuleError) -> Self {
            Error::Rule(err)
        }
    }

    impl From<SourceError> for Error {
        fn from(err: SourceError) -> Self {
            Error::Source(err)
        }
    }

    impl From<ChangesetError> for Error {
        fn from(err: ChangesetError) -> Self {
            Error::MalformedInput(err.to_string())
        }
    }
}

// Re-export commonly used types
pub use error::{Error, Result};
