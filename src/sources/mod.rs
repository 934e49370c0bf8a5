//! Where delta files and dumps come from.

pub mod delta_source;
pub mod dump_file;
pub mod producer_client;

pub use delta_source::{DeltaFile, DeltaSource};
pub use dump_file::{DumpFile, DumpSource};
pub use producer_client::{ProducerClient, ProducerConfig};

use crate::parsing::changeset_parser::ChangesetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },
    #[error("could not log in at the producer: {0}")]
    Login(String),
    #[error("unexpected producer response: {0}")]
    Decode(String),
    #[error("invalid delta payload: {0}")]
    Payload(#[from] ChangesetError),
    #[error("refusing unsafe file name '{0}'")]
    UnsafeFileName(String),
    #[error("could not parse dump: {0}")]
    Rdf(String),
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http(_) => true,
            SourceError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Http(err.to_string())
    }
}
