use crate::core::DeltaMessage;
use crate::sources::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub const GZIP_FORMAT: &str = "application/gzip";

/// A delta file published by the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaFile {
    pub id: String,
    pub name: String,
    pub created: DateTime<Utc>,
    pub format: Option<String>,
}

impl DeltaFile {
    /// Folder, named after the creation day, a kept file is moved to.
    pub fn day_folder(&self) -> String {
        self.created.format("%Y-%m-%d").to_string()
    }

    pub fn is_gzip(&self) -> bool {
        self.format.as_deref() == Some(GZIP_FORMAT)
    }
}

#[async_trait]
pub trait DeltaSource: Send + Sync {
    /// Files created strictly after `since`, oldest first.
    async fn files_since(&self, since: DateTime<Utc>) -> Result<Vec<DeltaFile>, SourceError>;

    /// Download and decode `file`.
    async fn load(&self, file: &DeltaFile) -> Result<DeltaMessage, SourceError>;

    /// Remove the kept local copy of `file`, if any.
    async fn remove_file(&self, file: &DeltaFile) -> Result<(), SourceError>;
}

/// Order `files` by creation time and drop those not strictly after `since`.
pub fn unconsumed(mut files: Vec<DeltaFile>, since: DateTime<Utc>) -> Vec<DeltaFile> {
    files.retain(|file| file.created > since);
    files.sort_by(|a, b| a.created.cmp(&b.created));
    files
}
