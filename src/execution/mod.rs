//! Sync orchestration
//!
//! This module turns producer files into applied changes and keeps the ledger in step.
//!
//! # Components
//!
//! - **DeltaPipeline** - Enriches, mirrors and dispatches one delta message at a time
//! - **DeltaSync** - One delta-sync run: checkpoint, unconsumed files, one task per file
//! - **InitialSync** - Loads the producer's latest dump when no initial sync succeeded yet
//! - **DeltaCleanup** - Removes finished delta-sync jobs past their retention period
//! - **ProcessingQueue** - Single worker running the above one after the other
//!
//! # Example
//!
//! ```ignore
//! use delta_consumer::execution::{queue::DEFAULT_QUEUE_CAPACITY, DeltaSync, ProcessingQueue, Trigger};
//!
//! let delta_sync = DeltaSync::new(ledger, source, pipeline, settings);
//! let outcome = delta_sync.run().await;
//!
//! let queue = ProcessingQueue::start(runs, DEFAULT_QUEUE_CAPACITY);
//! queue.submit(Trigger::DeltaSync);
//! ```

pub mod cleanup;
pub mod delta_sync;
pub mod initial_sync;
pub mod pipeline;
pub mod queue;

pub use cleanup::DeltaCleanup;
pub use delta_sync::DeltaSync;
pub use initial_sync::InitialSync;
pub use pipeline::{DeltaPipeline, ProcessedMessage};
pub use queue::{ProcessingQueue, Runs, Trigger};

use crate::config::ConsumerConfig;
use chrono::{DateTime, Utc};

/// The part of the configuration the runs look at.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub delta_sync_job_operation: String,
    pub initial_sync_job_operation: String,
    pub start_from_delta_timestamp: Option<DateTime<Utc>>,
    pub disable_initial_sync: bool,
    pub disable_delta_ingest: bool,
    pub wait_for_initial_sync: bool,
    pub delta_jobs_retention_days: i64,
    pub batch_size: usize,
}

impl From<&ConsumerConfig> for SyncSettings {
    fn from(config: &ConsumerConfig) -> Self {
        Self {
            delta_sync_job_operation: config.delta_sync_job_operation.clone(),
            initial_sync_job_operation: config.initial_sync_job_operation.clone(),
            start_from_delta_timestamp: config.start_from_delta_timestamp,
            disable_initial_sync: config.disable_initial_sync,
            disable_delta_ingest: config.disable_delta_ingest,
            wait_for_initial_sync: config.wait_for_initial_sync,
            delta_jobs_retention_days: config.delta_jobs_retention_days,
            batch_size: config.batch_size,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&ConsumerConfig::default())
    }
}

/// How a run ended. Runs never return their error to the caller; it is logged and recorded
/// in the ledger, and summarized here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run did not start.
    Skipped(String),
    /// The run started but found nothing to do.
    NothingToDo,
    Completed { job: Option<String>, items: usize },
    Failed { job: Option<String>, error: String },
}

impl RunOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}
