use crate::execution::{RunOutcome, SyncSettings};
use crate::ledger::{JobStatus, Ledger};
use crate::sources::DeltaSource;
use crate::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

/// Removes delta-sync jobs older than the retention period.
///
/// The latest successful job is always kept since the next run starts from it.
pub struct DeltaCleanup {
    ledger: Arc<Ledger>,
    source: Arc<dyn DeltaSource>,
    settings: SyncSettings,
}

impl DeltaCleanup {
    pub fn new(ledger: Arc<Ledger>, source: Arc<dyn DeltaSource>, settings: SyncSettings) -> Self {
        Self { ledger, source, settings }
    }

    pub async fn run(&self) -> RunOutcome {
        if self.settings.delta_jobs_retention_days < 0 {
            return RunOutcome::Skipped("delta jobs are kept forever".to_string());
        }
        match self.cleanup(self.settings.delta_jobs_retention_days).await {
            Ok(removed) => RunOutcome::Completed { job: None, items: removed },
            Err(e) => {
                let message = format!("Unexpected error while running delta file cleanup task: {}", e);
                if let Err(record) = self.ledger.create_error(&message).await {
                    error!(error = %record, "could not record cleanup error");
                }
                RunOutcome::Failed { job: None, error: e.to_string() }
            }
        }
    }

    async fn cleanup(&self, retention_days: i64) -> Result<usize> {
        let until = Utc::now() - Duration::days(retention_days);
        info!(%until, "removing old delta sync jobs");

        let operation = &self.settings.delta_sync_job_operation;
        let mut jobs = self
            .ledger
            .get_jobs(operation, &[JobStatus::Success, JobStatus::Failed], &[], Some(until))
            .await?;
        if let Some(latest) = self.ledger.get_latest_job_for_operation(operation, &[JobStatus::Success]).await? {
            jobs.retain(|job| job.uri != latest.uri);
        }

        for job in &jobs {
            delete_delta_files_for_job(&self.ledger, self.source.as_ref(), &job.uri).await?;
            self.ledger.cleanup_job(&job.uri).await?;
        }
        info!(jobs = jobs.len(), "delta cleanup done");
        Ok(jobs.len())
    }
}

/// Remove the kept delta files recorded by the tasks of `job`. Returns how many files the
/// tasks recorded.
pub async fn delete_delta_files_for_job(ledger: &Ledger, source: &dyn DeltaSource, job: &str) -> Result<usize> {
    let mut removed = 0;
    for task in ledger.load_tasks(job).await? {
        for file in ledger.delta_files_for_task(&task.uri).await? {
            source.remove_file(&file).await?;
            removed += 1;
        }
    }
    Ok(removed)
}
