use crate::execution::pipeline::DeltaPipeline;
use crate::execution::{RunOutcome, SyncSettings};
use crate::ledger::{JobStatus, Ledger};
use crate::sources::{DeltaFile, DeltaSource};
use crate::Result;
use std::sync::Arc;
use tracing::{error, info};

/// One delta-sync run.
///
/// Consumes every file published after the checkpoint as one task of a new job. The first
/// file that fails ends the run: its task and the job are marked failed and the checkpoint
/// stays at the last file that was applied.
pub struct DeltaSync {
    ledger: Arc<Ledger>,
    source: Arc<dyn DeltaSource>,
    pipeline: Arc<DeltaPipeline>,
    settings: SyncSettings,
}

impl DeltaSync {
    pub fn new(
        ledger: Arc<Ledger>,
        source: Arc<dyn DeltaSource>,
        pipeline: Arc<DeltaPipeline>,
        settings: SyncSettings,
    ) -> Self {
        Self { ledger, source, pipeline, settings }
    }

    pub async fn run(&self) -> RunOutcome {
        match self.start().await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = format!("Unexpected error while running delta sync: {}", e);
                if let Err(record) = self.ledger.create_error(&message).await {
                    error!(error = %record, "could not record delta sync error");
                }
                RunOutcome::Failed { job: None, error: e.to_string() }
            }
        }
    }

    async fn start(&self) -> Result<RunOutcome> {
        if let Some(reason) = self.skip_reason().await? {
            info!(reason = %reason, "not starting delta sync");
            return Ok(RunOutcome::Skipped(reason));
        }
        self.ledger
            .fail_stale_jobs(
                &self.settings.delta_sync_job_operation,
                "Job was still busy when a new delta sync started",
            )
            .await?;
        self.ingest().await
    }

    async fn skip_reason(&self) -> Result<Option<String>> {
        if self.settings.disable_delta_ingest {
            return Ok(Some("delta ingest disabled".to_string()));
        }
        if self.settings.wait_for_initial_sync {
            let initial = self
                .ledger
                .get_latest_job_for_operation(&self.settings.initial_sync_job_operation, &[])
                .await?;
            if initial.map(|job| job.status) != Some(JobStatus::Success) {
                return Ok(Some("no successful initial sync job found".to_string()));
            }
        }
        Ok(None)
    }

    async fn ingest(&self) -> Result<RunOutcome> {
        let operations = [
            self.settings.delta_sync_job_operation.as_str(),
            self.settings.initial_sync_job_operation.as_str(),
        ];
        let since = self
            .ledger
            .determine_checkpoint(&operations, self.settings.start_from_delta_timestamp)
            .await?;
        let files = self.source.files_since(since).await?;
        if files.is_empty() {
            info!(%since, "no new deltas published since checkpoint, nothing to do");
            return Ok(RunOutcome::NothingToDo);
        }
        info!(%since, files = files.len(), "found unconsumed delta files");

        let job = self.ledger.create_job(&self.settings.delta_sync_job_operation, JobStatus::Busy).await?;
        match self.ingest_files(&job, &files).await {
            Ok(()) => {
                self.ledger.update_status(&job, JobStatus::Success).await?;
                info!(job = %job, files = files.len(), "delta sync done");
                Ok(RunOutcome::Completed { job: Some(job), items: files.len() })
            }
            Err(e) => {
                error!(job = %job, error = %e, "delta sync failed");
                if let Err(record) = self.record_failure(&job, &e.to_string()).await {
                    error!(job = %job, error = %record, "could not record delta sync failure");
                }
                Ok(RunOutcome::Failed { job: Some(job), error: e.to_string() })
            }
        }
    }

    async fn ingest_files(&self, job: &str, files: &[DeltaFile]) -> Result<()> {
        let mut parent: Option<String> = None;
        for (index, file) in files.iter().enumerate() {
            info!(file = %file.name, created = %file.created, "ingesting delta file");
            let task = self
                .ledger
                .create_delta_sync_task(job, index as u32, JobStatus::Busy, file, parent.as_deref())
                .await?;

            let applied: Result<_> = async {
                let message = self.source.load(file).await?;
                self.pipeline.process_message(&message).await
            }
            .await;

            match applied {
                Ok(processed) => {
                    self.ledger.update_status(&task, JobStatus::Success).await?;
                    info!(file = %file.name, changesets = processed.changesets, "ingested delta file");
                    parent = Some(task);
                }
                Err(e) => {
                    error!(file = %file.name, error = %e, "could not ingest delta file");
                    self.ledger.update_status(&task, JobStatus::Failed).await?;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn record_failure(&self, job: &str, message: &str) -> Result<()> {
        self.ledger.create_job_error(job, message).await?;
        self.ledger.fail_job(job).await
    }
}
