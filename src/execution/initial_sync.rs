use crate::execution::pipeline::DeltaPipeline;
use crate::execution::{RunOutcome, SyncSettings};
use crate::ledger::vocab::INITIAL_SYNC_TASK_OPERATION;
use crate::ledger::{JobStatus, Ledger};
use crate::sources::dump_file::stream_dump;
use crate::sources::{DeltaFile, DumpSource};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Loads the producer's latest dump.
///
/// Runs when no initial sync job exists yet or the latest one failed. On success the job
/// carries a delta-sync task recording the dump's release date, which is where delta sync
/// picks up.
pub struct InitialSync {
    ledger: Arc<Ledger>,
    source: Arc<dyn DumpSource>,
    pipeline: Arc<DeltaPipeline>,
    settings: SyncSettings,
}

impl InitialSync {
    pub fn new(
        ledger: Arc<Ledger>,
        source: Arc<dyn DumpSource>,
        pipeline: Arc<DeltaPipeline>,
        settings: SyncSettings,
    ) -> Self {
        Self { ledger, source, pipeline, settings }
    }

    pub async fn run(&self) -> RunOutcome {
        if self.settings.disable_initial_sync {
            warn!("initial sync disabled");
            return RunOutcome::Skipped("initial sync disabled".to_string());
        }
        match self.start().await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = format!("Unexpected error while running initial sync: {}", e);
                if let Err(record) = self.ledger.create_error(&message).await {
                    error!(error = %record, "could not record initial sync error");
                }
                RunOutcome::Failed { job: None, error: e.to_string() }
            }
        }
    }

    async fn start(&self) -> Result<RunOutcome> {
        self.ledger
            .fail_stale_jobs(
                &self.settings.initial_sync_job_operation,
                "Job was still busy when a new initial sync started",
            )
            .await?;
        let latest = self
            .ledger
            .get_latest_job_for_operation(&self.settings.initial_sync_job_operation, &[])
            .await?;
        match latest {
            None => info!("no initial sync has run yet, starting one"),
            Some(job) if job.status == JobStatus::Failed => {
                info!(previous = %job.uri, "previous initial sync failed, restarting");
            }
            Some(job) if job.status == JobStatus::Success => {
                info!(job = %job.uri, "initial sync has already run");
                return Ok(RunOutcome::Skipped(format!("initial sync {} has already run", job.uri)));
            }
            Some(job) => {
                return Err(Error::Ledger(format!(
                    "unexpected status {} for initial sync job {}, check the jobs graph",
                    job.status, job.uri
                )));
            }
        }
        self.sync().await
    }

    async fn sync(&self) -> Result<RunOutcome> {
        let job = self.ledger.create_job(&self.settings.initial_sync_job_operation, JobStatus::Busy).await?;
        let task = self
            .ledger
            .create_task(&job, 0, INITIAL_SYNC_TASK_OPERATION, JobStatus::Scheduled, &[], &[])
            .await?;

        match self.load_dump(&job, &task).await {
            Ok(statements) => {
                info!(job = %job, statements, "initial sync done");
                Ok(RunOutcome::Completed { job: Some(job), items: statements })
            }
            Err(e) => {
                error!(job = %job, error = %e, "initial sync failed");
                if let Err(record) = self.record_failure(&job, &task, &e.to_string()).await {
                    error!(job = %job, error = %record, "could not record initial sync failure");
                }
                Ok(RunOutcome::Failed { job: Some(job), error: e.to_string() })
            }
        }
    }

    async fn load_dump(&self, job: &str, task: &str) -> Result<usize> {
        let dump = self
            .source
            .latest_dump()
            .await?
            .ok_or_else(|| Error::Other("No dump file found".to_string()))?;
        self.ledger.update_status(task, JobStatus::Busy).await?;

        let path = self.source.download_dump(&dump).await?;
        let mut batches = stream_dump(path, self.settings.batch_size);
        let mut total = 0;
        while let Some(batch) = batches.recv().await {
            let batch = batch?;
            total += batch.len();
            self.pipeline.process_dump_batch(&batch).await?;
            debug!(total, "applied dump batch");
        }
        self.pipeline.finish_initial_sync().await?;
        self.ledger.update_status(task, JobStatus::Success).await?;

        let checkpoint = DeltaFile::from(&dump);
        let sync_task = self
            .ledger
            .create_delta_sync_task(job, 1, JobStatus::Scheduled, &checkpoint, None)
            .await?;
        self.ledger.update_status(&sync_task, JobStatus::Success).await?;
        self.ledger.update_status(job, JobStatus::Success).await?;
        Ok(total)
    }

    async fn record_failure(&self, job: &str, task: &str, message: &str) -> Result<()> {
        self.ledger.update_status(task, JobStatus::Failed).await?;
        self.ledger.create_job_error(job, message).await?;
        self.ledger.fail_job(job).await
    }
}
