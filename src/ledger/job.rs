use crate::core::{escape_iri, escape_string};
use crate::ledger::vocab::{
    datetime_literal, parse_datetime, status_filter, JobStatus, JOB_TYPE, JOB_URI_PREFIX, PREFIXES,
    TASK_TYPE,
};
use crate::ledger::Ledger;
use crate::querying::query_processing::{binding_iri, binding_value, Binding};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

/// A job as read back from the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub uri: String,
    pub creator: String,
    pub operation: String,
    pub status: JobStatus,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub error: Option<String>,
    /// Task IRIs, in no particular order. See [`Ledger::load_tasks`] for ordered tasks.
    pub tasks: Vec<String>,
}

fn required<'a>(binding: &'a Binding, variable: &str) -> Result<&'a str> {
    binding_value(binding, variable)
        .ok_or_else(|| Error::Ledger(format!("missing ?{} in ledger result", variable)))
}

pub(crate) fn required_datetime(binding: &Binding, variable: &str) -> Result<DateTime<Utc>> {
    let value = required(binding, variable)?;
    parse_datetime(value).ok_or_else(|| Error::Ledger(format!("invalid timestamp '{}'", value)))
}

pub(crate) fn required_status(binding: &Binding, variable: &str) -> Result<JobStatus> {
    let value = required(binding, variable)?;
    JobStatus::from_iri(value).ok_or_else(|| Error::Ledger(format!("unknown status <{}>", value)))
}

impl Ledger {
    /// Create a job for `operation`. Returns the job IRI.
    pub async fn create_job(&self, operation: &str, status: JobStatus) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let uri = format!("{}{}", JOB_URI_PREFIX, id);
        let created = datetime_literal(&Utc::now());
        let update = format!(
            "{prefixes}
INSERT DATA {{
  GRAPH {graph} {{
    {job} a {job_type} ;
      mu:uuid {id} ;
      dct:creator {creator} ;
      adms:status {status} ;
      dct:created {created} ;
      dct:modified {created} ;
      task:operation {operation} .
  }}
}}",
            prefixes = PREFIXES,
            graph = self.graph_iri(),
            job = escape_iri(&uri),
            job_type = escape_iri(JOB_TYPE),
            id = escape_string(&id),
            creator = escape_iri(self.creator()),
            status = escape_iri(status.iri()),
            created = created,
            operation = escape_iri(operation),
        );
        self.store().update(&update).await?;
        info!(job = %uri, %status, operation, "created job");
        Ok(uri)
    }

    pub async fn load_job(&self, uri: &str) -> Result<Option<Job>> {
        let query = format!(
            "{prefixes}
SELECT DISTINCT ?creator ?status ?created ?modified ?operation ?error WHERE {{
  GRAPH {graph} {{
    {job} a {job_type} ;
      dct:creator ?creator ;
      adms:status ?status ;
      dct:created ?created ;
      task:operation ?operation ;
      dct:modified ?modified .
    OPTIONAL {{ {job} task:error ?error . }}
  }}
}}",
            prefixes = PREFIXES,
            graph = self.graph_iri(),
            job = escape_iri(uri),
            job_type = escape_iri(JOB_TYPE),
        );
        let bindings = self.store().query(&query).await?;
        let Some(row) = bindings.first() else {
            return Ok(None);
        };

        let tasks_query = format!(
            "{prefixes}
SELECT DISTINCT ?task WHERE {{
  GRAPH {graph} {{
    ?task dct:isPartOf {job} .
  }}
}}",
            prefixes = PREFIXES,
            graph = self.graph_iri(),
            job = escape_iri(uri),
        );
        let tasks = self
            .store()
            .query(&tasks_query)
            .await?
            .iter()
            .filter_map(|b| binding_iri(b, "task").map(str::to_string))
            .collect();

        Ok(Some(Job {
            uri: uri.to_string(),
            creator: required(row, "creator")?.to_string(),
            operation: required(row, "operation")?.to_string(),
            status: required_status(row, "status")?,
            created: required_datetime(row, "created")?,
            modified: required_datetime(row, "modified")?,
            error: binding_iri(row, "error").map(str::to_string),
            tasks,
        }))
    }

    /// The most recently created job of ours for `operation`, optionally restricted to
    /// `status_in`.
    pub async fn get_latest_job_for_operation(
        &self,
        operation: &str,
        status_in: &[JobStatus],
    ) -> Result<Option<Job>> {
        let query = format!(
            "{prefixes}
SELECT DISTINCT ?job ?created WHERE {{
  GRAPH {graph} {{
    ?job a {job_type} ;
      task:operation {operation} ;
      dct:creator {creator} ;
      adms:status ?status ;
      dct:created ?created .
    {filter}
  }}
}}
ORDER BY DESC(?created)
LIMIT 1",
            prefixes = PREFIXES,
            graph = self.graph_iri(),
            job_type = escape_iri(JOB_TYPE),
            operation = escape_iri(operation),
            creator = escape_iri(self.creator()),
            filter = status_filter("status", status_in, false),
        );
        let bindings = self.store().query(&query).await?;
        match bindings.first().and_then(|b| binding_iri(b, "job")) {
            Some(job) => self.load_job(job).await,
            None => Ok(None),
        }
    }

    /// Jobs for `operation` whose status is in `status_in` (when not empty), not in
    /// `status_not_in`, and that were created before `before` (when given).
    pub async fn get_jobs(
        &self,
        operation: &str,
        status_in: &[JobStatus],
        status_not_in: &[JobStatus],
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Job>> {
        let before_filter = before
            .map(|before| {
                format!(
                    "?job dct:created ?created .\n    FILTER(?created < {})",
                    datetime_literal(&before)
                )
            })
            .unwrap_or_default();
        let query = format!(
            "{prefixes}
SELECT DISTINCT ?job WHERE {{
  GRAPH {graph} {{
    ?job a {job_type} ;
      task:operation {operation} ;
      adms:status ?status .
    {status_in}
    {status_not_in}
    {before}
  }}
}}",
            prefixes = PREFIXES,
            graph = self.graph_iri(),
            job_type = escape_iri(JOB_TYPE),
            operation = escape_iri(operation),
            status_in = status_filter("status", status_in, false),
            status_not_in = status_filter("status", status_not_in, true),
            before = before_filter,
        );

        let mut jobs = Vec::new();
        for binding in self.store().query(&query).await? {
            let Some(uri) = binding_iri(&binding, "job") else {
                continue;
            };
            match self.load_job(uri).await? {
                Some(job) => jobs.push(job),
                None => warn!(job = uri, "job disappeared while loading"),
            }
        }
        Ok(jobs)
    }

    /// Fail every task of `job` that did not succeed, then the job itself.
    pub async fn fail_job(&self, job: &str) -> Result<()> {
        let failed = escape_iri(JobStatus::Failed.iri());
        let tasks_update = format!(
            "{prefixes}
DELETE {{
  GRAPH {graph} {{
    ?task adms:status ?taskStatus .
  }}
}}
INSERT {{
  GRAPH {graph} {{
    ?task adms:status {failed} .
  }}
}}
WHERE {{
  GRAPH {graph} {{
    ?task a {task_type} ;
      adms:status ?taskStatus ;
      dct:isPartOf {job} .
    FILTER(?taskStatus != {success})
  }}
}}",
            prefixes = PREFIXES,
            graph = self.graph_iri(),
            failed = failed,
            task_type = escape_iri(TASK_TYPE),
            job = escape_iri(job),
            success = escape_iri(JobStatus::Success.iri()),
        );
        self.store().update(&tasks_update).await?;
        self.update_status(job, JobStatus::Failed).await?;
        warn!(job, "job failed");
        Ok(())
    }

    /// Remove `job`, its tasks and the results containers of those tasks.
    pub async fn cleanup_job(&self, job: &str) -> Result<()> {
        let job_iri = escape_iri(job);
        let containers = format!(
            "{prefixes}
DELETE {{
  GRAPH {graph} {{
    ?container ?p ?o .
  }}
}}
WHERE {{
  GRAPH {graph} {{
    ?task a {task_type} ;
      dct:isPartOf {job} ;
      task:resultsContainer ?container .
    ?container a nfo:DataContainer ;
      ?p ?o .
  }}
}}",
            prefixes = PREFIXES,
            graph = self.graph_iri(),
            task_type = escape_iri(TASK_TYPE),
            job = job_iri,
        );
        let tasks = format!(
            "{prefixes}
DELETE {{
  GRAPH {graph} {{
    ?task ?p ?o .
  }}
}}
WHERE {{
  GRAPH {graph} {{
    ?task a {task_type} ;
      dct:isPartOf {job} ;
      ?p ?o .
  }}
}}",
            prefixes = PREFIXES,
            graph = self.graph_iri(),
            task_type = escape_iri(TASK_TYPE),
            job = job_iri,
        );
        let job_update = format!(
            "DELETE WHERE {{\n  GRAPH {graph} {{\n    {job} ?p ?o .\n  }}\n}}",
            graph = self.graph_iri(),
            job = job_iri,
        );

        for update in [containers, tasks, job_update] {
            self.store().update(&update).await?;
        }
        info!(job, "cleaned up job");
        Ok(())
    }

    /// Fail our jobs for `operation` that are still busy, recording `message` on each.
    /// Runs never overlap, so such a job was interrupted. Returns the failed jobs.
    pub async fn fail_stale_jobs(&self, operation: &str, message: &str) -> Result<Vec<String>> {
        let stale = self.get_jobs(operation, &[JobStatus::Busy], &[], None).await?;
        let mut failed = Vec::new();
        for job in stale.into_iter().filter(|job| job.creator == self.creator()) {
            warn!(job = %job.uri, operation, "failing job left busy by an earlier run");
            self.create_job_error(&job.uri, message).await?;
            self.fail_job(&job.uri).await?;
            failed.push(job.uri);
        }
        Ok(failed)
    }

    /// Record `message` as the error of `job`. Returns the error IRI.
    pub async fn create_job_error(&self, job: &str, message: &str) -> Result<String> {
        warn!(job, error = message, "recording job error");
        self.insert_error(message, Some(job)).await
    }
}
