//! The job/task ledger, persisted in the triplestore.
//!
//! Every run is a job; every delta file a run consumes is a task of that job. Tasks record
//! the file they consumed in a results container, and the most recent successful one is the
//! checkpoint the next run starts from.
//!
//! Status moves `Scheduled -> Busy -> {Success | Failed}`.

pub mod checkpoint;
pub mod job;
pub mod task;
pub mod vocab;

pub use checkpoint::resolve_checkpoint;
pub use job::Job;
pub use task::Task;
pub use vocab::JobStatus;

use crate::core::{escape_iri, escape_string};
use crate::querying::query_processing::SparqlStore;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;
use vocab::{datetime_literal, ERROR_TYPE, ERROR_URI_PREFIX, PREFIXES};

pub struct Ledger {
    store: Arc<dyn SparqlStore>,
    graph: String,
    creator: String,
    service_name: String,
}

impl Ledger {
    /// # Arguments
    /// * `store` - Store holding the jobs graph
    /// * `graph` - The jobs graph
    /// * `creator` - IRI recorded as `dct:creator` of every job, and used to find our own jobs
    /// * `service_name` - Recorded on errors that do not belong to a job
    pub fn new(
        store: Arc<dyn SparqlStore>,
        graph: impl Into<String>,
        creator: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            graph: graph.into(),
            creator: creator.into(),
            service_name: service_name.into(),
        }
    }

    pub fn graph(&self) -> &str {
        &self.graph
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub(crate) fn store(&self) -> &Arc<dyn SparqlStore> {
        &self.store
    }

    pub(crate) fn graph_iri(&self) -> String {
        escape_iri(&self.graph)
    }

    /// Set the status of a job or task and bump its `dct:modified`.
    pub async fn update_status(&self, subject: &str, status: JobStatus) -> Result<()> {
        debug!(subject, %status, "updating status");
        let update = format!(
            "{prefixes}
DELETE {{
  GRAPH ?g {{
    ?subject adms:status ?status ;
      dct:modified ?modified .
  }}
}}
INSERT {{
  GRAPH ?g {{
    ?subject adms:status {status} ;
      dct:modified {modified} .
  }}
}}
WHERE {{
  BIND({subject} AS ?subject)
  BIND({graph} AS ?g)
  GRAPH ?g {{
    ?subject adms:status ?status .
    OPTIONAL {{ ?subject dct:modified ?modified . }}
  }}
}}",
            prefixes = PREFIXES,
            status = escape_iri(status.iri()),
            modified = datetime_literal(&Utc::now()),
            subject = escape_iri(subject),
            graph = self.graph_iri(),
        );
        self.store.update(&update).await?;
        Ok(())
    }

    /// Record an error that does not belong to a job. Returns the error IRI.
    pub async fn create_error(&self, message: &str) -> Result<String> {
        error!(service = %self.service_name, "{}", message);
        self.insert_error(message, None).await
    }

    pub(crate) async fn insert_error(&self, message: &str, job: Option<&str>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let uri = format!("{}{}", ERROR_URI_PREFIX, id);
        let job_link = job
            .map(|job| format!("{} task:error {} .", escape_iri(job), escape_iri(&uri)))
            .unwrap_or_default();
        let update = format!(
            "{prefixes}
INSERT DATA {{
  GRAPH {graph} {{
    {error} a {error_type} ;
      mu:uuid {id} ;
      dct:subject {service} ;
      oslc:message {message} ;
      dct:created {created} ;
      dct:creator {creator} .
    {job_link}
  }}
}}",
            prefixes = PREFIXES,
            graph = self.graph_iri(),
            error = escape_iri(&uri),
            error_type = escape_iri(ERROR_TYPE),
            id = escape_string(&id),
            service = escape_string(&self.service_name),
            message = escape_string(message),
            created = datetime_literal(&Utc::now()),
            creator = escape_iri(&self.creator),
        );
        self.store.update(&update).await?;
        Ok(uri)
    }
}
