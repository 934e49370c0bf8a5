use crate::core::{escape_iri, escape_string};
use crate::ledger::job::{required_datetime, required_status};
use crate::ledger::vocab::{
    datetime_literal, parse_datetime, JobStatus, CONTAINER_TYPE, CONTAINER_URI_PREFIX, DELTAFILE_INFO,
    DELTA_SYNC_TASK_OPERATION, PREFIXES, TASK_TYPE, TASK_URI_PREFIX,
};
use crate::ledger::Ledger;
use crate::querying::query_processing::{binding_iri, binding_value};
use crate::sources::delta_source::DeltaFile;
use crate::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

const DEPENDS_ON: &str = "http://vocab.deri.ie/cogs#dependsOn";
const INPUT_CONTAINER: &str = "http://redpencil.data.gift/vocabularies/tasks/inputContainer";
const RESULTS_CONTAINER: &str = "http://redpencil.data.gift/vocabularies/tasks/resultsContainer";

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub uri: String,
    pub job: String,
    pub index: u32,
    pub operation: String,
    pub status: JobStatus,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub depends_on: Vec<String>,
    pub input_containers: Vec<String>,
    pub results_containers: Vec<String>,
}

impl Ledger {
    /// Create a task of `job`. Returns the task IRI.
    pub async fn create_task(
        &self,
        job: &str,
        index: u32,
        operation: &str,
        status: JobStatus,
        depends_on: &[String],
        input_containers: &[String],
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let uri = format!("{}{}", TASK_URI_PREFIX, id);
        let update =
            self.task_insert(&uri, &id, job, index, operation, status, depends_on, input_containers, "");
        self.store().update(&update).await?;
        debug!(task = %uri, job, index, %status, "created task");
        Ok(uri)
    }

    /// Create a delta-sync task whose results container records `file`, the checkpoint
    /// payload. `parent` is the task this one depends on.
    pub async fn create_delta_sync_task(
        &self,
        job: &str,
        index: u32,
        status: JobStatus,
        file: &DeltaFile,
        parent: Option<&str>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let uri = format!("{}{}", TASK_URI_PREFIX, id);
        let container_id = Uuid::new_v4().to_string();
        let container = format!("{}{}", CONTAINER_URI_PREFIX, container_id);
        let container_triples = format!(
            "{container} a {container_type} ;
      mu:uuid {container_id} ;
      dct:subject {info} ;
      ext:hasDeltafileTimestamp {timestamp} ;
      ext:hasDeltafileId {file_id} ;
      ext:hasDeltafileName {file_name} .
    {task} task:resultsContainer {container} .",
            container = escape_iri(&container),
            container_type = escape_iri(CONTAINER_TYPE),
            container_id = escape_string(&container_id),
            info = escape_iri(DELTAFILE_INFO),
            timestamp = datetime_literal(&file.created),
            file_id = escape_string(&file.id),
            file_name = escape_string(&file.name),
            task = escape_iri(&uri),
        );
        let depends_on: Vec<String> = parent.into_iter().map(str::to_string).collect();
        let update = self.task_insert(
            &uri,
            &id,
            job,
            index,
            DELTA_SYNC_TASK_OPERATION,
            status,
            &depends_on,
            &[],
            &container_triples,
        );
        self.store().update(&update).await?;
        debug!(task = %uri, job, index, file = %file.name, "created delta sync task");
        Ok(uri)
    }

    #[allow(clippy::too_many_arguments)]
    fn task_insert(
        &self,
        uri: &str,
        id: &str,
        job: &str,
        index: u32,
        operation: &str,
        status: JobStatus,
        depends_on: &[String],
        input_containers: &[String],
        extra: &str,
    ) -> String {
        let task = escape_iri(uri);
        let links = depends_on
            .iter()
            .map(|dependency| format!("{} cogs:dependsOn {} .", task, escape_iri(dependency)))
            .chain(
                input_containers
                    .iter()
                    .map(|container| format!("{} task:inputContainer {} .", task, escape_iri(container))),
            )
            .collect::<Vec<_>>()
            .join("\n    ");
        let created = datetime_literal(&Utc::now());
        format!(
            "{prefixes}
INSERT DATA {{
  GRAPH {graph} {{
    {task} a {task_type} ;
      mu:uuid {id} ;
      dct:isPartOf {job} ;
      dct:created {created} ;
      dct:modified {created} ;
      adms:status {status} ;
      task:index {index} ;
      task:operation {operation} .
    {links}
    {extra}
  }}
}}",
            prefixes = PREFIXES,
            graph = self.graph_iri(),
            task = task,
            task_type = escape_iri(TASK_TYPE),
            id = escape_string(id),
            job = escape_iri(job),
            created = created,
            status = escape_iri(status.iri()),
            index = escape_string(&index.to_string()),
            operation = escape_iri(operation),
            links = links,
            extra = extra,
        )
    }

    /// The tasks of `job`, ordered by index.
    pub async fn load_tasks(&self, job: &str) -> Result<Vec<Task>> {
        let query = format!(
            "{prefixes}
SELECT DISTINCT ?task ?index ?operation ?status ?created ?modified WHERE {{
  GRAPH {graph} {{
    ?task a {task_type} ;
      dct:isPartOf {job} ;
      task:index ?index ;
      task:operation ?operation ;
      adms:status ?status ;
      dct:created ?created ;
      dct:modified ?modified .
  }}
}}",
            prefixes = PREFIXES,
            graph = self.graph_iri(),
            task_type = escape_iri(TASK_TYPE),
            job = escape_iri(job),
        );

        let mut tasks = Vec::new();
        for row in self.store().query(&query).await? {
            let Some(uri) = binding_iri(&row, "task") else {
                continue;
            };
            let index = binding_value(&row, "index").and_then(|i| i.parse().ok()).unwrap_or_else(|| {
                warn!(task = uri, "task without a numeric index");
                u32::MAX
            });
            let mut task = Task {
                uri: uri.to_string(),
                job: job.to_string(),
                index,
                operation: binding_iri(&row, "operation").unwrap_or_default().to_string(),
                status: required_status(&row, "status")?,
                created: required_datetime(&row, "created")?,
                modified: required_datetime(&row, "modified")?,
                depends_on: Vec::new(),
                input_containers: Vec::new(),
                results_containers: Vec::new(),
            };
            self.load_task_links(&mut task).await?;
            tasks.push(task);
        }
        tasks.sort_by_key(|task| task.index);
        Ok(tasks)
    }

    async fn load_task_links(&self, task: &mut Task) -> Result<()> {
        let query = format!(
            "SELECT ?p ?o WHERE {{
  GRAPH {graph} {{
    {task} ?p ?o .
    FILTER(?p IN ({depends_on}, {input}, {results}))
  }}
}}",
            graph = self.graph_iri(),
            task = escape_iri(&task.uri),
            depends_on = escape_iri(DEPENDS_ON),
            input = escape_iri(INPUT_CONTAINER),
            results = escape_iri(RESULTS_CONTAINER),
        );
        for row in self.store().query(&query).await? {
            let (Some(predicate), Some(object)) = (binding_iri(&row, "p"), binding_iri(&row, "o")) else {
                continue;
            };
            let target = match predicate {
                DEPENDS_ON => &mut task.depends_on,
                INPUT_CONTAINER => &mut task.input_containers,
                _ => &mut task.results_containers,
            };
            target.push(object.to_string());
        }
        Ok(())
    }

    /// The delta files recorded in the results containers of `task`.
    pub async fn delta_files_for_task(&self, task: &str) -> Result<Vec<DeltaFile>> {
        let query = format!(
            "{prefixes}
SELECT DISTINCT ?id ?name ?created WHERE {{
  GRAPH {graph} {{
    {task} task:resultsContainer ?container .
    ?container a nfo:DataContainer ;
      dct:subject {info} ;
      ext:hasDeltafileId ?id ;
      ext:hasDeltafileName ?name ;
      ext:hasDeltafileTimestamp ?created .
  }}
}}",
            prefixes = PREFIXES,
            graph = self.graph_iri(),
            task = escape_iri(task),
            info = escape_iri(DELTAFILE_INFO),
        );
        Ok(self
            .store()
            .query(&query)
            .await?
            .iter()
            .filter_map(|row| {
                Some(DeltaFile {
                    id: binding_value(row, "id")?.to_string(),
                    name: binding_value(row, "name")?.to_string(),
                    created: parse_datetime(binding_value(row, "created")?)?,
                    format: None,
                })
            })
            .collect())
    }
}
