//! Vocabulary of the job/task ledger.

use crate::core::{escape_string, XSD_DATE_TIME};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

pub const JOB_TYPE: &str = "http://vocab.deri.ie/cogs#Job";
pub const TASK_TYPE: &str = "http://redpencil.data.gift/vocabularies/tasks/Task";
pub const ERROR_TYPE: &str = "http://open-services.net/ns/core#Error";
pub const CONTAINER_TYPE: &str = "http://www.semanticdesktop.org/ontologies/2007/03/22/nfo#DataContainer";

pub const JOB_URI_PREFIX: &str = "http://redpencil.data.gift/id/job/";
pub const TASK_URI_PREFIX: &str = "http://redpencil.data.gift/id/task/";
pub const ERROR_URI_PREFIX: &str = "http://redpencil.data.gift/id/jobs/error/";
pub const CONTAINER_URI_PREFIX: &str = "http://redpencil.data.gift/id/container/";

pub const DELTA_SYNC_TASK_OPERATION: &str =
    "http://redpencil.data.gift/id/jobs/concept/TaskOperation/deltas/consumer/deltaSyncing";
pub const INITIAL_SYNC_TASK_OPERATION: &str =
    "http://redpencil.data.gift/id/jobs/concept/TaskOperation/deltas/consumer/initialSyncing";

pub const DEFAULT_DELTA_SYNC_JOB_OPERATION: &str =
    "http://redpencil.data.gift/id/jobs/concept/JobOperation/deltas/consumer/deltaSync";
pub const DEFAULT_INITIAL_SYNC_JOB_OPERATION: &str =
    "http://redpencil.data.gift/id/jobs/concept/JobOperation/deltas/consumer/initialSync";

pub const DELTAFILE_INFO: &str = "http://redpencil.data.gift/id/concept/DeltaSync/DeltafileInfo";

pub const PREFIXES: &str = "PREFIX mu: <http://mu.semte.ch/vocabularies/core/>
PREFIX task: <http://redpencil.data.gift/vocabularies/tasks/>
PREFIX dct: <http://purl.org/dc/terms/>
PREFIX adms: <http://www.w3.org/ns/adms#>
PREFIX ext: <http://mu.semte.ch/vocabularies/ext/>
PREFIX cogs: <http://vocab.deri.ie/cogs#>
PREFIX oslc: <http://open-services.net/ns/core#>
PREFIX nfo: <http://www.semanticdesktop.org/ontologies/2007/03/22/nfo#>
PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Scheduled,
    Busy,
    Success,
    Failed,
}

impl JobStatus {
    pub fn iri(self) -> &'static str {
        match self {
            JobStatus::Scheduled => "http://redpencil.data.gift/id/concept/JobStatus/scheduled",
            JobStatus::Busy => "http://redpencil.data.gift/id/concept/JobStatus/busy",
            JobStatus::Success => "http://redpencil.data.gift/id/concept/JobStatus/success",
            JobStatus::Failed => "http://redpencil.data.gift/id/concept/JobStatus/failed",
        }
    }

    pub fn from_iri(iri: &str) -> Option<Self> {
        [JobStatus::Scheduled, JobStatus::Busy, JobStatus::Success, JobStatus::Failed]
            .into_iter()
            .find(|status| status.iri() == iri)
    }

    pub fn is_final(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::Busy => "busy",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A timestamp as a typed `xsd:dateTime` SPARQL literal.
pub fn datetime_literal(timestamp: &DateTime<Utc>) -> String {
    format!(
        "{}^^<{}>",
        escape_string(&timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)),
        XSD_DATE_TIME
    )
}

pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.with_timezone(&Utc))
}

/// `FILTER(?var IN (...))`, or nothing for an empty list.
pub fn status_filter(variable: &str, statuses: &[JobStatus], negate: bool) -> String {
    if statuses.is_empty() {
        return String::new();
    }
    let iris = statuses.iter().map(|s| format!("<{}>", s.iri())).collect::<Vec<_>>().join(", ");
    format!("FILTER(?{} {}IN ({}))", variable, if negate { "NOT " } else { "" }, iris)
}
