//! Where the next delta-sync run starts.

use crate::core::escape_iri;
use crate::ledger::vocab::{
    parse_datetime, JobStatus, CONTAINER_TYPE, DELTAFILE_INFO, DELTA_SYNC_TASK_OPERATION, JOB_TYPE,
    PREFIXES, TASK_TYPE,
};
use crate::ledger::Ledger;
use crate::querying::query_processing::binding_value;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use tracing::info;

/// Combine the ledger's checkpoint with the configured start timestamp.
///
/// The configured timestamp wins when it is newer, and stands in when the ledger has none.
pub fn resolve_checkpoint(
    from_ledger: Option<DateTime<Utc>>,
    configured: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>> {
    match (from_ledger, configured) {
        (Some(ledger), Some(configured)) if configured > ledger => {
            info!(%configured, %ledger, "configured start timestamp is newer than the ledger's, starting from it");
            Ok(configured)
        }
        (Some(ledger), _) => Ok(ledger),
        (None, Some(configured)) => {
            info!(%configured, "no delta consumed yet, starting from the configured timestamp");
            Ok(configured)
        }
        (None, None) => Err(Error::NoCheckpoint(
            "no successful sync task found and no start timestamp configured".to_string(),
        )),
    }
}

impl Ledger {
    /// The timestamp of the most recent delta file recorded by a successful delta-sync task
    /// of a job of ours running one of `job_operations`.
    pub async fn latest_delta_timestamp(&self, job_operations: &[&str]) -> Result<Option<DateTime<Utc>>> {
        let operations = job_operations.iter().map(|op| escape_iri(op)).collect::<Vec<_>>().join(" ");
        let query = format!(
            "{prefixes}
SELECT DISTINCT ?deltaTimestamp WHERE {{
  VALUES ?operation {{ {operations} }}
  GRAPH {graph} {{
    ?job a {job_type} ;
      task:operation ?operation ;
      dct:creator {creator} .
    ?task a {task_type} ;
      dct:isPartOf ?job ;
      adms:status {success} ;
      task:operation {task_operation} ;
      task:resultsContainer ?resultsContainer .
    ?resultsContainer a {container_type} ;
      dct:subject {info} ;
      ext:hasDeltafileTimestamp ?deltaTimestamp .
  }}
}}
ORDER BY DESC(?deltaTimestamp)
LIMIT 1",
            prefixes = PREFIXES,
            operations = operations,
            graph = self.graph_iri(),
            job_type = escape_iri(JOB_TYPE),
            creator = escape_iri(self.creator()),
            task_type = escape_iri(TASK_TYPE),
            success = escape_iri(JobStatus::Success.iri()),
            task_operation = escape_iri(DELTA_SYNC_TASK_OPERATION),
            container_type = escape_iri(CONTAINER_TYPE),
            info = escape_iri(DELTAFILE_INFO),
        );
        let bindings = self.store().query(&query).await?;
        Ok(bindings.first().and_then(|b| binding_value(b, "deltaTimestamp")).and_then(parse_datetime))
    }

    /// The timestamp after which delta files are still to be consumed.
    pub async fn determine_checkpoint(
        &self,
        job_operations: &[&str],
        configured: Option<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>> {
        let from_ledger = self.latest_delta_timestamp(job_operations).await?;
        resolve_checkpoint(from_ledger, configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_checkpoint() {
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        assert_eq!(resolve_checkpoint(Some(older), Some(newer)).unwrap(), newer);
        assert_eq!(resolve_checkpoint(Some(newer), Some(older)).unwrap(), newer);
        assert_eq!(resolve_checkpoint(Some(older), None).unwrap(), older);
        assert_eq!(resolve_checkpoint(None, Some(older)).unwrap(), older);
        assert!(matches!(resolve_checkpoint(None, None), Err(Error::NoCheckpoint(_))));
    }
}
