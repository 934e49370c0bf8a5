//! Consumer configuration.
//!
//! Every knob of the consumer lives in [`ConsumerConfig`]. The binary fills it from command
//! line flags and their environment variables; tests build it from [`Default`].

use crate::dispatch::DispatchStrategy;
use crate::ledger::vocab::{DEFAULT_DELTA_SYNC_JOB_OPERATION, DEFAULT_INITIAL_SYNC_JOB_OPERATION};
use crate::mapping::BindingPolicy;
use crate::querying::retry::RetryPolicy;
use crate::sources::ProducerConfig;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub service_name: String,
    /// Recorded as `dct:creator` on every job; only jobs with this creator are considered ours.
    pub job_creator_uri: String,
    pub jobs_graph: String,
    pub delta_sync_job_operation: String,
    pub initial_sync_job_operation: String,

    pub producer: ProducerConfig,
    /// Delta files created at or before this moment are never consumed.
    pub start_from_delta_timestamp: Option<DateTime<Utc>>,

    pub disable_initial_sync: bool,
    pub disable_delta_ingest: bool,
    pub wait_for_initial_sync: bool,
    /// Days to keep finished delta-sync jobs. `-1` keeps them forever.
    pub delta_jobs_retention_days: i64,

    pub landing_zone_graph: String,
    /// `None` writes single-graph dispatched statements into their own graph.
    pub target_graph: Option<String>,
    pub database_endpoint: String,
    pub landing_zone_database_endpoint: Option<String>,
    pub target_database_endpoint: Option<String>,

    pub enable_delta_context: bool,
    pub enable_triple_remapping: bool,
    pub dispatch_strategy: DispatchStrategy,
    pub mapping_query_folder: PathBuf,
    /// JSON context configuration. Without it, enrichment only adds types for inserts.
    pub context_config: Option<PathBuf>,
    pub bind_all_on_insert: bool,

    pub batch_size: usize,
    pub retry: RetryPolicy,

    pub delta_sync_interval: Duration,
    /// `None` disables the periodic cleanup.
    pub delta_cleanup_interval: Option<Duration>,
    /// How long `POST /flush` waits before it starts deleting.
    pub flush_grace_period: Duration,

    pub host: String,
    pub port: u16,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            service_name: "delta-consumer".to_string(),
            job_creator_uri: "http://redpencil.data.gift/services/delta-consumer".to_string(),
            jobs_graph: "http://mu.semte.ch/graphs/system/jobs".to_string(),
            delta_sync_job_operation: DEFAULT_DELTA_SYNC_JOB_OPERATION.to_string(),
            initial_sync_job_operation: DEFAULT_INITIAL_SYNC_JOB_OPERATION.to_string(),
            producer: ProducerConfig::default(),
            start_from_delta_timestamp: None,
            disable_initial_sync: false,
            disable_delta_ingest: false,
            wait_for_initial_sync: true,
            delta_jobs_retention_days: -1,
            landing_zone_graph: "http://mu.semte.ch/graphs/landing-zone".to_string(),
            target_graph: None,
            database_endpoint: "http://database:8890/sparql".to_string(),
            landing_zone_database_endpoint: None,
            target_database_endpoint: None,
            enable_delta_context: false,
            enable_triple_remapping: false,
            dispatch_strategy: DispatchStrategy::SingleGraph,
            mapping_query_folder: PathBuf::from("/config/mapping"),
            context_config: None,
            bind_all_on_insert: false,
            batch_size: 100,
            retry: RetryPolicy::default(),
            delta_sync_interval: Duration::from_secs(60),
            delta_cleanup_interval: Some(Duration::from_secs(24 * 60 * 60)),
            flush_grace_period: Duration::from_secs(30),
            host: "0.0.0.0".to_string(),
            port: 80,
        }
    }
}

impl ConsumerConfig {
    /// Remapping runs when it is switched on or when the custom dispatch is selected.
    pub fn remapping_enabled(&self) -> bool {
        self.enable_triple_remapping || self.dispatch_strategy == DispatchStrategy::Custom
    }

    pub fn maintains_landing_zone(&self) -> bool {
        self.enable_delta_context || self.remapping_enabled()
    }

    pub fn effective_dispatch_strategy(&self) -> DispatchStrategy {
        if self.enable_triple_remapping {
            DispatchStrategy::Custom
        } else {
            self.dispatch_strategy
        }
    }

    pub fn binding_policy(&self) -> BindingPolicy {
        if self.bind_all_on_insert {
            BindingPolicy::All
        } else {
            BindingPolicy::SubjectOnly
        }
    }

    pub fn landing_zone_endpoint(&self) -> &str {
        self.landing_zone_database_endpoint.as_deref().unwrap_or(&self.database_endpoint)
    }

    pub fn target_endpoint(&self) -> &str {
        self.target_database_endpoint.as_deref().unwrap_or(&self.database_endpoint)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("max retry attempts must be at least 1".to_string()));
        }
        if self.delta_jobs_retention_days < -1 {
            return Err(Error::Config(format!(
                "invalid delta job retention period {}, use -1 to keep jobs forever",
                self.delta_jobs_retention_days
            )));
        }
        if self.producer.base_url.is_empty() && !(self.disable_delta_ingest && self.disable_initial_sync) {
            return Err(Error::Config("a producer base url is required to sync".to_string()));
        }
        if self.producer.login_endpoint.is_some() != self.producer.secret_key.is_some() {
            return Err(Error::Config(
                "the login endpoint and the secret key must be configured together".to_string(),
            ));
        }
        if self.remapping_enabled() && !self.mapping_query_folder.is_dir() {
            return Err(Error::Config(format!(
                "mapping query folder {} does not exist",
                self.mapping_query_folder.display()
            )));
        }
        Ok(())
    }
}
