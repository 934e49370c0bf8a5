//! Delta consumer service
//!
//! Runs the initial sync at startup, then delta sync and delta cleanup on an interval, and
//! serves the HTTP debug endpoints.
//!
//! Usage:
//!   delta-consumer --sync-base-url http://producer --target-graph http://mu.semte.ch/graphs/public

use chrono::{DateTime, Utc};
use clap::Parser;
use delta_consumer::{
    api::DeltaConsumer,
    config::ConsumerConfig,
    dispatch::DispatchStrategy,
    execution::{queue::DEFAULT_QUEUE_CAPACITY, ProcessingQueue, Trigger},
    http::{start_server, AppState},
    querying::retry::RetryPolicy,
    sources::ProducerConfig,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "delta-consumer")]
#[command(about = "Consumes RDF delta files and maps them into a target graph", long_about = None)]
struct Args {
    #[arg(long, env = "SERVICE_NAME", default_value = "delta-consumer")]
    service_name: String,

    #[arg(long, env = "JOB_CREATOR_URI", default_value = "http://redpencil.data.gift/services/delta-consumer")]
    job_creator_uri: String,

    #[arg(long, env = "JOBS_GRAPH", default_value = "http://mu.semte.ch/graphs/system/jobs")]
    jobs_graph: String,

    #[arg(long, env = "DELTA_SYNC_JOB_OPERATION")]
    delta_sync_job_operation: Option<String>,

    #[arg(long, env = "INITIAL_SYNC_JOB_OPERATION")]
    initial_sync_job_operation: Option<String>,

    #[arg(long, env = "SYNC_BASE_URL")]
    sync_base_url: String,

    #[arg(long, env = "SYNC_FILES_PATH", default_value = "/sync/files")]
    sync_files_path: String,

    #[arg(long, env = "SYNC_DOWNLOAD_PATH", default_value = "/files/:id/download")]
    sync_download_path: String,

    #[arg(long, env = "SYNC_DATASET_PATH", default_value = "/datasets")]
    sync_dataset_path: String,

    #[arg(long, env = "SYNC_DATASET_SUBJECT")]
    sync_dataset_subject: Option<String>,

    #[arg(long, env = "SYNC_LOGIN_ENDPOINT")]
    sync_login_endpoint: Option<String>,

    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// RFC 3339 timestamp; older delta files are never consumed
    #[arg(long, env = "START_FROM_DELTA_TIMESTAMP")]
    start_from_delta_timestamp: Option<DateTime<Utc>>,

    #[arg(long, env = "DISABLE_INITIAL_SYNC")]
    disable_initial_sync: bool,

    #[arg(long, env = "DISABLE_DELTA_INGEST")]
    disable_delta_ingest: bool,

    #[arg(long, env = "WAIT_FOR_INITIAL_SYNC", default_value_t = true, action = clap::ArgAction::Set)]
    wait_for_initial_sync: bool,

    #[arg(long, env = "KEEP_DELTA_FILES")]
    keep_delta_files: bool,

    #[arg(long, env = "DELTA_FILE_FOLDER", default_value = "/consumer-files")]
    delta_file_folder: PathBuf,

    #[arg(long, env = "DUMP_FILE_FOLDER", default_value = "/consumer-files/dumps")]
    dump_file_folder: PathBuf,

    /// Days to keep finished delta sync jobs, -1 keeps them forever
    #[arg(long, env = "DELTA_JOBS_RETENTION_PERIOD", default_value_t = -1, allow_negative_numbers = true)]
    delta_jobs_retention_period: i64,

    #[arg(long, env = "LANDING_ZONE_GRAPH", default_value = "http://mu.semte.ch/graphs/landing-zone")]
    landing_zone_graph: String,

    #[arg(long, env = "TARGET_GRAPH")]
    target_graph: Option<String>,

    #[arg(long, env = "DATABASE_ENDPOINT", default_value = "http://database:8890/sparql")]
    database_endpoint: String,

    #[arg(long, env = "LANDING_ZONE_DATABASE_ENDPOINT")]
    landing_zone_database_endpoint: Option<String>,

    #[arg(long, env = "TARGET_DATABASE_ENDPOINT")]
    target_database_endpoint: Option<String>,

    #[arg(long, env = "ENABLE_DELTA_CONTEXT")]
    enable_delta_context: bool,

    #[arg(long, env = "ENABLE_TRIPLE_REMAPPING")]
    enable_triple_remapping: bool,

    #[arg(long, env = "DISPATCH_STRATEGY", value_enum, default_value_t = DispatchStrategy::SingleGraph)]
    dispatch_strategy: DispatchStrategy,

    #[arg(long, env = "MAPPING_QUERY_FOLDER", default_value = "/config/mapping")]
    mapping_query_folder: PathBuf,

    /// JSON file with prefixes, addTypes and contextQueries
    #[arg(long, env = "CONTEXT_CONFIG")]
    context_config: Option<PathBuf>,

    #[arg(long, env = "BIND_ALL_ON_INSERT")]
    bind_all_on_insert: bool,

    #[arg(long, env = "BATCH_SIZE", default_value = "100")]
    batch_size: usize,

    #[arg(long, env = "MAX_DB_RETRY_ATTEMPTS", default_value = "5")]
    max_db_retry_attempts: u32,

    #[arg(long, env = "DB_RETRY_DELAY_SECS", default_value = "30")]
    db_retry_delay_secs: u64,

    #[arg(long, env = "DELTA_SYNC_INTERVAL_SECS", default_value = "60")]
    delta_sync_interval_secs: u64,

    /// 0 disables the periodic cleanup
    #[arg(long, env = "DELTA_CLEANUP_INTERVAL_SECS", default_value = "86400")]
    delta_cleanup_interval_secs: u64,

    #[arg(long, env = "FLUSH_GRACE_PERIOD_SECS", default_value = "30")]
    flush_grace_period_secs: u64,

    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, env = "PORT", default_value = "80")]
    port: u16,
}

impl Args {
    fn into_config(self) -> ConsumerConfig {
        let defaults = ConsumerConfig::default();
        ConsumerConfig {
            service_name: self.service_name,
            job_creator_uri: self.job_creator_uri,
            jobs_graph: self.jobs_graph,
            delta_sync_job_operation: self.delta_sync_job_operation.unwrap_or(defaults.delta_sync_job_operation),
            initial_sync_job_operation: self
                .initial_sync_job_operation
                .unwrap_or(defaults.initial_sync_job_operation),
            producer: ProducerConfig {
                base_url: self.sync_base_url,
                files_path: self.sync_files_path,
                download_path: self.sync_download_path,
                dataset_path: self.sync_dataset_path,
                dataset_subject: self.sync_dataset_subject,
                login_endpoint: self.sync_login_endpoint,
                secret_key: self.secret_key,
                delta_file_folder: self.delta_file_folder,
                dump_file_folder: self.dump_file_folder,
                keep_delta_files: self.keep_delta_files,
                ..defaults.producer
            },
            start_from_delta_timestamp: self.start_from_delta_timestamp,
            disable_initial_sync: self.disable_initial_sync,
            disable_delta_ingest: self.disable_delta_ingest,
            wait_for_initial_sync: self.wait_for_initial_sync,
            delta_jobs_retention_days: self.delta_jobs_retention_period,
            landing_zone_graph: self.landing_zone_graph,
            target_graph: self.target_graph,
            database_endpoint: self.database_endpoint,
            landing_zone_database_endpoint: self.landing_zone_database_endpoint,
            target_database_endpoint: self.target_database_endpoint,
            enable_delta_context: self.enable_delta_context,
            enable_triple_remapping: self.enable_triple_remapping,
            dispatch_strategy: self.dispatch_strategy,
            mapping_query_folder: self.mapping_query_folder,
            context_config: self.context_config,
            bind_all_on_insert: self.bind_all_on_insert,
            batch_size: self.batch_size,
            retry: RetryPolicy::new(self.max_db_retry_attempts, Duration::from_secs(self.db_retry_delay_secs)),
            delta_sync_interval: Duration::from_secs(self.delta_sync_interval_secs.max(1)),
            delta_cleanup_interval: (self.delta_cleanup_interval_secs > 0)
                .then(|| Duration::from_secs(self.delta_cleanup_interval_secs)),
            flush_grace_period: Duration::from_secs(self.flush_grace_period_secs),
            host: self.host,
            port: self.port,
        }
    }
}

/// Submit `trigger` every `period`, starting one period from now.
fn schedule(queue: Arc<ProcessingQueue>, trigger: Trigger, period: Duration) {
    tokio::spawn(async move {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticks.tick().await;
            info!(%trigger, "triggered by schedule");
            queue.submit(trigger);
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Args::parse().into_config();
    info!(service = %config.service_name, producer = %config.producer.base_url, "starting delta consumer");

    let consumer = Arc::new(DeltaConsumer::from_config(&config)?);
    let queue = Arc::new(ProcessingQueue::start(consumer.clone(), DEFAULT_QUEUE_CAPACITY));

    queue.submit(Trigger::InitialSync);
    schedule(Arc::clone(&queue), Trigger::DeltaSync, config.delta_sync_interval);
    if let Some(period) = config.delta_cleanup_interval {
        schedule(Arc::clone(&queue), Trigger::Cleanup, period);
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        consumer,
        queue,
        service_name: config.service_name.clone(),
        flush_grace_period: config.flush_grace_period,
    };

    tokio::select! {
        result = start_server(&addr, state) => {
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "could not listen for the shutdown signal");
            }
            info!("shutdown signal received, stopping");
        }
    }

    Ok(())
}
