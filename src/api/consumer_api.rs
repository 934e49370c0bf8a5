use crate::{
    config::ConsumerConfig,
    context::{enrichment::TypeScope, ContextConfig, ContextEnricher},
    dispatch::{CustomDispatch, DispatchStrategy, Dispatcher, NoOpDispatch, SingleGraphDispatch},
    execution::{
        cleanup::delete_delta_files_for_job, DeltaCleanup, DeltaPipeline, DeltaSync, InitialSync,
        RunOutcome, Runs, SyncSettings, Trigger,
    },
    ledger::Ledger,
    mapping::MappingEngine,
    parsing::RuleCompiler,
    querying::{
        query_processing::SparqlStore, retry::RetryingStore, sparql_client::SparqlClient,
    },
    registry::RuleRegistry,
    sources::{DeltaSource, DumpSource, ProducerClient},
    storage::LandingZone,
    Error, Result,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The stores the consumer talks to. They may all be the same store.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn SparqlStore>,
    pub landing_zone: Arc<dyn SparqlStore>,
    /// Receives dispatched statements. Mapping rules read the landing zone graph through it.
    pub target: Arc<dyn SparqlStore>,
}

impl Stores {
    pub fn shared(store: Arc<dyn SparqlStore>) -> Self {
        Self { jobs: store.clone(), landing_zone: store.clone(), target: store }
    }

    /// HTTP clients for the configured endpoints, retrying transient failures.
    pub fn from_config(config: &ConsumerConfig) -> Result<Self> {
        let connect = |endpoint: &str| -> Result<Arc<dyn SparqlStore>> {
            let client: Arc<dyn SparqlStore> = Arc::new(SparqlClient::new(endpoint)?);
            Ok(Arc::new(RetryingStore::new(client, config.retry)))
        };
        Ok(Self {
            jobs: connect(&config.database_endpoint)?,
            landing_zone: connect(config.landing_zone_endpoint())?,
            target: connect(config.target_endpoint())?,
        })
    }
}

/// Top-level API tying the ledger, the producer and the processing pipeline together.
pub struct DeltaConsumer {
    ledger: Arc<Ledger>,
    delta_source: Arc<dyn DeltaSource>,
    pipeline: Arc<DeltaPipeline>,
    settings: SyncSettings,
    delta_sync: DeltaSync,
    initial_sync: InitialSync,
    cleanup: DeltaCleanup,
}

impl DeltaConsumer {
    /// Wire the consumer from configuration: HTTP stores and the producer client.
    pub fn from_config(config: &ConsumerConfig) -> Result<Self> {
        config.validate()?;
        let stores = Stores::from_config(config)?;
        let producer = Arc::new(ProducerClient::new(config.producer.clone())?);
        Self::with_components(config, stores, producer.clone(), producer)
    }

    pub fn with_components(
        config: &ConsumerConfig,
        stores: Stores,
        delta_source: Arc<dyn DeltaSource>,
        dump_source: Arc<dyn DumpSource>,
    ) -> Result<Self> {
        let ledger = Arc::new(Ledger::new(
            stores.jobs.clone(),
            config.jobs_graph.clone(),
            config.job_creator_uri.clone(),
            config.service_name.clone(),
        ));

        let landing_zone = config.maintains_landing_zone().then(|| {
            LandingZone::new(stores.landing_zone.clone(), config.landing_zone_graph.clone())
                .with_batch_size(config.batch_size)
        });
        let enricher = if config.enable_delta_context {
            let context = match &config.context_config {
                Some(path) => ContextConfig::from_file(path)?,
                None => ContextConfig::types_only(TypeScope::Inserts, false),
            };
            Some(ContextEnricher::new(
                Arc::new(context),
                stores.landing_zone.clone(),
                config.landing_zone_graph.clone(),
            ))
        } else {
            None
        };
        let dispatcher = build_dispatcher(config, &stores)?;
        info!(
            dispatch = dispatcher.name(),
            landing_zone = landing_zone.is_some(),
            context = enricher.is_some(),
            "delta consumer configured"
        );

        let pipeline = Arc::new(DeltaPipeline::new(dispatcher, landing_zone, enricher));
        let settings = SyncSettings::from(config);
        Ok(Self {
            delta_sync: DeltaSync::new(ledger.clone(), delta_source.clone(), pipeline.clone(), settings.clone()),
            initial_sync: InitialSync::new(ledger.clone(), dump_source, pipeline.clone(), settings.clone()),
            cleanup: DeltaCleanup::new(ledger.clone(), delta_source.clone(), settings.clone()),
            ledger,
            delta_source,
            pipeline,
            settings,
        })
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn pipeline(&self) -> &Arc<DeltaPipeline> {
        &self.pipeline
    }

    pub async fn run_delta_sync(&self) -> RunOutcome {
        self.delta_sync.run().await
    }

    pub async fn run_initial_sync(&self) -> RunOutcome {
        self.initial_sync.run().await
    }

    pub async fn run_cleanup(&self) -> RunOutcome {
        self.cleanup.run().await
    }

    /// Remove every initial-sync and delta-sync job, and empty the landing zone.
    ///
    /// Dispatched data is left alone.
    pub async fn flush(&self) -> RunOutcome {
        match self.try_flush().await {
            Ok(jobs) => RunOutcome::Completed { job: None, items: jobs },
            Err(e) => {
                error!(error = %e, "flush failed");
                if let Err(record) = self.ledger.create_error(&format!("Error during flush: {}", e)).await {
                    error!(error = %record, "could not record flush error");
                }
                RunOutcome::Failed { job: None, error: e.to_string() }
            }
        }
    }

    async fn try_flush(&self) -> Result<usize> {
        info!("starting flush");
        let mut removed = 0;
        for operation in [&self.settings.initial_sync_job_operation, &self.settings.delta_sync_job_operation] {
            for job in self.ledger.get_jobs(operation, &[], &[], None).await? {
                delete_delta_files_for_job(&self.ledger, self.delta_source.as_ref(), &job.uri).await?;
                self.ledger.cleanup_job(&job.uri).await?;
                removed += 1;
            }
        }
        if let Some(landing_zone) = self.pipeline.landing_zone() {
            landing_zone.flush().await?;
        }
        info!(jobs = removed, "flush done");
        Ok(removed)
    }

    pub async fn delete_initial_sync_jobs(&self) -> Result<usize> {
        let jobs = self.ledger.get_jobs(&self.settings.initial_sync_job_operation, &[], &[], None).await?;
        for job in &jobs {
            self.ledger.cleanup_job(&job.uri).await?;
        }
        warn!(jobs = jobs.len(), "removed initial sync jobs");
        Ok(jobs.len())
    }
}

fn build_dispatcher(config: &ConsumerConfig, stores: &Stores) -> Result<Arc<dyn Dispatcher>> {
    let dispatcher: Arc<dyn Dispatcher> = match config.effective_dispatch_strategy() {
        DispatchStrategy::SingleGraph => Arc::new(SingleGraphDispatch::new(
            stores.target.clone(),
            config.target_graph.clone(),
            config.batch_size,
        )),
        DispatchStrategy::Custom => {
            let target_graph = config
                .target_graph
                .clone()
                .ok_or_else(|| Error::Config("remapping needs a target graph".to_string()))?;
            let compiler = RuleCompiler::new(config.landing_zone_graph.clone(), target_graph);
            let registry = Arc::new(RuleRegistry::from_folder(compiler, &config.mapping_query_folder));
            // A malformed rule must stop the consumer before it consumes anything.
            registry.rules()?;
            let engine = MappingEngine::new(registry, stores.target.clone(), config.binding_policy());
            Arc::new(CustomDispatch::new(Arc::new(engine)))
        }
        DispatchStrategy::NoOp => Arc::new(NoOpDispatch),
    };
    Ok(dispatcher)
}

#[async_trait]
impl Runs for DeltaConsumer {
    async fn run(&self, trigger: Trigger) -> RunOutcome {
        match trigger {
            Trigger::InitialSync => self.run_initial_sync().await,
            Trigger::DeltaSync => self.run_delta_sync().await,
            Trigger::Cleanup => self.run_cleanup().await,
            Trigger::Flush => self.flush().await,
        }
    }
}
