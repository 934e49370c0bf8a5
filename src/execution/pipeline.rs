//! The per-message processing pipeline shared by delta sync and initial sync.

use crate::context::{ContextEnricher, EnrichedChangeSet, TypeCache};
use crate::core::{ChangeSide, DeltaMessage, Quad};
use crate::dispatch::Dispatcher;
use crate::storage::LandingZone;
use crate::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Counters for one processed message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessedMessage {
    pub changesets: usize,
    pub inserts: usize,
    pub deletes: usize,
    pub context: usize,
}

/// Applies delta messages one at a time.
///
/// For every changeset, in order:
///
/// 1. enrich it against the landing zone as it stood before the changeset
/// 2. dispatch the deletes, then remove them from the landing zone
/// 3. add the inserts to the landing zone, then dispatch them
pub struct DeltaPipeline {
    lock: Mutex<()>,
    landing_zone: Option<LandingZone>,
    enricher: Option<ContextEnricher>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl DeltaPipeline {
    /// # Arguments
    /// * `dispatcher` - Where the statements go once the landing zone is up to date
    /// * `landing_zone` - Mirror of the raw statements, `None` when nothing needs it
    /// * `enricher` - Context lookup, `None` when enrichment is disabled
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        landing_zone: Option<LandingZone>,
        enricher: Option<ContextEnricher>,
    ) -> Self {
        Self { lock: Mutex::new(()), landing_zone, enricher, dispatcher }
    }

    pub fn landing_zone(&self) -> Option<&LandingZone> {
        self.landing_zone.as_ref()
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    pub async fn process_message(&self, message: &DeltaMessage) -> Result<ProcessedMessage> {
        let _guard = self.lock.lock().await;

        let mut cache = TypeCache::from_changesets(message);
        let mut processed = ProcessedMessage::default();
        for changeset in message {
            let enriched = match &self.enricher {
                Some(enricher) => enricher.enrich(changeset, &mut cache).await?,
                None => EnrichedChangeSet::without_context(changeset.clone()),
            };
            self.apply(&enriched).await?;

            processed.changesets += 1;
            processed.inserts += changeset.inserts.len();
            processed.deletes += changeset.deletes.len();
            processed.context += enriched.inserts_context.len() + enriched.deletes_context.len();
        }
        debug!(?processed, dispatch = self.dispatcher.name(), "processed delta message");
        Ok(processed)
    }

    async fn apply(&self, changeset: &EnrichedChangeSet) -> Result<()> {
        let deletes = changeset.original_side(ChangeSide::Deletes);
        if !deletes.is_empty() {
            self.dispatcher
                .dispatch(ChangeSide::Deletes, deletes, changeset.context(ChangeSide::Deletes))
                .await?;
            if let Some(landing_zone) = &self.landing_zone {
                landing_zone.delete(deletes).await?;
            }
        }

        let inserts = changeset.original_side(ChangeSide::Inserts);
        if !inserts.is_empty() {
            if let Some(landing_zone) = &self.landing_zone {
                landing_zone.insert(inserts).await?;
            }
            self.dispatcher
                .dispatch(ChangeSide::Inserts, inserts, changeset.context(ChangeSide::Inserts))
                .await?;
        }
        Ok(())
    }

    /// Mirror and dispatch one batch of a dump.
    pub async fn process_dump_batch(&self, statements: &[Quad]) -> Result<()> {
        let _guard = self.lock.lock().await;
        if let Some(landing_zone) = &self.landing_zone {
            landing_zone.insert(statements).await?;
        }
        self.dispatcher.dispatch_initial_batch(statements).await
    }

    pub async fn finish_initial_sync(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.dispatcher.finish_initial_sync().await
    }
}
