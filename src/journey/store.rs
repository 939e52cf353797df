//! Process-wide journey store: durable-backed definitions and contexts,
//! cached through L1 for hot reads.
//!
//! Definitions never change at runtime, so cache invalidation is only
//! required on process restart — nothing here evicts L1 proactively.

use crate::cache::{CacheFacade, CacheTier};
use crate::error::{EngineError, StorageResult};
use crate::journey::{Journey, JourneyContext};
use crate::storage::DurableStore;
use crate::types::{ContextId, JourneyId, SessionId};
use std::sync::Arc;
use tracing::info;

/// Journey definitions plus the active-context lifecycle, backed by a
/// durable store with an L1 cache in front of individual lookups.
pub struct JourneyStore {
    durable: Arc<dyn DurableStore>,
    cache: CacheFacade,
}

impl JourneyStore {
    pub fn new(durable: Arc<dyn DurableStore>, cache: CacheFacade) -> Self {
        Self { durable, cache }
    }

    /// Preload every enabled journey definition into L1, including the
    /// `name→id` mapping used by `get_journey_by_name`.
    pub async fn load_all(&self) -> Result<Vec<Journey>, EngineError> {
        let journeys = self.durable.load_all_journeys().await?;
        for journey in &journeys {
            self.cache_journey(journey).await;
        }
        info!(count = journeys.len(), "loaded journey definitions");
        Ok(journeys)
    }

    /// All enabled journeys, straight from durable storage (used by
    /// callers that need the full current set rather than the cached view,
    /// e.g. the activation matcher enumerating candidates).
    pub async fn get_all_journeys(&self) -> StorageResult<Vec<Journey>> {
        self.durable.load_all_journeys().await
    }

    /// Fetch one journey by id, L1 first, refilling on miss.
    pub async fn get_journey(&self, id: JourneyId) -> StorageResult<Option<Journey>> {
        let cache_key = format!("journey:def:{id}");
        if let Some(cached) = self.cache.get::<Journey>(CacheTier::L1, &cache_key).await {
            return Ok(Some(cached));
        }
        let fetched = self.durable.get_journey(id).await?;
        if let Some(j) = &fetched {
            self.cache_journey(j).await;
        }
        Ok(fetched)
    }

    /// Fetch one journey by name via the cached `name→id` mapping.
    pub async fn get_journey_by_name(&self, name: &str) -> StorageResult<Option<Journey>> {
        let name_key = format!("journey:name:{name}");
        if let Some(id) = self.cache.get::<JourneyId>(CacheTier::L1, &name_key).await {
            return self.get_journey(id).await;
        }
        let fetched = self.durable.get_journey_by_name(name).await?;
        if let Some(j) = &fetched {
            self.cache_journey(j).await;
        }
        Ok(fetched)
    }

    async fn cache_journey(&self, journey: &Journey) {
        self.cache
            .set(CacheTier::L1, &format!("journey:def:{}", journey.id), journey)
            .await;
        self.cache
            .set(
                CacheTier::L1,
                &format!("journey:name:{}", journey.name),
                &journey.id,
            )
            .await;
    }

    /// Create and persist a new context at a journey's initial state.
    pub async fn create_context(
        &self,
        session_id: SessionId,
        journey: &Journey,
    ) -> StorageResult<JourneyContext> {
        let context = JourneyContext::activate(session_id, journey);
        self.durable.create_context(&context).await?;
        Ok(context)
    }

    /// Persist a mutated context (transition, variable set, completion).
    pub async fn update_context(&self, context: &JourneyContext) -> StorageResult<()> {
        self.durable.update_context(context).await
    }

    /// The most recently activated, not-yet-completed context for a session.
    pub async fn get_active_context(
        &self,
        session_id: &SessionId,
    ) -> StorageResult<Option<JourneyContext>> {
        self.durable.get_active_context(session_id).await
    }

    /// A context by id regardless of active/completed state.
    pub async fn get_context(&self, id: ContextId) -> StorageResult<Option<JourneyContext>> {
        self.durable.get_context(id).await
    }
}
