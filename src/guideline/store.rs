//! Process-wide guideline store: durable-store-backed definitions plus an
//! in-memory inverted keyword index.
//!
//! The inverted index is rebuilt wholesale on `load_all` and is purely an
//! accelerator for the stage-1 keyword pre-filter — `get_guidelines_by_scope`
//! (delegated straight to the durable store) remains the authoritative
//! scope filter.

use crate::cache::{CacheFacade, CacheTier};
use crate::error::{EngineError, StorageResult};
use crate::guideline::Guideline;
use crate::storage::DurableStore;
use crate::types::{GuidelineId, JourneyId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Guideline definitions plus the keyword accelerator index.
pub struct GuidelineStore {
    durable: Arc<dyn DurableStore>,
    cache: CacheFacade,
    keyword_index: RwLock<HashMap<String, HashSet<GuidelineId>>>,
}

impl GuidelineStore {
    /// Construct a store over a durable backend and cache facade.
    pub fn new(durable: Arc<dyn DurableStore>, cache: CacheFacade) -> Self {
        Self {
            durable,
            cache,
            keyword_index: RwLock::new(HashMap::new()),
        }
    }

    /// Load every enabled guideline from durable storage, refresh the L1
    /// cache of individual definitions, and rebuild the keyword index from
    /// scratch. Never performed incrementally — a changed guideline set is
    /// only picked up by calling this again (e.g. at startup or redeploy).
    pub async fn load_all(&self) -> Result<Vec<Guideline>, EngineError> {
        let guidelines = self.durable.load_all_guidelines().await?;

        let mut index: HashMap<String, HashSet<GuidelineId>> = HashMap::new();
        for guideline in &guidelines {
            self.cache
                .set(
                    CacheTier::L1,
                    &format!("guideline:def:{}", guideline.id),
                    guideline,
                )
                .await;
            for keyword in &guideline.keywords {
                index
                    .entry(keyword.clone())
                    .or_default()
                    .insert(guideline.id);
            }
        }

        *self.keyword_index.write().await = index;
        info!(count = guidelines.len(), "loaded guideline definitions");
        Ok(guidelines)
    }

    /// Fetch one guideline, L1 cache first, falling back to durable storage.
    pub async fn get_guideline(&self, id: GuidelineId) -> StorageResult<Option<Guideline>> {
        let cache_key = format!("guideline:def:{id}");
        if let Some(cached) = self.cache.get::<Guideline>(CacheTier::L1, &cache_key).await {
            return Ok(Some(cached));
        }
        let fetched = self.durable.get_guideline(id).await?;
        if let Some(g) = &fetched {
            self.cache.set(CacheTier::L1, &cache_key, g).await;
        }
        Ok(fetched)
    }

    /// Fetch several guidelines by id, skipping any that are missing
    /// (disabled or deleted since the index was built).
    pub async fn get_guidelines_by_ids(
        &self,
        ids: &HashSet<GuidelineId>,
    ) -> StorageResult<Vec<Guideline>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(g) = self.get_guideline(*id).await? {
                out.push(g);
            }
        }
        Ok(out)
    }

    /// Union of guideline ids registered under any of the given keywords.
    /// Pure in-memory lookup, synchronous in spirit (async only because the
    /// index lives behind a lock shared with `load_all`).
    pub async fn get_candidates_by_keywords(&self, keywords: &[String]) -> HashSet<GuidelineId> {
        let index = self.keyword_index.read().await;
        let mut candidates = HashSet::new();
        for keyword in keywords {
            if let Some(ids) = index.get(&keyword.to_lowercase()) {
                candidates.extend(ids.iter().copied());
            }
        }
        candidates
    }

    /// Authoritative scope filter: enabled guidelines whose scope matches
    /// the given journey/state, ordered priority descending then name.
    pub async fn get_guidelines_by_scope(
        &self,
        journey_id: Option<JourneyId>,
        state_name: Option<&str>,
    ) -> StorageResult<Vec<Guideline>> {
        self.durable
            .get_guidelines_by_scope(journey_id, state_name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guideline::GuidelineBuilder;
    use crate::storage::memory::InMemoryDurableStore;
    use crate::types::GuidelineScope;

    async fn store_with(guidelines: Vec<Guideline>) -> GuidelineStore {
        let durable = Arc::new(InMemoryDurableStore::new());
        for g in &guidelines {
            durable.put_guideline(g).await.unwrap();
        }
        GuidelineStore::new(durable, CacheFacade::in_memory())
    }

    #[tokio::test]
    async fn load_all_builds_keyword_index() {
        let g = GuidelineBuilder::new("refund_policy", GuidelineScope::Global)
            .condition("x")
            .action("y")
            .keywords(vec!["refund".into(), "payment".into()])
            .build()
            .unwrap();
        let store = store_with(vec![g.clone()]).await;
        store.load_all().await.unwrap();

        let candidates = store
            .get_candidates_by_keywords(&["refund".to_string()])
            .await;
        assert!(candidates.contains(&g.id));
    }

    #[tokio::test]
    async fn keyword_lookup_is_case_insensitive() {
        let g = GuidelineBuilder::new("refund_policy", GuidelineScope::Global)
            .condition("x")
            .action("y")
            .keywords(vec!["refund".into()])
            .build()
            .unwrap();
        let store = store_with(vec![g.clone()]).await;
        store.load_all().await.unwrap();

        let candidates = store
            .get_candidates_by_keywords(&["REFUND".to_string()])
            .await;
        assert!(candidates.contains(&g.id));
    }

    #[tokio::test]
    async fn get_guideline_caches_after_durable_fetch() {
        let g = GuidelineBuilder::new("g", GuidelineScope::Global)
            .condition("x")
            .action("y")
            .build()
            .unwrap();
        let store = store_with(vec![g.clone()]).await;

        let fetched = store.get_guideline(g.id).await.unwrap();
        assert!(fetched.is_some());
        let cached = store
            .cache
            .get::<Guideline>(CacheTier::L1, &format!("guideline:def:{}", g.id))
            .await;
        assert!(cached.is_some());
    }
}
