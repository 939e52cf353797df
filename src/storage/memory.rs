//! In-memory `DurableStore` implementation.
//!
//! A handful of `HashMap`s behind one `RwLock`, suitable for development,
//! testing, and single-instance deployments without `postgres-storage`
//! enabled.

use super::{DurableStore, ValidationAuditRecord};
use crate::error::StorageError;
use crate::guideline::Guideline;
use crate::journey::{Journey, JourneyContext};
use crate::types::{ContextId, GuidelineId, JourneyId, SessionId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    journeys: HashMap<JourneyId, Journey>,
    journey_names: HashMap<String, JourneyId>,
    contexts: HashMap<ContextId, JourneyContext>,
    guidelines: HashMap<GuidelineId, Guideline>,
    audit: Vec<ValidationAuditRecord>,
}

/// In-memory durable store, the default backend.
#[derive(Clone, Default)]
pub struct InMemoryDurableStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryDurableStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every audit record written so far, in insertion order.
    /// Exposed so callers (tests included) can assert on what validation
    /// actually persisted, since `DurableStore` itself has no read-back for
    /// audit rows.
    pub async fn audit_records(&self) -> Vec<ValidationAuditRecord> {
        self.tables.read().await.audit.clone()
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn load_all_journeys(&self) -> Result<Vec<Journey>, StorageError> {
        let tables = self.tables.read().await;
        let mut journeys: Vec<Journey> = tables
            .journeys
            .values()
            .filter(|j| j.enabled)
            .cloned()
            .collect();
        journeys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(journeys)
    }

    async fn get_journey(&self, id: JourneyId) -> Result<Option<Journey>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .journeys
            .get(&id)
            .filter(|j| j.enabled)
            .cloned())
    }

    async fn get_journey_by_name(&self, name: &str) -> Result<Option<Journey>, StorageError> {
        let tables = self.tables.read().await;
        let Some(id) = tables.journey_names.get(name) else {
            return Ok(None);
        };
        Ok(tables.journeys.get(id).filter(|j| j.enabled).cloned())
    }

    async fn put_journey(&self, journey: &Journey) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables
            .journey_names
            .insert(journey.name.clone(), journey.id);
        tables.journeys.insert(journey.id, journey.clone());
        Ok(())
    }

    async fn create_context(&self, context: &JourneyContext) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.contexts.contains_key(&context.id) {
            return Err(StorageError::AlreadyExists(context.id.to_string()));
        }
        tables.contexts.insert(context.id, context.clone());
        Ok(())
    }

    async fn update_context(&self, context: &JourneyContext) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if !tables.contexts.contains_key(&context.id) {
            return Err(StorageError::NotFound(context.id.to_string()));
        }
        tables.contexts.insert(context.id, context.clone());
        Ok(())
    }

    async fn get_active_context(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<JourneyContext>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .contexts
            .values()
            .filter(|c| &c.session_id == session_id && c.is_active())
            .max_by_key(|c| c.activated_at)
            .cloned())
    }

    async fn get_context(&self, id: ContextId) -> Result<Option<JourneyContext>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.contexts.get(&id).cloned())
    }

    async fn load_all_guidelines(&self) -> Result<Vec<Guideline>, StorageError> {
        let tables = self.tables.read().await;
        let mut guidelines: Vec<Guideline> = tables
            .guidelines
            .values()
            .filter(|g| g.enabled)
            .cloned()
            .collect();
        guidelines.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(guidelines)
    }

    async fn get_guideline(&self, id: GuidelineId) -> Result<Option<Guideline>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.guidelines.get(&id).filter(|g| g.enabled).cloned())
    }

    async fn put_guideline(&self, guideline: &Guideline) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.guidelines.insert(guideline.id, guideline.clone());
        Ok(())
    }

    async fn get_guidelines_by_scope(
        &self,
        journey_id: Option<JourneyId>,
        state_name: Option<&str>,
    ) -> Result<Vec<Guideline>, StorageError> {
        let tables = self.tables.read().await;
        let mut guidelines: Vec<Guideline> = tables
            .guidelines
            .values()
            .filter(|g| g.enabled && g.matches_scope(journey_id, state_name))
            .cloned()
            .collect();
        guidelines.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(guidelines)
    }

    async fn record_audit(&self, record: &ValidationAuditRecord) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.audit.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guideline::{Guideline, GuidelineBuilder};
    use crate::types::GuidelineScope;
    use std::collections::HashMap;

    fn sample_journey() -> Journey {
        let mut states = HashMap::new();
        states.insert(
            "start".to_string(),
            crate::journey::JourneyState {
                name: "start".to_string(),
                action: "greet".to_string(),
                tools: vec![],
                metadata: HashMap::new(),
            },
        );
        Journey::new(
            JourneyId::new(),
            "sample",
            None,
            "caller wants help",
            "start",
            states,
            vec![],
            true,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn put_and_get_journey_by_id_and_name() {
        let store = InMemoryDurableStore::new();
        let journey = sample_journey();
        store.put_journey(&journey).await.unwrap();

        let by_id = store.get_journey(journey.id).await.unwrap().unwrap();
        assert_eq!(by_id.id, journey.id);

        let by_name = store.get_journey_by_name("sample").await.unwrap().unwrap();
        assert_eq!(by_name.id, journey.id);
    }

    #[tokio::test]
    async fn context_create_then_active_lookup() {
        let store = InMemoryDurableStore::new();
        let journey = sample_journey();
        let ctx = JourneyContext::activate(SessionId::new("s1"), &journey);
        store.create_context(&ctx).await.unwrap();

        let active = store
            .get_active_context(&SessionId::new("s1"))
            .await
            .unwrap();
        assert_eq!(active.unwrap().id, ctx.id);
    }

    #[tokio::test]
    async fn completed_context_is_not_active() {
        let store = InMemoryDurableStore::new();
        let journey = sample_journey();
        let mut ctx = JourneyContext::activate(SessionId::new("s1"), &journey);
        store.create_context(&ctx).await.unwrap();
        ctx.complete();
        store.update_context(&ctx).await.unwrap();

        let active = store
            .get_active_context(&SessionId::new("s1"))
            .await
            .unwrap();
        assert!(active.is_none());
    }

    #[tokio::test]
    async fn guidelines_by_scope_filters_and_orders() {
        let store = InMemoryDurableStore::new();
        let journey_id = JourneyId::new();

        let low = GuidelineBuilder::new("low_priority", GuidelineScope::Global)
            .condition("x")
            .action("y")
            .priority(1)
            .build()
            .unwrap();
        let high = GuidelineBuilder::new("high_priority", GuidelineScope::Global)
            .condition("x")
            .action("y")
            .priority(50)
            .build()
            .unwrap();
        let scoped = GuidelineBuilder::new("other_journey", GuidelineScope::Journey)
            .condition("x")
            .action("y")
            .journey_id(JourneyId::new())
            .build()
            .unwrap();

        store.put_guideline(&low).await.unwrap();
        store.put_guideline(&high).await.unwrap();
        store.put_guideline(&scoped).await.unwrap();

        let matched = store
            .get_guidelines_by_scope(Some(journey_id), Some("start"))
            .await
            .unwrap();
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].name, "high_priority");
        assert_eq!(matched[1].name, "low_priority");
    }
}
