//! Durable storage abstraction.
//!
//! `DurableStore` is the seam between the journey/guideline stores and
//! whatever relational backend actually persists rows. The shape these
//! methods assume is a single JSONB-column read path per journey/guideline
//! row, not a separate normalized set of state/transition tables.

pub mod memory;
#[cfg(feature = "postgres-storage")]
pub mod postgres;

use crate::error::StorageResult;
use crate::guideline::Guideline;
use crate::journey::{Journey, JourneyContext};
use crate::types::{ContextId, GuidelineId, JourneyId, SessionId};
use async_trait::async_trait;

/// A validation audit row, as persisted. Mirrors
/// `crate::guideline::validator::ValidationAuditRecord` field for field;
/// kept here as the storage-facing shape so `DurableStore` doesn't need to
/// depend on the guideline::validator module's richer in-memory type.
pub use crate::guideline::validator::ValidationAuditRecord;

/// Durable persistence for journeys, contexts, guidelines, and audit
/// records. Writes are synchronous: the caller awaits completion before
/// considering a mutation done.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// All enabled journeys, ordered by name.
    async fn load_all_journeys(&self) -> StorageResult<Vec<Journey>>;

    /// A single enabled journey by id.
    async fn get_journey(&self, id: JourneyId) -> StorageResult<Option<Journey>>;

    /// A single enabled journey by name.
    async fn get_journey_by_name(&self, name: &str) -> StorageResult<Option<Journey>>;

    /// Upsert a journey definition (used by the loader/redeploy path, not
    /// by runtime code — journeys are never mutated at runtime).
    async fn put_journey(&self, journey: &Journey) -> StorageResult<()>;

    /// Insert a newly activated context.
    async fn create_context(&self, context: &JourneyContext) -> StorageResult<()>;

    /// Persist an updated context (transition, variable set, completion).
    async fn update_context(&self, context: &JourneyContext) -> StorageResult<()>;

    /// The most recently activated, not-yet-completed context for a
    /// session, if any.
    async fn get_active_context(
        &self,
        session_id: &SessionId,
    ) -> StorageResult<Option<JourneyContext>>;

    /// A context by id, regardless of active/completed state.
    async fn get_context(&self, id: ContextId) -> StorageResult<Option<JourneyContext>>;

    /// All enabled guidelines, ordered by priority descending then name.
    async fn load_all_guidelines(&self) -> StorageResult<Vec<Guideline>>;

    /// A single enabled guideline by id.
    async fn get_guideline(&self, id: GuidelineId) -> StorageResult<Option<Guideline>>;

    /// Upsert a guideline definition.
    async fn put_guideline(&self, guideline: &Guideline) -> StorageResult<()>;

    /// Enabled guidelines matching a scope (GLOBAL always; JOURNEY/STATE
    /// filtered accordingly), ordered by priority descending then name.
    /// This is the authoritative scope filter — any in-memory inverted
    /// index is only an accelerator in front of it.
    async fn get_guidelines_by_scope(
        &self,
        journey_id: Option<JourneyId>,
        state_name: Option<&str>,
    ) -> StorageResult<Vec<Guideline>>;

    /// Append one validation audit record. Failures here must never
    /// propagate to the caller — callers are expected to log and swallow,
    /// not `?` this.
    async fn record_audit(&self, record: &ValidationAuditRecord) -> StorageResult<()>;
}
