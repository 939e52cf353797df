//! PostgreSQL-backed `DurableStore` implementation.
//!
//! Four tables: `journeys`, `journey_contexts`, `guidelines`, and
//! `validation_audit`. Journeys store their states and transitions as JSON
//! columns on the `journeys` row itself rather than normalized child
//! tables — that's the shape the rest of this crate's loaders and stores
//! already round-trip, so the schema here matches it directly instead of
//! introducing a join the read path would never use.

use super::ValidationAuditRecord;
use crate::error::StorageError;
use crate::guideline::Guideline;
use crate::journey::{HistoryEvent, Journey, JourneyContext, JourneyState, JourneyTransition};
use crate::types::{ContextId, GuidelineId, GuidelineScope, JourneyId, SessionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

fn map_sqlx_err(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::RowNotFound => StorageError::NotFound("row not found".to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StorageError::BackendUnavailable(e.to_string())
        }
        other => StorageError::Query(other.to_string()),
    }
}

fn scope_to_str(scope: GuidelineScope) -> &'static str {
    match scope {
        GuidelineScope::Global => "GLOBAL",
        GuidelineScope::Journey => "JOURNEY",
        GuidelineScope::State => "STATE",
    }
}

fn scope_from_str(raw: &str) -> Result<GuidelineScope, StorageError> {
    match raw {
        "GLOBAL" => Ok(GuidelineScope::Global),
        "JOURNEY" => Ok(GuidelineScope::Journey),
        "STATE" => Ok(GuidelineScope::State),
        other => Err(StorageError::Deserialization(format!(
            "unknown guideline scope `{other}` in storage row"
        ))),
    }
}

#[derive(sqlx::FromRow)]
struct JourneyRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    activation_conditions: String,
    initial_state: String,
    states: Json<HashMap<String, JourneyState>>,
    transitions: Json<Vec<JourneyTransition>>,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JourneyRow> for Journey {
    fn from(row: JourneyRow) -> Self {
        Journey {
            id: JourneyId::from(row.id),
            name: row.name,
            description: row.description,
            activation_conditions: row.activation_conditions,
            initial_state: row.initial_state,
            states: row.states.0,
            transitions: row.transitions.0,
            enabled: row.enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ContextRow {
    id: Uuid,
    session_id: String,
    journey_id: Uuid,
    journey_name: String,
    current_state: String,
    variables: Json<HashMap<String, serde_json::Value>>,
    state_history: Json<Vec<HistoryEvent>>,
    activated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ContextRow> for JourneyContext {
    fn from(row: ContextRow) -> Self {
        JourneyContext {
            id: ContextId::from(row.id),
            session_id: SessionId::new(row.session_id),
            journey_id: JourneyId::from(row.journey_id),
            journey_name: row.journey_name,
            current_state: row.current_state,
            variables: row.variables.0,
            state_history: row.state_history.0,
            activated_at: row.activated_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GuidelineRow {
    id: Uuid,
    scope: String,
    journey_id: Option<Uuid>,
    state_name: Option<String>,
    name: String,
    description: Option<String>,
    condition: String,
    action: String,
    keywords: Json<Vec<String>>,
    tools: Json<Vec<String>>,
    priority: i32,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GuidelineRow> for Guideline {
    type Error = StorageError;

    fn try_from(row: GuidelineRow) -> Result<Self, Self::Error> {
        Ok(Guideline {
            id: GuidelineId::from(row.id),
            scope: scope_from_str(&row.scope)?,
            name: row.name,
            description: row.description,
            condition: row.condition,
            action: row.action,
            keywords: row.keywords.0,
            tools: row.tools.0,
            priority: row.priority,
            enabled: row.enabled,
            journey_id: row.journey_id.map(JourneyId::from),
            state_name: row.state_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn rows_to_guidelines(rows: Vec<GuidelineRow>) -> Result<Vec<Guideline>, StorageError> {
    rows.into_iter().map(Guideline::try_from).collect()
}

/// PostgreSQL-backed durable store, enabled via the `postgres-storage` feature.
pub struct PostgresDurableStore {
    pool: PgPool,
}

impl PostgresDurableStore {
    /// Wrap an already-constructed pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with a small default pool, matching the
    /// modest per-process connection count this engine's read/write volume
    /// needs, then ensure the four tables this store depends on exist.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(map_sqlx_err)?;
        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Create the `journeys`, `journey_contexts`, `guidelines`, and
    /// `validation_audit` tables if they don't already exist. Safe to call
    /// on every startup.
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS journeys (
                id UUID PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                description TEXT,
                activation_conditions TEXT NOT NULL,
                initial_state TEXT NOT NULL,
                states JSONB NOT NULL,
                transitions JSONB NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT true,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS journey_contexts (
                id UUID PRIMARY KEY,
                session_id TEXT NOT NULL,
                journey_id UUID NOT NULL REFERENCES journeys(id),
                journey_name TEXT NOT NULL,
                current_state TEXT NOT NULL,
                variables JSONB NOT NULL,
                state_history JSONB NOT NULL,
                activated_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS journey_contexts_session_active_idx \
             ON journey_contexts (session_id, activated_at DESC) WHERE completed_at IS NULL",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS guidelines (
                id UUID PRIMARY KEY,
                scope TEXT NOT NULL,
                journey_id UUID REFERENCES journeys(id),
                state_name TEXT,
                name TEXT NOT NULL,
                description TEXT,
                condition TEXT NOT NULL,
                action TEXT NOT NULL,
                keywords JSONB NOT NULL,
                tools JSONB NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                enabled BOOLEAN NOT NULL DEFAULT true,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS validation_audit (
                id UUID PRIMARY KEY,
                session_id TEXT NOT NULL,
                journey_id UUID REFERENCES journeys(id),
                guideline_ids UUID[] NOT NULL DEFAULT '{}',
                is_valid BOOLEAN NOT NULL,
                violations JSONB NOT NULL,
                suggested_fixes JSONB NOT NULL DEFAULT '[]',
                confidence REAL NOT NULL,
                latency_ms BIGINT NOT NULL,
                original_response TEXT NOT NULL,
                fixed_response TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }
}

#[async_trait]
impl super::DurableStore for PostgresDurableStore {
    async fn load_all_journeys(&self) -> Result<Vec<Journey>, StorageError> {
        let rows: Vec<JourneyRow> = sqlx::query_as(
            "SELECT id, name, description, activation_conditions, initial_state, \
             states, transitions, enabled, created_at, updated_at \
             FROM journeys WHERE enabled = true ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(Journey::from).collect())
    }

    async fn get_journey(&self, id: JourneyId) -> Result<Option<Journey>, StorageError> {
        let row: Option<JourneyRow> = sqlx::query_as(
            "SELECT id, name, description, activation_conditions, initial_state, \
             states, transitions, enabled, created_at, updated_at \
             FROM journeys WHERE id = $1 AND enabled = true",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row.map(Journey::from))
    }

    async fn get_journey_by_name(&self, name: &str) -> Result<Option<Journey>, StorageError> {
        let row: Option<JourneyRow> = sqlx::query_as(
            "SELECT id, name, description, activation_conditions, initial_state, \
             states, transitions, enabled, created_at, updated_at \
             FROM journeys WHERE name = $1 AND enabled = true",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row.map(Journey::from))
    }

    async fn put_journey(&self, journey: &Journey) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO journeys (id, name, description, activation_conditions, \
             initial_state, states, transitions, enabled, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET \
             name = EXCLUDED.name, description = EXCLUDED.description, \
             activation_conditions = EXCLUDED.activation_conditions, \
             initial_state = EXCLUDED.initial_state, states = EXCLUDED.states, \
             transitions = EXCLUDED.transitions, enabled = EXCLUDED.enabled, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(*journey.id.as_uuid())
        .bind(&journey.name)
        .bind(&journey.description)
        .bind(&journey.activation_conditions)
        .bind(&journey.initial_state)
        .bind(Json(&journey.states))
        .bind(Json(&journey.transitions))
        .bind(journey.enabled)
        .bind(journey.created_at)
        .bind(journey.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn create_context(&self, context: &JourneyContext) -> Result<(), StorageError> {
        let result = sqlx::query(
            "INSERT INTO journey_contexts (id, session_id, journey_id, journey_name, \
             current_state, variables, state_history, activated_at, completed_at, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(*context.id.as_uuid())
        .bind(context.session_id.as_str())
        .bind(*context.journey_id.as_uuid())
        .bind(&context.journey_name)
        .bind(&context.current_state)
        .bind(Json(&context.variables))
        .bind(Json(&context.state_history))
        .bind(context.activated_at)
        .bind(context.completed_at)
        .bind(context.created_at)
        .bind(context.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                StorageError::AlreadyExists(context.id.to_string()),
            ),
            Err(e) => Err(map_sqlx_err(e)),
        }
    }

    async fn update_context(&self, context: &JourneyContext) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE journey_contexts SET current_state = $2, variables = $3, \
             state_history = $4, completed_at = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(*context.id.as_uuid())
        .bind(&context.current_state)
        .bind(Json(&context.variables))
        .bind(Json(&context.state_history))
        .bind(context.completed_at)
        .bind(context.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(context.id.to_string()));
        }
        Ok(())
    }

    async fn get_active_context(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<JourneyContext>, StorageError> {
        let row: Option<ContextRow> = sqlx::query_as(
            "SELECT id, session_id, journey_id, journey_name, current_state, variables, \
             state_history, activated_at, completed_at, created_at, updated_at \
             FROM journey_contexts WHERE session_id = $1 AND completed_at IS NULL \
             ORDER BY activated_at DESC LIMIT 1",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row.map(JourneyContext::from))
    }

    async fn get_context(&self, id: ContextId) -> Result<Option<JourneyContext>, StorageError> {
        let row: Option<ContextRow> = sqlx::query_as(
            "SELECT id, session_id, journey_id, journey_name, current_state, variables, \
             state_history, activated_at, completed_at, created_at, updated_at \
             FROM journey_contexts WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row.map(JourneyContext::from))
    }

    async fn load_all_guidelines(&self) -> Result<Vec<Guideline>, StorageError> {
        let rows: Vec<GuidelineRow> = sqlx::query_as(
            "SELECT id, scope, journey_id, state_name, name, description, condition, \
             action, keywords, tools, priority, enabled, created_at, updated_at \
             FROM guidelines WHERE enabled = true ORDER BY priority DESC, name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        rows_to_guidelines(rows)
    }

    async fn get_guideline(&self, id: GuidelineId) -> Result<Option<Guideline>, StorageError> {
        let row: Option<GuidelineRow> = sqlx::query_as(
            "SELECT id, scope, journey_id, state_name, name, description, condition, \
             action, keywords, tools, priority, enabled, created_at, updated_at \
             FROM guidelines WHERE id = $1 AND enabled = true",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(Guideline::try_from).transpose()
    }

    async fn put_guideline(&self, guideline: &Guideline) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO guidelines (id, scope, journey_id, state_name, name, \
             description, condition, action, keywords, tools, priority, enabled, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO UPDATE SET \
             scope = EXCLUDED.scope, journey_id = EXCLUDED.journey_id, \
             state_name = EXCLUDED.state_name, name = EXCLUDED.name, \
             description = EXCLUDED.description, condition = EXCLUDED.condition, \
             action = EXCLUDED.action, keywords = EXCLUDED.keywords, \
             tools = EXCLUDED.tools, priority = EXCLUDED.priority, \
             enabled = EXCLUDED.enabled, updated_at = EXCLUDED.updated_at",
        )
        .bind(*guideline.id.as_uuid())
        .bind(scope_to_str(guideline.scope))
        .bind(guideline.journey_id.map(|j| *j.as_uuid()))
        .bind(&guideline.state_name)
        .bind(&guideline.name)
        .bind(&guideline.description)
        .bind(&guideline.condition)
        .bind(&guideline.action)
        .bind(Json(&guideline.keywords))
        .bind(Json(&guideline.tools))
        .bind(guideline.priority)
        .bind(guideline.enabled)
        .bind(guideline.created_at)
        .bind(guideline.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn get_guidelines_by_scope(
        &self,
        journey_id: Option<JourneyId>,
        state_name: Option<&str>,
    ) -> Result<Vec<Guideline>, StorageError> {
        let journey_uuid = journey_id.map(|j| *j.as_uuid());
        let rows: Vec<GuidelineRow> = sqlx::query_as(
            "SELECT id, scope, journey_id, state_name, name, description, condition, \
             action, keywords, tools, priority, enabled, created_at, updated_at \
             FROM guidelines WHERE enabled = true AND ( \
               scope = 'GLOBAL' \
               OR (scope = 'JOURNEY' AND journey_id = $1) \
               OR (scope = 'STATE' AND journey_id = $1 AND state_name = $2) \
             ) ORDER BY priority DESC, name ASC",
        )
        .bind(journey_uuid)
        .bind(state_name)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        rows_to_guidelines(rows)
    }

    async fn record_audit(&self, record: &ValidationAuditRecord) -> Result<(), StorageError> {
        let guideline_ids: Vec<Uuid> = record
            .considered_guideline_ids
            .iter()
            .map(|id| *id.as_uuid())
            .collect();
        sqlx::query(
            "INSERT INTO validation_audit (id, session_id, journey_id, guideline_ids, \
             is_valid, violations, suggested_fixes, confidence, latency_ms, \
             original_response, fixed_response, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(*record.id.as_uuid())
        .bind(&record.session_id)
        .bind(record.journey_id.map(|j| *j.as_uuid()))
        .bind(&guideline_ids)
        .bind(record.is_valid)
        .bind(Json(&record.violations))
        .bind(Json(&record.suggested_fixes))
        .bind(record.confidence)
        .bind(record.latency_ms as i64)
        .bind(&record.original_response)
        .bind(&record.fixed_response)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}
