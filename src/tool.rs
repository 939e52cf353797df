//! Tool registry and execution for external API/function calls invoked
//! during a turn.
//!
//! The registry is a callable plus its parameter schema, looked up by id
//! or name. `ToolExecutor` wraps a lookup with a fixed rate-limit → cache
//! → deadline ordering.

use crate::cache::{CacheFacade, CacheTier};
use crate::error::{Result, ToolError};
use crate::types::ToolId;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Parameter schema for one tool argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub param_type: String,
    pub required: bool,
    pub description: String,
    pub default: Option<serde_json::Value>,
}

/// Outcome of a successful tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: serde_json::Value,
    pub error: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A callable tool, identified by id and name, with its own parameter
/// schema.
#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> &ToolId;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> &HashMap<String, ParameterSchema>;

    async fn execute(&self, parameters: HashMap<String, serde_json::Value>) -> Result<ToolResult>;

    /// Validate parameters before execution: every required parameter
    /// present, every present parameter's type matching its schema.
    fn validate_parameters(&self, parameters: &HashMap<String, serde_json::Value>) -> Result<()> {
        trace!(tool_name = %self.name(), "validating tool parameters");
        let schema = self.parameters();

        for (param_name, param_schema) in schema {
            if param_schema.required && !parameters.contains_key(param_name) {
                warn!(tool_name = %self.name(), param_name, "missing required parameter");
                return Err(ToolError::InvalidParameters {
                    tool: self.name().to_string(),
                    message: format!("missing required parameter: {param_name}"),
                }
                .into());
            }
        }
        for (param_name, value) in parameters {
            if let Some(param_schema) = schema.get(param_name) {
                if !validate_type(value, &param_schema.param_type) {
                    warn!(tool_name = %self.name(), param_name, expected = %param_schema.param_type, "parameter type mismatch");
                    return Err(ToolError::InvalidParameters {
                        tool: self.name().to_string(),
                        message: format!(
                            "parameter `{param_name}` has wrong type, expected {}",
                            param_schema.param_type
                        ),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Fill in schema-declared defaults for any parameter the caller omitted.
    fn apply_defaults(&self, parameters: &mut HashMap<String, serde_json::Value>) {
        for (param_name, param_schema) in self.parameters() {
            if !parameters.contains_key(param_name) {
                if let Some(default_value) = &param_schema.default {
                    parameters.insert(param_name.clone(), default_value.clone());
                }
            }
        }
    }
}

fn validate_type(value: &serde_json::Value, expected_type: &str) -> bool {
    use serde_json::Value;
    match expected_type {
        "string" => matches!(value, Value::String(_)),
        "number" => matches!(value, Value::Number(_)),
        "boolean" => matches!(value, Value::Bool(_)),
        "object" => matches!(value, Value::Object(_)),
        "array" => matches!(value, Value::Array(_)),
        "null" => matches!(value, Value::Null),
        _ => true,
    }
}

/// Rate-limit policy for one tool: at most `max_calls` per `window_seconds`,
/// counted per distinct value of `arguments[identifier_field]`.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub max_calls: u32,
    pub window_seconds: u64,
    pub identifier_field: String,
}

/// Execution policy layered on top of a registered [`Tool`]: optional
/// result caching, a deadline, and an optional rate limit.
#[derive(Clone)]
pub struct ToolDefinition {
    pub tool: Arc<dyn Tool>,
    pub cache_ttl: Option<Duration>,
    pub timeout: Duration,
    pub rate_limit: Option<Arc<RateLimitPolicy>>,
}

/// Registry of tools, looked up by id or name. Registration is explicit:
/// callers construct a [`ToolDefinition`] and hand it to `register`, there
/// is no attribute/decorator-driven auto-discovery.
pub struct ToolRegistry {
    definitions: RwLock<HashMap<ToolId, ToolDefinition>>,
    by_name: RwLock<HashMap<String, ToolId>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        info!("creating tool registry");
        Self {
            definitions: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool under its own id/name. Fails if the name is already taken.
    pub async fn register(&self, definition: ToolDefinition) -> Result<ToolId> {
        let tool_id = *definition.tool.id();
        let name = definition.tool.name().to_string();

        let mut definitions = self.definitions.write().await;
        let mut by_name = self.by_name.write().await;
        if by_name.contains_key(&name) {
            warn!(tool_name = %name, "attempted to register duplicate tool");
            return Err(ToolError::AlreadyExists(name).into());
        }

        by_name.insert(name.clone(), tool_id);
        definitions.insert(tool_id, definition);
        debug!(tool_id = %tool_id, tool_name = %name, "tool registered");
        Ok(tool_id)
    }

    pub async fn get(&self, tool_id: &ToolId) -> Option<ToolDefinition> {
        self.definitions.read().await.get(tool_id).cloned()
    }

    pub async fn get_by_name(&self, name: &str) -> Option<ToolDefinition> {
        let id = *self.by_name.read().await.get(name)?;
        self.get(&id).await
    }

    pub async fn list(&self) -> Vec<ToolDefinition> {
        self.definitions.read().await.values().cloned().collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical, key-sorted JSON encoding of tool arguments, so argument order
/// never affects the cache key.
fn canonical_json(value: &serde_json::Value) -> String {
    fn sort(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut sorted = serde_json::Map::new();
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys {
                    sorted.insert(key.clone(), sort(&map[key]));
                }
                serde_json::Value::Object(sorted)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(sort).collect())
            }
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

fn cache_key(tool_name: &str, arguments: &serde_json::Value) -> String {
    let canonical = canonical_json(arguments);
    let digest = Sha256::digest(canonical.as_bytes());
    let short = &format!("{digest:x}")[..16];
    format!("tool:{tool_name}:{short}")
}

/// Fixed-window rate-limit counter persisted in the cache backend, keyed by
/// `tool:ratelimit:{tool}:{identifier}`. The window boundary is carried in
/// the value itself so repeated calls within a window never extend it; only
/// the first call of a window sets `window_started_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RateLimitCounter {
    count: u32,
    window_started_at: DateTime<Utc>,
}

/// Executes tool calls against a rate limit and result cache, enforcing a
/// per-call deadline. Grounded in `tools/executor.py`'s exact ordering:
/// unknown-tool check, rate limit, cache probe, execution-under-deadline,
/// cache-on-success.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    cache: CacheFacade,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, cache: CacheFacade) -> Self {
        Self { registry, cache }
    }

    /// Run one tool call by name, honoring rate limit, cache, and deadline.
    pub async fn execute(
        &self,
        tool_name: &str,
        mut arguments: HashMap<String, serde_json::Value>,
    ) -> Result<ToolResult> {
        let definition = self
            .registry
            .get_by_name(tool_name)
            .await
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        if let Some(policy) = &definition.rate_limit {
            self.check_rate_limit(tool_name, policy, &arguments).await?;
        }

        let args_value = serde_json::to_value(&arguments).unwrap_or(serde_json::Value::Null);
        let key = cache_key(tool_name, &args_value);
        if definition.cache_ttl.is_some() {
            if let Some(cached) = self.cache.get::<ToolResult>(CacheTier::L3, &key).await {
                debug!(tool_name, "tool result cache hit");
                return Ok(cached);
            }
        }

        definition.tool.apply_defaults(&mut arguments);
        definition.tool.validate_parameters(&arguments)?;

        let result = match timeout(definition.timeout, definition.tool.execute(arguments)).await {
            Ok(inner) => inner?,
            Err(_) => {
                warn!(tool_name, timeout_secs = definition.timeout.as_secs(), "tool call timed out");
                return Err(ToolError::Timeout {
                    tool: tool_name.to_string(),
                    timeout_secs: definition.timeout.as_secs(),
                }
                .into());
            }
        };

        if definition.cache_ttl.is_some() {
            self.cache.set(CacheTier::L3, &key, &result).await;
        }

        Ok(result)
    }

    /// Best-effort rate limiting against a fixed window counter kept in the
    /// cache backend (availability over strict enforcement on a KV outage:
    /// a decode/write failure lets the call proceed, per `CacheFacade`'s own
    /// degrade-on-failure contract).
    async fn check_rate_limit(
        &self,
        tool_name: &str,
        policy: &RateLimitPolicy,
        arguments: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let Some(identifier) = arguments.get(&policy.identifier_field) else {
            return Ok(());
        };
        let identifier = identifier
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| identifier.to_string());

        let key = format!("tool:ratelimit:{tool_name}:{identifier}");
        let window_len = ChronoDuration::seconds(policy.window_seconds as i64);
        let now = Utc::now();

        let existing: Option<RateLimitCounter> = self.cache.get_raw(&key).await;
        let window = match existing {
            Some(counter) if counter.window_started_at + window_len > now => counter,
            _ => RateLimitCounter {
                count: 0,
                window_started_at: now,
            },
        };

        if window.count >= policy.max_calls {
            return Err(ToolError::RateLimitExceeded {
                tool: tool_name.to_string(),
                identifier,
            }
            .into());
        }

        let remaining = (window.window_started_at + window_len - now)
            .to_std()
            .unwrap_or_else(|_| Duration::from_secs(policy.window_seconds));
        let updated = RateLimitCounter {
            count: window.count + 1,
            window_started_at: window.window_started_at,
        };
        self.cache.set_raw(&key, &updated, remaining).await;
        Ok(())
    }
}
