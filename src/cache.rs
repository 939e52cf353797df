//! Three-tier cache facade over a pluggable key-value backend.
//!
//! L1 is indefinite (process-wide definitions), L2 expires after 300
//! seconds (activation decisions), L3 after 1800 seconds (tool results).
//! Every operation degrades instead of raising: a decode failure or
//! backend outage is logged and reported as a miss on reads, or silently
//! dropped on writes — the core stays available when the cache is
//! degraded.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Backend abstraction the cache facade is built on. Implementations never
/// need to understand namespacing or TTL tiers — just raw get/set/delete
/// against byte-string values with an optional expiry.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a raw value, or `None` if absent or the backend failed.
    async fn get(&self, key: &str) -> Option<String>;

    /// Store a raw value with an optional TTL. `None` means indefinite.
    /// Returns `false` (never an error) if the write could not be made.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> bool;

    /// Remove a key. Best-effort; absence of an error does not guarantee removal.
    async fn delete(&self, key: &str);
}

/// In-memory `KvStore`, the default backend and the one used throughout
/// tests. TTLs are honored lazily: an expired entry is treated as absent on
/// the next read rather than being proactively evicted.
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, (String, Option<std::time::Instant>)>>,
}

impl InMemoryKvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((_, Some(expires_at))) if *expires_at <= std::time::Instant::now() => None,
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> bool {
        let expires_at = ttl.map(|d| std::time::Instant::now() + d);
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, expires_at));
        true
    }

    async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

/// The cache tier being addressed. Each carries its own TTL and key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// Indefinite TTL. Holds journey/guideline definitions.
    L1,
    /// 300 second TTL. Holds journey activation decisions.
    L2,
    /// 1800 second TTL. Holds tool call results.
    L3,
}

impl CacheTier {
    fn prefix(&self) -> &'static str {
        match self {
            CacheTier::L1 => "l1",
            CacheTier::L2 => "l2",
            CacheTier::L3 => "l3",
        }
    }

    fn ttl(&self) -> Option<Duration> {
        match self {
            CacheTier::L1 => None,
            CacheTier::L2 => Some(Duration::from_secs(300)),
            CacheTier::L3 => Some(Duration::from_secs(1800)),
        }
    }
}

/// Facade over a [`KvStore`] implementing the L1/L2/L3 tiering scheme.
#[derive(Clone)]
pub struct CacheFacade {
    backend: Arc<dyn KvStore>,
}

impl CacheFacade {
    /// Wrap a backend.
    pub fn new(backend: Arc<dyn KvStore>) -> Self {
        Self { backend }
    }

    /// Construct a facade backed by an in-memory store. Convenient default
    /// for tests and for deployments that don't need cross-process sharing.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryKvStore::new()))
    }

    fn namespaced(tier: CacheTier, key: &str) -> String {
        format!("{}:{}", tier.prefix(), key)
    }

    /// Fetch and JSON-decode a value. Both a backend miss and a decode
    /// failure report as `None`; a decode failure is logged since it
    /// usually signals a version skew bug, never propagated.
    pub async fn get<T: DeserializeOwned>(&self, tier: CacheTier, key: &str) -> Option<T> {
        let full_key = Self::namespaced(tier, key);
        let raw = self.backend.get(&full_key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key = %full_key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "cache value failed to decode, treating as absent");
                None
            }
        }
    }

    /// JSON-encode and store a value under the tier's TTL. Encode failures
    /// and backend failures are both swallowed; the caller never needs to
    /// branch on whether a cache write actually landed.
    pub async fn set<T: Serialize>(&self, tier: CacheTier, key: &str, value: &T) {
        let full_key = Self::namespaced(tier, key);
        let encoded = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(key = %full_key, error = %e, "cache value failed to encode, not stored");
                return;
            }
        };
        if !self.backend.set(&full_key, encoded, tier.ttl()).await {
            debug!(key = %full_key, "cache write not stored");
        }
    }

    /// Remove a key from a tier.
    pub async fn delete(&self, tier: CacheTier, key: &str) {
        self.backend.delete(&Self::namespaced(tier, key)).await;
    }

    /// Fetch and JSON-decode a value under a caller-supplied key, bypassing
    /// tier namespacing entirely. For callers that need a specific external
    /// key format (e.g. the tool rate limiter's `tool:ratelimit:{tool}:{id}`)
    /// rather than the L1/L2/L3 scheme.
    pub async fn get_raw<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.backend.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "raw cache value failed to decode, treating as absent");
                None
            }
        }
    }

    /// JSON-encode and store a value under a caller-supplied key and an
    /// explicit TTL, bypassing tier namespacing.
    pub async fn set_raw<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let encoded = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(key, error = %e, "raw cache value failed to encode, not stored");
                return;
            }
        };
        if !self.backend.set(key, encoded, Some(ttl)).await {
            debug!(key, "raw cache write not stored");
        }
    }
}
