//! Common type definitions used throughout the crate.
//!
//! This module provides newtype wrappers around UUID for type-safe identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Get the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(JourneyId, "Unique identifier for a Journey definition.");
uuid_id!(GuidelineId, "Unique identifier for a Guideline.");
uuid_id!(ToolId, "Unique identifier for a registered Tool.");
uuid_id!(ContextId, "Unique identifier for a running Journey Context.");
uuid_id!(AuditId, "Unique identifier for a Validation Audit Record.");

/// Opaque per-call session identifier. Sessions themselves are owned by the
/// telephony layer (out of scope); this crate only threads the id through
/// context lookup and tool rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an externally supplied session identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The scope at which a [`crate::guideline::Guideline`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GuidelineScope {
    /// Applies regardless of active journey or state.
    Global,
    /// Applies only while a specific journey is active, in any state.
    Journey,
    /// Applies only while a specific journey is active and in a specific state.
    State,
}

impl GuidelineScope {
    /// The base component of the effective priority score for this scope,
    /// per the scope-priority resolution rule (STATE > JOURNEY > GLOBAL).
    pub fn base_score(&self) -> i64 {
        match self {
            GuidelineScope::State => 3000,
            GuidelineScope::Journey => 2000,
            GuidelineScope::Global => 1000,
        }
    }
}

impl fmt::Display for GuidelineScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuidelineScope::Global => write!(f, "GLOBAL"),
            GuidelineScope::Journey => write!(f, "JOURNEY"),
            GuidelineScope::State => write!(f, "STATE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journey_id_unique() {
        assert_ne!(JourneyId::new(), JourneyId::new());
    }

    #[test]
    fn id_round_trips_through_json() {
        let id = GuidelineId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: GuidelineId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn id_from_uuid() {
        let uuid = Uuid::new_v4();
        assert_eq!(ToolId::from(uuid).as_uuid(), &uuid);
        assert_eq!(ContextId::from(uuid).as_uuid(), &uuid);
        assert_eq!(AuditId::from(uuid).as_uuid(), &uuid);
    }

    #[test]
    fn session_id_wraps_external_string() {
        let sid = SessionId::new("call-12345");
        assert_eq!(sid.as_str(), "call-12345");
        assert_eq!(sid.to_string(), "call-12345");
    }

    #[test]
    fn scope_base_score_ordering() {
        assert!(GuidelineScope::State.base_score() > GuidelineScope::Journey.base_score());
        assert!(GuidelineScope::Journey.base_score() > GuidelineScope::Global.base_score());
    }
}
