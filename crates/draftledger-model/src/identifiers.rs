//! Core draft identifiers.
//!
//! Types separating storage identity (`DraftId`, `AccountId`), which may
//! change over a draft's lifetime, from the stable external key
//! (`HeaderMessageId`), which never does.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Storage identifier for a draft.
///
/// Storage identity is *not* stable: account reassignment creates a new
/// draft under a fresh `DraftId`. Use [`HeaderMessageId`] to correlate a
/// draft across identity changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub String);

impl DraftId {
    /// Creates a draft id from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a process-unique draft id.
    ///
    /// Combines a wall-clock timestamp with a process-wide counter. Durable
    /// identity remains the write queue's business; this only has to be
    /// unique among drafts created by this process.
    #[must_use]
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self(format!("local-{millis:x}-{seq:x}"))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DraftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    /// Creates an account id from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable external key for a draft.
///
/// Assigned once when the draft is first created and never reassigned.
/// This is the only identifier that survives storage identity changes,
/// so it is the key used to correlate change notifications, load queries,
/// and reassignment replicas with a live editing session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeaderMessageId(pub String);

impl HeaderMessageId {
    /// Creates a header message id from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HeaderMessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a plugin that owns namespaced draft metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PluginId(pub String);

impl PluginId {
    /// Creates a plugin id from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PluginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn draft_id_display() {
        let id = DraftId::new("d-42");
        assert_eq!(format!("{id}"), "d-42");
        assert_eq!(id.as_str(), "d-42");
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = DraftId::generate();
        let b = DraftId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("local-"));
    }

    #[test]
    fn header_message_id_equality() {
        let k1 = HeaderMessageId::new("msg-1@local");
        let k2 = HeaderMessageId::new("msg-1@local");
        let k3 = HeaderMessageId::new("msg-2@local");
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
    }

    #[test]
    fn plugin_id_orders_deterministically() {
        let a = PluginId::new("a.plugin");
        let b = PluginId::new("b.plugin");
        assert!(a < b);
    }
}
