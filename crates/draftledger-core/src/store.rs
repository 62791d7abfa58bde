//! Storage query, change notifications, and account directory contracts.

use async_trait::async_trait;
use thiserror::Error;

use draftledger_model::{AccountId, DraftRecord, HeaderMessageId};

/// Errors reported by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The query could not be executed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Load-by-key query over draft storage.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Returns at most one draft for the external key, including its full
    /// content payload. Implementors apply the draft-only filter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying query fails.
    async fn find_draft(&self, key: &HeaderMessageId) -> Result<Option<DraftRecord>, StoreError>;
}

/// One change notification from the storage layer.
///
/// A payload-less event is a status-only signal (for example "a send
/// started"); sessions re-notify their observers without touching the
/// snapshot. Events with a payload carry the records that changed, each
/// identified by its external key.
#[derive(Debug, Clone, Default)]
pub struct StoreEvent {
    /// Changed records, absent for status-only signals.
    pub payload: Option<Vec<DraftRecord>>,
}

impl StoreEvent {
    /// Creates a status-only event.
    #[must_use]
    pub const fn status_only() -> Self {
        Self { payload: None }
    }

    /// Creates an event carrying changed records.
    #[must_use]
    pub const fn with_records(records: Vec<DraftRecord>) -> Self {
        Self {
            payload: Some(records),
        }
    }
}

/// A configured account, as resolved by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// Account identifier.
    pub id: AccountId,
    /// Primary address of the account.
    pub email: String,
}

impl AccountInfo {
    /// Creates an account entry.
    #[must_use]
    pub fn new(id: AccountId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }
}

/// Account lookup by email address.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Resolves the account configured for an address, or `None` if no
    /// such account exists.
    async fn account_for_address(&self, email: &str) -> Option<AccountInfo>;
}
