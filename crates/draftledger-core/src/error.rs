//! Error types for the session engine.

use thiserror::Error;

use crate::queue::TaskError;
use crate::reassign::ReassignStep;
use crate::store::StoreError;

/// Errors that can occur in session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Initial load found no draft for the requested key.
    #[error("no draft found for the requested key")]
    NotFound,

    /// Loaded draft is missing required fields.
    #[error("loaded draft is malformed: {0}")]
    MalformedDraft(#[from] draftledger_model::RecordError),

    /// Operation attempted after teardown, or a load completed after teardown.
    #[error("session has been torn down")]
    Destroyed,

    /// Mutation attempted before the initial snapshot loaded.
    #[error("draft modified before the initial snapshot loaded")]
    ModifiedBeforeReady,

    /// Reassignment could not resolve an owning account.
    #[error("no account configured for address `{0}`")]
    NoMatchingAccount(String),

    /// A reassignment step failed; steps past it never ran.
    #[error("reassignment failed at step {step:?}: {source}")]
    Reassignment {
        /// The step the saga had reached when it failed.
        step: ReassignStep,
        /// The queue failure that stopped it.
        source: TaskError,
    },

    /// The external write queue reported a failure.
    #[error("write queue error: {0}")]
    Queue(#[from] TaskError),

    /// The load query failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, SessionError>;
