//! Account reassignment choreography.
//!
//! Moving a draft to a different owning account is a create-then-destroy
//! saga against the write queue: build a replica under the new account
//! (same external key, fresh storage identity), wait for the create's
//! local completion, and only then destroy the original identity. Past
//! the destroy step there is no undo; if the create never completes the
//! destroy must not run. A stray duplicate draft is the accepted degraded
//! state, never a destroyed original.

use std::sync::Arc;

use draftledger_model::{AccountId, DraftDocument, DraftId};

use crate::error::{Result, SessionError};
use crate::queue::WriteQueue;
use crate::store::AccountDirectory;

/// Steps of one reassignment saga, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassignStep {
    /// Resolving the owning account for the draft's from-address.
    ResolveAccount,
    /// Create request enqueued, waiting for its local completion.
    CreateReplica,
    /// Create applied locally; destroying the original identity.
    DestroyOriginal,
    /// Saga finished.
    Done,
}

/// Result of [`ReassignmentCoordinator::ensure_correct_account`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassignOutcome {
    /// The resolved account already owns the draft; nothing was enqueued.
    AlreadyCorrect,
    /// The draft was reassigned.
    Reassigned {
        /// Storage identity of the replica under the new account.
        replica_id: DraftId,
        /// New owning account.
        account_id: AccountId,
    },
}

/// One-shot coordinator for the create+destroy reassignment protocol.
pub struct ReassignmentCoordinator {
    queue: Arc<dyn WriteQueue>,
    directory: Arc<dyn AccountDirectory>,
}

impl ReassignmentCoordinator {
    /// Creates a coordinator over the given collaborators.
    #[must_use]
    pub fn new(queue: Arc<dyn WriteQueue>, directory: Arc<dyn AccountDirectory>) -> Self {
        Self { queue, directory }
    }

    /// Guarantees the draft's owning account matches its from-address.
    ///
    /// No-op when the resolved account already owns the draft. Otherwise
    /// enqueues a replica create under the resolved account, waits for
    /// that request's local completion, and then enqueues the destroy of
    /// the original storage identity. The external key is preserved across
    /// both documents, so live sessions keep resolving to the reassigned
    /// draft once change notifications propagate.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoMatchingAccount`] when no account is configured
    /// for the from-address; [`SessionError::Reassignment`] tagging the
    /// step that failed when the queue rejects a request or the create's
    /// local completion fails. On any failure at the create step, the
    /// destroy is never enqueued.
    pub async fn ensure_correct_account(&self, draft: &DraftDocument) -> Result<ReassignOutcome> {
        let from_address = draft
            .from_address()
            .map(|r| r.email.clone())
            .unwrap_or_default();
        let account = self
            .directory
            .account_for_address(&from_address)
            .await
            .ok_or(SessionError::NoMatchingAccount(from_address))?;

        if account.id == draft.account_id {
            return Ok(ReassignOutcome::AlreadyCorrect);
        }

        let step = ReassignStep::CreateReplica;
        tracing::debug!(key = %draft.header_message_id, ?step, "reassignment step");
        let replica = draft.reassigned_to(account.id.clone());
        let replica_id = replica.id.clone();
        let create_ticket = self
            .queue
            .enqueue_create(replica)
            .await
            .map_err(|source| SessionError::Reassignment { step, source })?;
        create_ticket
            .applied()
            .await
            .map_err(|source| SessionError::Reassignment { step, source })?;

        let step = ReassignStep::DestroyOriginal;
        tracing::debug!(key = %draft.header_message_id, ?step, "reassignment step");
        let destroy_ticket = self
            .queue
            .enqueue_destroy(draft.id.clone(), draft.account_id.clone())
            .await
            .map_err(|source| SessionError::Reassignment { step, source })?;
        destroy_ticket
            .applied()
            .await
            .map_err(|source| SessionError::Reassignment { step, source })?;

        tracing::info!(
            key = %draft.header_message_id,
            from = %draft.account_id,
            to = %account.id,
            "draft reassigned"
        );
        Ok(ReassignOutcome::Reassigned {
            replica_id,
            account_id: account.id,
        })
    }
}
