//! External write queue contract.
//!
//! The engine never persists anything itself; it enqueues full-document
//! writes against a durable task queue and waits only for each request's
//! *applied to local state* signal. Remote durability is the queue's
//! business and the engine never blocks on it.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

use draftledger_model::{AccountId, DraftDocument, DraftId};

/// Errors reported by the write queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The queue refused the request.
    #[error("write queue rejected the task: {0}")]
    Rejected(String),

    /// The queue dropped the request before applying it locally.
    #[error("write queue dropped the task before applying it locally")]
    Abandoned,
}

/// Awaitable local-completion signal for one enqueued request.
///
/// Resolves when the queue has applied the request to local state. This
/// is deliberately distinct from "durably synced remotely", which the
/// engine never waits on.
#[derive(Debug)]
pub struct TaskTicket {
    rx: oneshot::Receiver<Result<(), TaskError>>,
}

impl TaskTicket {
    /// Creates a ticket plus the completion handle the queue resolves it
    /// with.
    #[must_use]
    pub fn pending() -> (Self, TaskCompletion) {
        let (tx, rx) = oneshot::channel();
        (Self { rx }, TaskCompletion { tx })
    }

    /// Creates a ticket that is already applied.
    ///
    /// Convenience for queues that apply local state synchronously.
    #[must_use]
    pub fn applied_now() -> Self {
        let (ticket, completion) = Self::pending();
        completion.applied();
        ticket
    }

    /// Waits for the request to be applied to local state.
    ///
    /// # Errors
    ///
    /// Returns the queue's failure, or [`TaskError::Abandoned`] if the
    /// queue dropped its completion handle without resolving.
    pub async fn applied(self) -> Result<(), TaskError> {
        self.rx.await.unwrap_or(Err(TaskError::Abandoned))
    }
}

/// Resolves a [`TaskTicket`] once the queue applies the request locally.
#[derive(Debug)]
pub struct TaskCompletion {
    tx: oneshot::Sender<Result<(), TaskError>>,
}

impl TaskCompletion {
    /// Marks the request as applied to local state.
    pub fn applied(self) {
        let _ = self.tx.send(Ok(()));
    }

    /// Marks the request as failed.
    pub fn failed(self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(TaskError::Rejected(reason.into())));
    }
}

/// Durable write/task queue consumed by the engine.
///
/// Each method enqueues one request and returns its ticket; enqueueing
/// succeeding says nothing about the write itself, which the caller
/// observes through the ticket.
#[async_trait]
pub trait WriteQueue: Send + Sync {
    /// Enqueues a save of the full draft (the writer always receives a
    /// complete document, never a partial diff).
    async fn enqueue_save(&self, draft: DraftDocument) -> Result<TaskTicket, TaskError>;

    /// Enqueues creation of a new draft.
    async fn enqueue_create(&self, draft: DraftDocument) -> Result<TaskTicket, TaskError>;

    /// Enqueues destruction of one storage identity.
    async fn enqueue_destroy(
        &self,
        id: DraftId,
        account_id: AccountId,
    ) -> Result<TaskTicket, TaskError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticket_resolves_on_applied() {
        let (ticket, completion) = TaskTicket::pending();
        completion.applied();
        assert_eq!(ticket.applied().await, Ok(()));
    }

    #[tokio::test]
    async fn ticket_surfaces_failure() {
        let (ticket, completion) = TaskTicket::pending();
        completion.failed("disk full");
        assert_eq!(
            ticket.applied().await,
            Err(TaskError::Rejected("disk full".into()))
        );
    }

    #[tokio::test]
    async fn dropped_completion_is_abandoned() {
        let (ticket, completion) = TaskTicket::pending();
        drop(completion);
        assert_eq!(ticket.applied().await, Err(TaskError::Abandoned));
    }

    #[tokio::test]
    async fn applied_now_is_immediate() {
        assert_eq!(TaskTicket::applied_now().applied().await, Ok(()));
    }

    #[test]
    fn ticket_is_pending_until_resolved() {
        let (ticket, completion) = TaskTicket::pending();
        let mut applied = tokio_test::task::spawn(ticket.applied());

        assert!(applied.poll().is_pending());
        completion.applied();
        assert!(applied.is_woken());
        assert_eq!(applied.poll(), std::task::Poll::Ready(Ok(())));
    }
}
