//! Drives one session end to end over in-memory collaborators.
//!
//! Run with `RUST_LOG=debug cargo run --example quickstart` to watch the
//! engine's tracing output.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use draftledger_core::{
    AccountDirectory, AccountInfo, DraftSession, DraftStore, SessionContext, StoreError,
    TaskError, TaskTicket, WriteQueue,
};
use draftledger_model::{
    AccountId, DraftDocument, DraftId, DraftPatch, DraftRecord, HeaderMessageId, PlainTextCodec,
    Recipient,
};

/// Applies every request immediately and remembers the saved documents.
#[derive(Default)]
struct MemoryQueue {
    saved: Mutex<Vec<DraftDocument>>,
}

#[async_trait]
impl WriteQueue for MemoryQueue {
    async fn enqueue_save(&self, draft: DraftDocument) -> Result<TaskTicket, TaskError> {
        self.saved.lock().unwrap_or_else(|e| e.into_inner()).push(draft);
        Ok(TaskTicket::applied_now())
    }

    async fn enqueue_create(&self, _draft: DraftDocument) -> Result<TaskTicket, TaskError> {
        Ok(TaskTicket::applied_now())
    }

    async fn enqueue_destroy(
        &self,
        _id: DraftId,
        _account_id: AccountId,
    ) -> Result<TaskTicket, TaskError> {
        Ok(TaskTicket::applied_now())
    }
}

struct EmptyStore;

#[async_trait]
impl DraftStore for EmptyStore {
    async fn find_draft(&self, _key: &HeaderMessageId) -> Result<Option<DraftRecord>, StoreError> {
        Ok(None)
    }
}

struct OneAccount;

#[async_trait]
impl AccountDirectory for OneAccount {
    async fn account_for_address(&self, email: &str) -> Option<AccountInfo> {
        (email == "me@example.com").then(|| AccountInfo::new(AccountId::new("acct-1"), email))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let queue = Arc::new(MemoryQueue::default());
    let ctx = SessionContext::new(
        Arc::clone(&queue) as Arc<dyn WriteQueue>,
        Arc::new(EmptyStore),
        Arc::new(OneAccount),
    );

    let mut record = DraftRecord::new(HeaderMessageId::new("quickstart@example.com"));
    record.id = Some(DraftId::generate());
    record.account_id = Some(AccountId::new("acct-1"));
    record.from = Some(vec![Recipient::new("me@example.com")]);
    record.body = Some("hello".into());
    let draft = record.into_document(&PlainTextCodec)?;

    let session = DraftSession::with_draft(ctx, draft);
    session.prepare().await?;

    session.apply_changes(DraftPatch::new().subject("Lunch tomorrow?"))?;
    session.commit().await?;

    let saved = queue.saved.lock().unwrap_or_else(|e| e.into_inner());
    println!(
        "committed {} document(s); latest subject: {:?}",
        saved.len(),
        saved.last().map(|d| d.subject.as_str())
    );
    Ok(())
}
