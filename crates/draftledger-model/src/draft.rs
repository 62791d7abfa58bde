//! Draft document, partial records, and field patches.
//!
//! [`DraftDocument`] is the value a session publishes as its immutable
//! snapshot. All mutation is expressed as pure copy-on-write: local edits
//! through [`DraftDocument::with_patch`], remote reconciliation through
//! [`DraftDocument::merged`]. Neither ever mutates `self`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::body::{BodyCodec, DraftBody, StructuredBody};
use crate::identifiers::{AccountId, DraftId, HeaderMessageId, PluginId};

/// A message participant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Recipient {
    /// Email address.
    pub email: String,
    /// Display name (may be empty).
    pub name: String,
}

impl Recipient {
    /// Creates a recipient with an address and no display name.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: String::new(),
        }
    }

    /// Creates a recipient with an address and display name.
    #[must_use]
    pub fn named(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.email)
        } else {
            write!(f, "{} <{}>", self.name, self.email)
        }
    }
}

/// Reference to a file attached to a draft.
///
/// The engine only tracks attachment identity; file contents live with the
/// storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStub {
    /// Storage identifier of the file.
    pub id: String,
    /// Original filename.
    pub filename: String,
    /// Size in bytes, when known.
    pub size: Option<u64>,
}

/// An email draft at a point in time.
///
/// Once published by a session this value is treated as immutable by every
/// other component; further mutation goes through [`Self::with_patch`] or
/// [`Self::merged`], never in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftDocument {
    /// Storage identifier. May change (see [`Self::reassigned_to`]).
    pub id: DraftId,
    /// Owning account. May change across reassignment.
    pub account_id: AccountId,
    /// Stable external key; assigned once, never reassigned.
    pub header_message_id: HeaderMessageId,
    /// Sender addresses.
    pub from: Vec<Recipient>,
    /// Primary recipients.
    pub to: Vec<Recipient>,
    /// Carbon-copy recipients.
    pub cc: Vec<Recipient>,
    /// Blind carbon-copy recipients.
    pub bcc: Vec<Recipient>,
    /// Reply-to addresses.
    pub reply_to: Vec<Recipient>,
    /// Subject line.
    pub subject: String,
    /// Body content (textual rendering paired with its structure).
    pub body: DraftBody,
    /// Attached files.
    pub files: Vec<FileStub>,
    /// Unread flag.
    pub unread: bool,
    /// Starred flag.
    pub starred: bool,
    /// Draft flag; cleared by the sync layer once the message is sent.
    pub draft: bool,
    /// Storage version, assigned by the durable layer.
    pub version: u32,
    /// Last modification timestamp.
    pub date: DateTime<Utc>,
    /// Plugin-authored metadata, namespaced by plugin id.
    pub metadata: BTreeMap<PluginId, serde_json::Value>,
}

/// A body edit carried by a [`DraftPatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BodyEdit {
    /// Replace the body from text; the structure is regenerated.
    Text(String),
    /// Replace the body from a structured payload; the text is regenerated.
    Structured(StructuredBody),
}

/// A set of not-yet-committed field edits.
///
/// Every content field is optional; only fields explicitly set participate
/// in an apply. Merging two patches is last-write-wins per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftPatch {
    /// New sender list, if edited.
    pub from: Option<Vec<Recipient>>,
    /// New primary recipients, if edited.
    pub to: Option<Vec<Recipient>>,
    /// New cc recipients, if edited.
    pub cc: Option<Vec<Recipient>>,
    /// New bcc recipients, if edited.
    pub bcc: Option<Vec<Recipient>>,
    /// New reply-to list, if edited.
    pub reply_to: Option<Vec<Recipient>>,
    /// New subject, if edited.
    pub subject: Option<String>,
    /// Body replacement, if edited.
    pub body: Option<BodyEdit>,
    /// New attachment list, if edited.
    pub files: Option<Vec<FileStub>>,
    /// New unread flag, if edited.
    pub unread: Option<bool>,
    /// New starred flag, if edited.
    pub starred: Option<bool>,
    /// Plugin metadata entries to set, keyed by plugin id.
    pub metadata: BTreeMap<PluginId, serde_json::Value>,
}

impl DraftPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the primary recipients.
    #[must_use]
    pub fn to(mut self, to: Vec<Recipient>) -> Self {
        self.to = Some(to);
        self
    }

    /// Sets the cc recipients.
    #[must_use]
    pub fn cc(mut self, cc: Vec<Recipient>) -> Self {
        self.cc = Some(cc);
        self
    }

    /// Sets the bcc recipients.
    #[must_use]
    pub fn bcc(mut self, bcc: Vec<Recipient>) -> Self {
        self.bcc = Some(bcc);
        self
    }

    /// Sets the sender list.
    #[must_use]
    pub fn from(mut self, from: Vec<Recipient>) -> Self {
        self.from = Some(from);
        self
    }

    /// Replaces the body from text.
    #[must_use]
    pub fn body_text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(BodyEdit::Text(text.into()));
        self
    }

    /// Replaces the body from a structured payload.
    #[must_use]
    pub fn body_structured(mut self, structured: StructuredBody) -> Self {
        self.body = Some(BodyEdit::Structured(structured));
        self
    }

    /// Sets the attachment list.
    #[must_use]
    pub fn files(mut self, files: Vec<FileStub>) -> Self {
        self.files = Some(files);
        self
    }

    /// Sets a plugin metadata entry.
    #[must_use]
    pub fn metadata(mut self, plugin_id: PluginId, value: serde_json::Value) -> Self {
        self.metadata.insert(plugin_id, value);
        self
    }

    /// Merges `other` into `self`, last-write-wins per field.
    pub fn merge(&mut self, other: Self) {
        macro_rules! take_if_set {
            ($($field:ident),+ $(,)?) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })+
            };
        }
        take_if_set!(from, to, cc, bcc, reply_to, subject, body, files, unread, starred);
        self.metadata.extend(other.metadata);
    }

    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.from.is_none()
            && self.to.is_none()
            && self.cc.is_none()
            && self.bcc.is_none()
            && self.reply_to.is_none()
            && self.subject.is_none()
            && self.body.is_none()
            && self.files.is_none()
            && self.unread.is_none()
            && self.starred.is_none()
            && self.metadata.is_empty()
    }
}

/// A partial draft record as observed from storage.
///
/// This is the shape of load-query results and change-notification
/// payloads. Only the external key is required: a field left as `None`
/// means "nothing observed", never "cleared". The merge in
/// [`DraftDocument::merged`] therefore cannot distinguish a downstream
/// clear from an omission; that matches the storage contract, which sends
/// the fields it has.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    /// Stable external key. Always present.
    pub header_message_id: HeaderMessageId,
    /// Storage identifier, if observed.
    pub id: Option<DraftId>,
    /// Owning account, if observed.
    pub account_id: Option<AccountId>,
    /// Sender addresses, if observed.
    pub from: Option<Vec<Recipient>>,
    /// Primary recipients, if observed.
    pub to: Option<Vec<Recipient>>,
    /// Cc recipients, if observed.
    pub cc: Option<Vec<Recipient>>,
    /// Bcc recipients, if observed.
    pub bcc: Option<Vec<Recipient>>,
    /// Reply-to addresses, if observed.
    pub reply_to: Option<Vec<Recipient>>,
    /// Subject, if observed.
    pub subject: Option<String>,
    /// Rendered body text, if the record carries its content payload.
    pub body: Option<String>,
    /// Attachments, if observed.
    pub files: Option<Vec<FileStub>>,
    /// Unread flag, if observed.
    pub unread: Option<bool>,
    /// Starred flag, if observed.
    pub starred: Option<bool>,
    /// Draft flag, if observed.
    pub draft: Option<bool>,
    /// Storage version, if observed.
    pub version: Option<u32>,
    /// Modification timestamp, if observed.
    pub date: Option<DateTime<Utc>>,
    /// Plugin metadata, if observed.
    pub metadata: Option<BTreeMap<PluginId, serde_json::Value>>,
}

impl DraftRecord {
    /// Creates an empty record for the given external key.
    #[must_use]
    pub fn new(header_message_id: HeaderMessageId) -> Self {
        Self {
            header_message_id,
            ..Self::default()
        }
    }

    /// Promotes the record to a full document.
    ///
    /// Requires storage identity and the body content payload; a record
    /// without them is a summary row, not a loadable draft.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MissingField`] naming the first absent
    /// required field.
    pub fn into_document(self, codec: &dyn BodyCodec) -> Result<DraftDocument, RecordError> {
        let id = self.id.ok_or(RecordError::MissingField("id"))?;
        let account_id = self
            .account_id
            .ok_or(RecordError::MissingField("account_id"))?;
        let body_text = self.body.ok_or(RecordError::MissingField("body"))?;

        Ok(DraftDocument {
            id,
            account_id,
            header_message_id: self.header_message_id,
            from: self.from.unwrap_or_default(),
            to: self.to.unwrap_or_default(),
            cc: self.cc.unwrap_or_default(),
            bcc: self.bcc.unwrap_or_default(),
            reply_to: self.reply_to.unwrap_or_default(),
            subject: self.subject.unwrap_or_default(),
            body: DraftBody::from_text(body_text, codec),
            files: self.files.unwrap_or_default(),
            unread: self.unread.unwrap_or(false),
            starred: self.starred.unwrap_or(false),
            draft: self.draft.unwrap_or(true),
            version: self.version.unwrap_or(0),
            date: self.date.unwrap_or_else(Utc::now),
            metadata: self.metadata.unwrap_or_default(),
        })
    }
}

/// Errors promoting a [`DraftRecord`] to a [`DraftDocument`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    /// A required field was absent from the record.
    #[error("draft record is missing required field `{0}`")]
    MissingField(&'static str),
}

/// A reason a draft is not ready to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendProblem {
    /// No recipient in to, cc, or bcc.
    NoRecipients,
    /// Subject line is empty.
    EmptySubject,
    /// Body has no visible content.
    EmptyBody,
}

impl DraftDocument {
    /// Returns the first sender address, if any.
    #[must_use]
    pub fn from_address(&self) -> Option<&Recipient> {
        self.from.first()
    }

    /// Produces a new document with each set patch field overwritten.
    ///
    /// Shallow copy-on-write: unset patch fields keep the current value,
    /// body edits regenerate the text/structure pairing through the codec,
    /// and metadata entries are attached under their plugin id rather than
    /// becoming content fields.
    #[must_use]
    pub fn with_patch(&self, patch: &DraftPatch, codec: &dyn BodyCodec) -> Self {
        let mut next = self.clone();

        macro_rules! overwrite {
            ($($field:ident),+ $(,)?) => {
                $(if let Some(value) = &patch.$field {
                    next.$field = value.clone();
                })+
            };
        }
        overwrite!(from, to, cc, bcc, reply_to, subject, files, unread, starred);

        match &patch.body {
            Some(BodyEdit::Text(text)) => next.body = DraftBody::from_text(text.clone(), codec),
            Some(BodyEdit::Structured(structured)) => {
                next.body = DraftBody::from_structured(structured.clone(), codec);
            }
            None => {}
        }

        for (plugin_id, value) in &patch.metadata {
            next.metadata.insert(plugin_id.clone(), value.clone());
        }

        next
    }

    /// Reconciles an externally observed record into this document.
    ///
    /// Compares a fixed field list, excluding the external key. Each field
    /// the record actually carries and whose value differs is adopted;
    /// absent fields never overwrite. Storage identity participates so a
    /// completed reassignment propagates into live sessions.
    ///
    /// Returns `None` when nothing differs, so callers can skip publishing.
    #[must_use]
    pub fn merged(&self, record: &DraftRecord, codec: &dyn BodyCodec) -> Option<Self> {
        if record.header_message_id != self.header_message_id {
            return None;
        }

        let mut next = self.clone();
        let mut changed = false;

        macro_rules! adopt {
            ($($field:ident),+ $(,)?) => {
                $(if let Some(value) = &record.$field {
                    if *value != next.$field {
                        next.$field = value.clone();
                        changed = true;
                    }
                })+
            };
        }
        adopt!(
            id, account_id, from, to, cc, bcc, reply_to, subject, files, unread, starred, draft,
            version, date, metadata,
        );

        if let Some(body_text) = &record.body {
            if body_text != next.body.text() {
                next.body = DraftBody::from_text(body_text.clone(), codec);
                changed = true;
            }
        }

        changed.then_some(next)
    }

    /// Builds the reassignment replica of this draft for a new owner.
    ///
    /// Same external key and content fields, fresh storage identity,
    /// version reset, send-state flags cleared.
    #[must_use]
    pub fn reassigned_to(&self, account_id: AccountId) -> Self {
        let mut replica = self.clone();
        replica.id = DraftId::generate();
        replica.account_id = account_id;
        replica.version = 0;
        replica.draft = true;
        replica.unread = false;
        replica
    }

    /// Checks whether the draft is ready to send.
    ///
    /// Pure and layered on the snapshot; wording for the user belongs to
    /// the caller.
    #[must_use]
    pub fn send_problems(&self) -> Vec<SendProblem> {
        let mut problems = Vec::new();
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            problems.push(SendProblem::NoRecipients);
        }
        if self.subject.trim().is_empty() {
            problems.push(SendProblem::EmptySubject);
        }
        if self.body.is_empty() {
            problems.push(SendProblem::EmptyBody);
        }
        problems
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::body::PlainTextCodec;

    fn sample_draft() -> DraftDocument {
        DraftDocument {
            id: DraftId::new("d-1"),
            account_id: AccountId::new("acct-a"),
            header_message_id: HeaderMessageId::new("msg-1@local"),
            from: vec![Recipient::new("me@a.example")],
            to: vec![Recipient::new("you@b.example")],
            cc: vec![],
            bcc: vec![],
            reply_to: vec![],
            subject: "Hi".into(),
            body: DraftBody::from_text("hello", &PlainTextCodec),
            files: vec![],
            unread: false,
            starred: false,
            draft: true,
            version: 3,
            date: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    mod patch_tests {
        use super::*;

        #[test]
        fn merge_is_last_write_wins_per_field() {
            let mut first = DraftPatch::new().subject("Lunch?").body_text("v1");
            let second = DraftPatch::new().subject("Lunch tomorrow?");
            first.merge(second);

            assert_eq!(first.subject.as_deref(), Some("Lunch tomorrow?"));
            assert_eq!(first.body, Some(BodyEdit::Text("v1".into())));
        }

        #[test]
        fn merge_keeps_unset_fields() {
            let mut first = DraftPatch::new().to(vec![Recipient::new("x@example.com")]);
            first.merge(DraftPatch::new().subject("s"));
            assert!(first.to.is_some());
        }

        #[test]
        fn merge_combines_metadata_namespaces() {
            let mut first = DraftPatch::new().metadata(PluginId::new("a"), serde_json::json!(1));
            first.merge(DraftPatch::new().metadata(PluginId::new("b"), serde_json::json!(2)));
            assert_eq!(first.metadata.len(), 2);
        }

        #[test]
        fn is_empty() {
            assert!(DraftPatch::new().is_empty());
            assert!(!DraftPatch::new().subject("s").is_empty());
            assert!(
                !DraftPatch::new()
                    .metadata(PluginId::new("p"), serde_json::Value::Null)
                    .is_empty()
            );
        }
    }

    mod apply_tests {
        use super::*;

        #[test]
        fn with_patch_overwrites_only_set_fields() {
            let draft = sample_draft();
            let next = draft.with_patch(&DraftPatch::new().subject("New"), &PlainTextCodec);

            assert_eq!(next.subject, "New");
            assert_eq!(next.to, draft.to);
            assert_eq!(next.body, draft.body);
        }

        #[test]
        fn body_edit_regenerates_pairing() {
            let draft = sample_draft();
            let next = draft.with_patch(&DraftPatch::new().body_text("a\n\nb"), &PlainTextCodec);

            assert_eq!(next.body.text(), "a\n\nb");
            let paragraphs = next.body.structured().as_value().as_array().unwrap();
            assert_eq!(paragraphs.len(), 2);
        }

        #[test]
        fn metadata_routes_to_namespace_not_content() {
            let draft = sample_draft();
            let patch =
                DraftPatch::new().metadata(PluginId::new("tracker"), serde_json::json!({"on": true}));
            let next = draft.with_patch(&patch, &PlainTextCodec);

            assert_eq!(next.subject, draft.subject);
            assert_eq!(
                next.metadata.get(&PluginId::new("tracker")),
                Some(&serde_json::json!({"on": true}))
            );
        }

        #[test]
        fn with_patch_leaves_original_untouched() {
            let draft = sample_draft();
            let _ = draft.with_patch(&DraftPatch::new().subject("changed"), &PlainTextCodec);
            assert_eq!(draft.subject, "Hi");
        }
    }

    mod merge_tests {
        use super::*;

        fn record_for(draft: &DraftDocument) -> DraftRecord {
            DraftRecord::new(draft.header_message_id.clone())
        }

        #[test]
        fn identical_record_yields_none() {
            let draft = sample_draft();
            let mut record = record_for(&draft);
            record.subject = Some(draft.subject.clone());
            record.unread = Some(draft.unread);

            assert!(draft.merged(&record, &PlainTextCodec).is_none());
        }

        #[test]
        fn differing_subject_updates_only_subject() {
            let draft = sample_draft();
            let mut record = record_for(&draft);
            record.subject = Some("Changed elsewhere".into());

            let next = draft.merged(&record, &PlainTextCodec).unwrap();
            assert_eq!(next.subject, "Changed elsewhere");
            assert_eq!(next.to, draft.to);
            assert_eq!(next.body, draft.body);
        }

        #[test]
        fn absent_fields_never_overwrite() {
            let draft = sample_draft();
            let mut record = record_for(&draft);
            record.version = Some(9);
            // No subject, no body on the record.

            let next = draft.merged(&record, &PlainTextCodec).unwrap();
            assert_eq!(next.subject, draft.subject);
            assert_eq!(next.body, draft.body);
            assert_eq!(next.version, 9);
        }

        #[test]
        fn foreign_key_is_ignored() {
            let draft = sample_draft();
            let mut record = DraftRecord::new(HeaderMessageId::new("other@local"));
            record.subject = Some("not ours".into());

            assert!(draft.merged(&record, &PlainTextCodec).is_none());
        }

        #[test]
        fn storage_identity_participates() {
            let draft = sample_draft();
            let mut record = record_for(&draft);
            record.id = Some(DraftId::new("d-2"));
            record.account_id = Some(AccountId::new("acct-b"));

            let next = draft.merged(&record, &PlainTextCodec).unwrap();
            assert_eq!(next.id, DraftId::new("d-2"));
            assert_eq!(next.account_id, AccountId::new("acct-b"));
            assert_eq!(next.header_message_id, draft.header_message_id);
        }

        #[test]
        fn body_merge_goes_through_codec() {
            let draft = sample_draft();
            let mut record = record_for(&draft);
            record.body = Some("one\n\ntwo".into());

            let next = draft.merged(&record, &PlainTextCodec).unwrap();
            assert_eq!(next.body.text(), "one\n\ntwo");
            assert_eq!(
                next.body.structured().as_value().as_array().unwrap().len(),
                2
            );
        }
    }

    mod record_tests {
        use super::*;

        #[test]
        fn into_document_requires_body() {
            let mut record = DraftRecord::new(HeaderMessageId::new("k"));
            record.id = Some(DraftId::new("d"));
            record.account_id = Some(AccountId::new("a"));

            let err = record.into_document(&PlainTextCodec).unwrap_err();
            assert_eq!(err, RecordError::MissingField("body"));
        }

        #[test]
        fn into_document_requires_identity() {
            let mut record = DraftRecord::new(HeaderMessageId::new("k"));
            record.body = Some("text".into());

            let err = record.into_document(&PlainTextCodec).unwrap_err();
            assert_eq!(err, RecordError::MissingField("id"));
        }

        #[test]
        fn into_document_fills_defaults() {
            let mut record = DraftRecord::new(HeaderMessageId::new("k"));
            record.id = Some(DraftId::new("d"));
            record.account_id = Some(AccountId::new("a"));
            record.body = Some("text".into());

            let doc = record.into_document(&PlainTextCodec).unwrap();
            assert!(doc.draft);
            assert!(doc.to.is_empty());
            assert_eq!(doc.version, 0);
            assert_eq!(doc.body.text(), "text");
        }
    }

    mod reassign_tests {
        use super::*;

        #[test]
        fn replica_preserves_key_and_content() {
            let draft = sample_draft();
            let replica = draft.reassigned_to(AccountId::new("acct-b"));

            assert_eq!(replica.header_message_id, draft.header_message_id);
            assert_eq!(replica.subject, draft.subject);
            assert_eq!(replica.to, draft.to);
            assert_eq!(replica.body, draft.body);
            assert_eq!(replica.account_id, AccountId::new("acct-b"));
            assert_ne!(replica.id, draft.id);
            assert_eq!(replica.version, 0);
            assert!(replica.draft);
            assert!(!replica.unread);
        }
    }

    mod send_tests {
        use super::*;

        #[test]
        fn complete_draft_has_no_problems() {
            assert!(sample_draft().send_problems().is_empty());
        }

        #[test]
        fn reports_each_problem() {
            let mut draft = sample_draft();
            draft.to.clear();
            draft.subject = "  ".into();
            draft.body = DraftBody::from_text("", &PlainTextCodec);

            let problems = draft.send_problems();
            assert!(problems.contains(&SendProblem::NoRecipients));
            assert!(problems.contains(&SendProblem::EmptySubject));
            assert!(problems.contains(&SendProblem::EmptyBody));
        }

        #[test]
        fn bcc_only_counts_as_recipient() {
            let mut draft = sample_draft();
            draft.to.clear();
            draft.bcc = vec![Recipient::new("hidden@example.com")];
            assert!(!draft.send_problems().contains(&SendProblem::NoRecipients));
        }
    }
}
