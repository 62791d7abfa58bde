//! # draftledger-model
//!
//! Domain model for the `draftledger` draft synchronization engine.
//!
//! This crate provides:
//! - Typed identifiers (storage identity vs. the stable external key)
//! - The draft document and its immutable-snapshot semantics
//! - The textual/structured body pairing and its codec seam
//! - Partial wire records and field patches
//! - Pure copy-on-write apply and field-selective merge
//!
//! Everything here is synchronous and runtime-free; the async engine lives
//! in `draftledger-core`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod body;
pub mod draft;
pub mod identifiers;

pub use body::{BodyCodec, DraftBody, PlainTextCodec, StructuredBody};
pub use draft::{
    BodyEdit, DraftDocument, DraftPatch, DraftRecord, FileStub, Recipient, RecordError,
    SendProblem,
};
pub use identifiers::{AccountId, DraftId, HeaderMessageId, PluginId};
