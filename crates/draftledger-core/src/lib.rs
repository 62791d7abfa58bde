//! # draftledger-core
//!
//! Local-authoritative draft synchronization engine.
//!
//! This crate keeps a mutable email draft available for immediate,
//! low-latency editing while coordinating its durable persistence and
//! reconciling concurrently arriving updates from other sources. It
//! provides:
//! - **`DraftSession`** - one logical draft, one published immutable
//!   snapshot, `Loading → Ready → Destroyed` lifecycle
//! - **`ChangeSet`** - debounced change accumulation with an injected
//!   clock, so persistence lags typing without ever delaying visibility
//! - **Field-selective merge** - external changes reconcile into the
//!   latest snapshot without clobbering uncommitted local edits
//! - **`ReassignmentCoordinator`** - create+destroy choreography that
//!   moves a draft to the account its from-address implies, preserving
//!   the stable external key
//!
//! Storage, the durable write queue, and account lookup are consumed
//! through traits; see [`queue`] and [`store`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod changeset;
pub mod clock;
mod error;
pub mod queue;
pub mod reassign;
pub mod session;
pub mod store;

pub use changeset::{COALESCE_WINDOW, ChangeSet, CommitToken, DebouncePolicy, IDLE_INTERVAL, TimerAction};
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{Result, SessionError};
pub use queue::{TaskCompletion, TaskError, TaskTicket, WriteQueue};
pub use reassign::{ReassignOutcome, ReassignStep, ReassignmentCoordinator};
pub use session::{DraftSession, SessionContext, SnapshotRef};
pub use store::{AccountDirectory, AccountInfo, DraftStore, StoreError, StoreEvent};
