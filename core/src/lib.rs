//! # Roundhouse Core
//!
//! Domain records, the error taxonomy and the conditional store contract for
//! the Roundhouse competition engine.
//!
//! ## Core Concepts
//!
//! - **Records**: [`Event`], [`Round`], [`Team`], [`Registration`] plus the
//!   uniqueness claims that make cross-record rules atomic
//! - **ConditionalStore**: the only correctness dependency; an atomic
//!   compare-and-mutate over single documents plus grouped writes
//! - **Documents / Transaction**: typed access to the store
//! - **Environment**: injected collaborators (`Clock`, `Notifier`,
//!   `CacheInvalidator`, `RegistrationPolicy`)
//!
//! ## Concurrency Model
//!
//! Request handlers are stateless and run concurrently with no in-process
//! locks. Every invariant that can be violated by a race is re-checked inside
//! the store's write, never against an earlier read.

pub mod documents;
pub mod environment;
pub mod error;
pub mod ids;
pub mod records;
pub mod store;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use documents::{Committed, Document, Documents, Transaction};
pub use environment::{
    CacheInvalidator, Clock, NoopInvalidator, NoopNotifier, Notification, Notifier, NotifyError,
    RegistrationPolicy, SystemClock, WindowPolicy,
};
pub use error::{EngineError, ErrorKind, FieldError, Result, Validator};
pub use ids::{EventId, InviteCode, ParseIdError, RegistrationId, TeamId, UserId};
pub use records::{
    Actor, Event, InviteCodeEntry, MembershipClaim, Registration, RegistrationClaim,
    RegistrationStatus, Round, RoundStatus, Team, TeamStatus, windows_overlap,
};
pub use store::{
    ConditionalStore, DocumentKey, Mutation, Predicate, StoreError, StoreFuture, StoredDocument,
    WriteOp, WriteOutcome,
};
