//! The conditional store contract.
//!
//! Every higher component depends on exactly one primitive: an atomic
//! compare-and-mutate over a single document, plus grouped multi-document
//! writes for the few operations that must touch two records together.
//!
//! # Design
//!
//! The store is schema-agnostic. Documents are JSON bodies addressed by a
//! [`DocumentKey`] and grouped by a `partition` (the owning event), which is
//! the only secondary index the engine needs. A mutation runs while the store
//! holds the document exclusively, so the predicate it evaluates is the state
//! at write time, never a stale read.
//!
//! # Implementations
//!
//! - `InMemoryStore` (in `roundhouse-testing`): mutex-linearized, for tests
//! - `PostgresStore` (in `roundhouse-postgres`): `SELECT … FOR UPDATE` transactions
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` so the store can be shared as
//! `Arc<dyn ConditionalStore>` across request handlers.

use crate::error::EngineError;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Mutation evaluated under exclusive access.
///
/// Receives the current body (`None` if absent) and returns the new body
/// (`None` deletes the document), or rejects with a business error. A
/// rejection leaves the document untouched.
pub type Mutation = Box<dyn FnOnce(Option<Value>) -> Result<Option<Value>, EngineError> + Send>;

/// Read-only predicate evaluated under exclusive access.
pub type Predicate = Box<dyn FnOnce(Option<&Value>) -> Result<(), EngineError> + Send>;

/// Address of a document.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentKey {
    /// Collection name (`events`, `rounds`, `teams`, ...)
    pub collection: String,
    /// Identifier within the collection
    pub id: String,
}

impl DocumentKey {
    /// Create a key.
    #[must_use]
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document as held by the store.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    /// Address
    pub key: DocumentKey,
    /// Owning partition (event id)
    pub partition: String,
    /// Incremented on every successful write
    pub version: u64,
    /// JSON body
    pub body: Value,
}

/// One step of a grouped write.
pub enum WriteOp {
    /// Conditionally create, replace or delete a document.
    Write {
        /// Target document
        key: DocumentKey,
        /// Partition assigned when the document is created
        partition: String,
        /// Predicate-and-mutation
        mutation: Mutation,
    },
    /// Assert a predicate on a document without writing it.
    Check {
        /// Target document
        key: DocumentKey,
        /// Predicate
        predicate: Predicate,
    },
}

impl WriteOp {
    /// Key touched by this step.
    #[must_use]
    pub const fn key(&self) -> &DocumentKey {
        match self {
            Self::Write { key, .. } | Self::Check { key, .. } => key,
        }
    }

    /// Returns `true` if this step may write.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }
}

impl fmt::Debug for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write { key, partition, .. } => f
                .debug_struct("WriteOp::Write")
                .field("key", key)
                .field("partition", partition)
                .finish_non_exhaustive(),
            Self::Check { key, .. } => f
                .debug_struct("WriteOp::Check")
                .field("key", key)
                .finish_non_exhaustive(),
        }
    }
}

/// Result of one step of a committed grouped write.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteOutcome {
    /// Key of the step
    pub key: DocumentKey,
    /// Version after the write (unchanged for checks, 0 for deleted documents)
    pub version: u64,
    /// Body after the write (`None` if deleted or absent)
    pub body: Option<Value>,
}

/// Errors from store operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A mutation or predicate rejected the write; nothing was applied.
    #[error("{0}")]
    Rejected(EngineError),

    /// The backend failed (connection, query, lock timeout).
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A document body could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Rejected(inner) => inner,
            StoreError::Backend(message) => Self::Internal(message),
            StoreError::Serialization(message) => {
                Self::Internal(format!("serialization: {message}"))
            },
        }
    }
}

/// Atomic compare-and-mutate document store.
///
/// # Guarantees
///
/// - Writes to a single document are linearizable: of a set of racing
///   mutations on the same key, each observes the result of the previous one.
/// - [`ConditionalStore::transact`] applies all steps or none.
/// - A rejected mutation surfaces [`StoreError::Rejected`] unchanged; the
///   store never retries it.
pub trait ConditionalStore: Send + Sync {
    /// Read a single document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the backend is unavailable.
    fn read<'a>(&'a self, key: &'a DocumentKey) -> StoreFuture<'a, Option<StoredDocument>>;

    /// List every document of `collection` in `partition`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the backend is unavailable.
    fn list<'a>(
        &'a self,
        collection: &'a str,
        partition: &'a str,
    ) -> StoreFuture<'a, Vec<StoredDocument>>;

    /// Apply a group of steps atomically.
    ///
    /// Outcomes are returned in the same order as `ops`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Rejected`]: a step rejected; nothing was written
    /// - [`StoreError::Backend`]: the backend failed; nothing was written
    fn transact(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, Vec<WriteOutcome>>;

    /// Conditionally mutate a single document.
    ///
    /// # Errors
    ///
    /// Same as [`ConditionalStore::transact`].
    fn update_if(
        &self,
        key: DocumentKey,
        partition: String,
        mutation: Mutation,
    ) -> StoreFuture<'_, WriteOutcome> {
        Box::pin(async move {
            let mut outcomes = self
                .transact(vec![WriteOp::Write {
                    key,
                    partition,
                    mutation,
                }])
                .await?;
            outcomes
                .pop()
                .ok_or_else(|| StoreError::Backend("transaction returned no outcome".to_string()))
        })
    }
}

impl<T: ConditionalStore + ?Sized> ConditionalStore for Arc<T> {
    fn read<'a>(&'a self, key: &'a DocumentKey) -> StoreFuture<'a, Option<StoredDocument>> {
        (**self).read(key)
    }

    fn list<'a>(
        &'a self,
        collection: &'a str,
        partition: &'a str,
    ) -> StoreFuture<'a, Vec<StoredDocument>> {
        (**self).list(collection, partition)
    }

    fn transact(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, Vec<WriteOutcome>> {
        (**self).transact(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_store_error_unwraps_to_business_error() {
        let err: EngineError = StoreError::Rejected(EngineError::conflict("team full")).into();
        assert_eq!(err, EngineError::conflict("team full"));
    }

    #[test]
    fn backend_error_becomes_internal() {
        let err: EngineError = StoreError::Backend("connection reset".to_string()).into();
        assert!(matches!(err, EngineError::Internal(_)));
    }

    #[test]
    fn keys_order_by_collection_then_id() {
        let mut keys = vec![
            DocumentKey::new("teams", "b"),
            DocumentKey::new("events", "z"),
            DocumentKey::new("teams", "a"),
        ];
        keys.sort();
        assert_eq!(keys[0].collection, "events");
        assert_eq!(keys[1].id, "a");
    }
}
