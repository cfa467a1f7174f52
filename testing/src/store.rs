//! In-memory [`ConditionalStore`].
//!
//! A single mutex linearizes every operation, which gives exactly the
//! guarantees the engine relies on from a production store: mutations see
//! the state at write time and grouped writes apply all-or-nothing.

use roundhouse_core::store::{
    ConditionalStore, DocumentKey, StoreError, StoreFuture, StoredDocument, WriteOp, WriteOutcome,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    documents: BTreeMap<DocumentKey, StoredDocument>,
    committed_transactions: u64,
    rejected_transactions: u64,
    fail_next: u32,
}

/// Mutex-linearized in-memory store for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store mutex poisoned".to_string()))
    }

    /// Make the next `count` operations fail with [`StoreError::Backend`].
    pub fn fail_next(&self, count: u32) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_next = count;
        }
    }

    /// Number of grouped writes that committed.
    #[must_use]
    pub fn committed_transactions(&self) -> u64 {
        self.inner.lock().map_or(0, |inner| inner.committed_transactions)
    }

    /// Number of grouped writes rejected by a mutation or predicate.
    #[must_use]
    pub fn rejected_transactions(&self) -> u64 {
        self.inner.lock().map_or(0, |inner| inner.rejected_transactions)
    }

    /// Number of documents held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.documents.len())
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_injected_failure(inner: &mut Inner) -> Result<(), StoreError> {
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(StoreError::Backend("injected failure".to_string()));
        }
        Ok(())
    }

    fn apply(inner: &mut Inner, ops: Vec<WriteOp>) -> Result<Vec<WriteOutcome>, StoreError> {
        // Staged view: later steps observe earlier steps of the same group.
        let mut staged: HashMap<DocumentKey, Option<StoredDocument>> = HashMap::new();
        let mut outcomes = Vec::with_capacity(ops.len());

        for op in ops {
            let key = op.key().clone();
            let current = staged
                .get(&key)
                .cloned()
                .unwrap_or_else(|| inner.documents.get(&key).cloned());

            match op {
                WriteOp::Check { predicate, .. } => {
                    predicate(current.as_ref().map(|doc| &doc.body)).map_err(StoreError::Rejected)?;
                    outcomes.push(WriteOutcome {
                        key,
                        version: current.as_ref().map_or(0, |doc| doc.version),
                        body: current.map(|doc| doc.body),
                    });
                },
                WriteOp::Write {
                    partition,
                    mutation,
                    ..
                } => {
                    let version = current.as_ref().map_or(0, |doc| doc.version);
                    let partition = current
                        .as_ref()
                        .map_or(partition, |doc| doc.partition.clone());
                    let next = mutation(current.map(|doc| doc.body)).map_err(StoreError::Rejected)?;
                    match next {
                        Some(body) => {
                            let doc = StoredDocument {
                                key: key.clone(),
                                partition,
                                version: version + 1,
                                body: body.clone(),
                            };
                            staged.insert(key.clone(), Some(doc));
                            outcomes.push(WriteOutcome {
                                key,
                                version: version + 1,
                                body: Some(body),
                            });
                        },
                        None => {
                            staged.insert(key.clone(), None);
                            outcomes.push(WriteOutcome {
                                key,
                                version: 0,
                                body: None,
                            });
                        },
                    }
                },
            }
        }

        for (key, doc) in staged {
            match doc {
                Some(doc) => {
                    inner.documents.insert(key, doc);
                },
                None => {
                    inner.documents.remove(&key);
                },
            }
        }
        Ok(outcomes)
    }
}

impl ConditionalStore for InMemoryStore {
    fn read<'a>(&'a self, key: &'a DocumentKey) -> StoreFuture<'a, Option<StoredDocument>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            Self::take_injected_failure(&mut inner)?;
            Ok(inner.documents.get(key).cloned())
        })
    }

    fn list<'a>(
        &'a self,
        collection: &'a str,
        partition: &'a str,
    ) -> StoreFuture<'a, Vec<StoredDocument>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            Self::take_injected_failure(&mut inner)?;
            Ok(inner
                .documents
                .values()
                .filter(|doc| doc.key.collection == collection && doc.partition == partition)
                .cloned()
                .collect())
        })
    }

    fn transact(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, Vec<WriteOutcome>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            Self::take_injected_failure(&mut inner)?;
            match Self::apply(&mut inner, ops) {
                Ok(outcomes) => {
                    inner.committed_transactions += 1;
                    Ok(outcomes)
                },
                Err(error) => {
                    inner.rejected_transactions += 1;
                    Err(error)
                },
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use roundhouse_core::EngineError;
    use serde_json::json;

    fn key(id: &str) -> DocumentKey {
        DocumentKey::new("counters", id)
    }

    fn set(value: i64) -> WriteOp {
        WriteOp::Write {
            key: key("a"),
            partition: "p".to_string(),
            mutation: Box::new(move |_| Ok(Some(json!({ "value": value })))),
        }
    }

    #[tokio::test]
    async fn write_then_read_bumps_version() {
        let store = InMemoryStore::new();
        store.transact(vec![set(1)]).await.unwrap();
        store.transact(vec![set(2)]).await.unwrap();

        let doc = store.read(&key("a")).await.unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.body["value"], 2);
        assert_eq!(doc.partition, "p");
    }

    #[tokio::test]
    async fn rejected_group_writes_nothing() {
        let store = InMemoryStore::new();
        let result = store
            .transact(vec![
                set(1),
                WriteOp::Check {
                    key: key("missing"),
                    predicate: Box::new(|doc| {
                        doc.map(|_| ()).ok_or_else(|| EngineError::conflict("absent"))
                    }),
                },
            ])
            .await;

        assert_eq!(result.unwrap_err(), StoreError::Rejected(EngineError::conflict("absent")));
        assert!(store.read(&key("a")).await.unwrap().is_none());
        assert_eq!(store.rejected_transactions(), 1);
    }

    #[tokio::test]
    async fn later_steps_see_earlier_steps() {
        let store = InMemoryStore::new();
        let outcomes = store
            .transact(vec![
                set(5),
                WriteOp::Write {
                    key: key("a"),
                    partition: "p".to_string(),
                    mutation: Box::new(|current| {
                        let value = current.unwrap()["value"].as_i64().unwrap();
                        Ok(Some(json!({ "value": value + 1 })))
                    }),
                },
            ])
            .await
            .unwrap();

        assert_eq!(outcomes[1].version, 2);
        assert_eq!(outcomes[1].body.as_ref().unwrap()["value"], 6);
    }

    #[tokio::test]
    async fn list_filters_by_collection_and_partition() {
        let store = InMemoryStore::new();
        store.transact(vec![set(1)]).await.unwrap();
        store
            .transact(vec![WriteOp::Write {
                key: DocumentKey::new("counters", "b"),
                partition: "other".to_string(),
                mutation: Box::new(|_| Ok(Some(json!({})))),
            }])
            .await
            .unwrap();

        assert_eq!(store.list("counters", "p").await.unwrap().len(), 1);
        assert_eq!(store.list("teams", "p").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn injected_failure_is_a_backend_error() {
        let store = InMemoryStore::new();
        store.fail_next(1);
        assert!(matches!(
            store.transact(vec![set(1)]).await,
            Err(StoreError::Backend(_))
        ));
        assert!(store.transact(vec![set(1)]).await.is_ok());
    }

    #[tokio::test]
    async fn deletes_remove_the_document() {
        let store = InMemoryStore::new();
        store.transact(vec![set(1)]).await.unwrap();
        store
            .update_if(key("a"), "p".to_string(), Box::new(|_| Ok(None)))
            .await
            .unwrap();
        assert!(store.is_empty());
    }
}
