//! Typed layer over the [`ConditionalStore`].
//!
//! Records are encoded as JSON bodies. [`Documents`] reads and lists typed
//! records; [`Transaction`] builds grouped writes out of typed closures so the
//! engine never touches raw `serde_json::Value`s.

use crate::error::{EngineError, Result};
use crate::store::{ConditionalStore, DocumentKey, WriteOp, WriteOutcome};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// A record stored in the [`ConditionalStore`].
pub trait Document: Serialize + DeserializeOwned + Send + 'static {
    /// Collection the record lives in.
    const COLLECTION: &'static str;

    /// Address of this record.
    fn key(&self) -> DocumentKey;

    /// Partition (owning event) of this record.
    fn partition(&self) -> String;
}

fn decode<D: Document>(body: Value) -> Result<D> {
    serde_json::from_value(body)
        .map_err(|e| EngineError::Internal(format!("corrupt {} document: {e}", D::COLLECTION)))
}

fn encode<D: Document>(doc: &D) -> Result<Value> {
    serde_json::to_value(doc)
        .map_err(|e| EngineError::Internal(format!("cannot encode {} document: {e}", D::COLLECTION)))
}

fn missing(key: &DocumentKey) -> EngineError {
    let resource = match key.collection.as_str() {
        "events" => "Event",
        "rounds" => "Round",
        "teams" => "Team",
        "registrations" => "Registration",
        other => other,
    };
    EngineError::not_found(resource, &key.id)
}

/// Typed access to a shared store.
#[derive(Clone)]
pub struct Documents {
    store: Arc<dyn ConditionalStore>,
}

impl Documents {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn ConditionalStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConditionalStore> {
        &self.store
    }

    /// Read a record, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Internal`] on backend or decoding failure.
    pub async fn get<D: Document>(&self, key: &DocumentKey) -> Result<Option<D>> {
        match self.store.read(key).await? {
            Some(doc) => decode(doc.body).map(Some),
            None => Ok(None),
        }
    }

    /// Read a record that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if absent.
    pub async fn require<D: Document>(&self, key: &DocumentKey) -> Result<D> {
        self.get(key).await?.ok_or_else(|| missing(key))
    }

    /// List every record of `D` in a partition, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Internal`] on backend or decoding failure.
    pub async fn list<D: Document>(&self, partition: &str) -> Result<Vec<D>> {
        self.store
            .list(D::COLLECTION, partition)
            .await?
            .into_iter()
            .map(|doc| decode(doc.body))
            .collect()
    }

    /// Conditionally mutate an existing record.
    ///
    /// `mutate` runs under exclusive access; returning an error aborts the write.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the record does not exist
    /// - whatever `mutate` rejects with
    pub async fn update<D, F>(&self, key: DocumentKey, partition: String, mutate: F) -> Result<D>
    where
        D: Document,
        F: FnOnce(&mut D) -> Result<()> + Send + 'static,
    {
        let mut outcomes = Transaction::new()
            .update(key, partition, mutate)
            .commit(self)
            .await?;
        outcomes.take(0)
    }

    /// Commit a grouped write.
    ///
    /// # Errors
    ///
    /// Returns the first rejection raised by any step; nothing is written.
    pub async fn commit(&self, transaction: Transaction) -> Result<Committed> {
        transaction.commit(self).await
    }
}

/// Outcomes of a committed [`Transaction`], in step order.
#[derive(Debug)]
pub struct Committed {
    outcomes: Vec<Option<WriteOutcome>>,
}

impl Committed {
    /// Decode the record written by step `index`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Internal`] if the step deleted its document, was
    /// already taken, or does not decode as `D`.
    pub fn take<D: Document>(&mut self, index: usize) -> Result<D> {
        let body = self
            .outcomes
            .get_mut(index)
            .and_then(Option::take)
            .and_then(|outcome| outcome.body)
            .ok_or_else(|| EngineError::Internal(format!("no document at transaction step {index}")))?;
        decode(body)
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the transaction had no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Builder for a grouped atomic write.
///
/// # Example
///
/// ```ignore
/// let committed = Transaction::new()
///     .update(Event::key_for(event_id), partition.clone(), |event: &mut Event| {
///         event.registered_count += 1;
///         Ok(())
///     })
///     .insert(registration)
///     .commit(&documents)
///     .await?;
/// ```
#[derive(Debug, Default)]
pub struct Transaction {
    ops: Vec<WriteOp>,
}

impl Transaction {
    /// Empty transaction.
    #[must_use]
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether no steps were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Create `doc`; rejects with a state conflict if its key already exists.
    #[must_use]
    pub fn insert<D: Document>(mut self, doc: D) -> Self {
        let key = doc.key();
        let partition = doc.partition();
        let described = key.to_string();
        self.ops.push(WriteOp::Write {
            key,
            partition,
            mutation: Box::new(move |current| {
                if current.is_some() {
                    return Err(EngineError::conflict(format!(
                        "{described} was created concurrently"
                    )));
                }
                encode(&doc).map(Some)
            }),
        });
        self
    }

    /// Mutate an existing record; rejects with not-found if absent.
    #[must_use]
    pub fn update<D, F>(mut self, key: DocumentKey, partition: String, mutate: F) -> Self
    where
        D: Document,
        F: FnOnce(&mut D) -> Result<()> + Send + 'static,
    {
        let described = key.clone();
        self.ops.push(WriteOp::Write {
            key,
            partition,
            mutation: Box::new(move |current| {
                let body = current.ok_or_else(|| missing(&described))?;
                let mut doc: D = decode(body)?;
                mutate(&mut doc)?;
                encode(&doc).map(Some)
            }),
        });
        self
    }

    /// Create or replace a record from its current value.
    #[must_use]
    pub fn upsert<D, F>(mut self, key: DocumentKey, partition: String, produce: F) -> Self
    where
        D: Document,
        F: FnOnce(Option<D>) -> Result<D> + Send + 'static,
    {
        self.ops.push(WriteOp::Write {
            key,
            partition,
            mutation: Box::new(move |current| {
                let current = current.map(decode::<D>).transpose()?;
                let next = produce(current)?;
                encode(&next).map(Some)
            }),
        });
        self
    }

    /// Delete an existing record if `allow` accepts it.
    #[must_use]
    pub fn delete_if<D, F>(mut self, key: DocumentKey, partition: String, allow: F) -> Self
    where
        D: Document,
        F: FnOnce(&D) -> Result<()> + Send + 'static,
    {
        let described = key.clone();
        self.ops.push(WriteOp::Write {
            key,
            partition,
            mutation: Box::new(move |current| {
                let body = current.ok_or_else(|| missing(&described))?;
                let doc: D = decode(body)?;
                allow(&doc)?;
                Ok(None)
            }),
        });
        self
    }

    /// Assert a predicate on an existing record without writing it.
    #[must_use]
    pub fn check<D, F>(mut self, key: DocumentKey, predicate: F) -> Self
    where
        D: Document,
        F: FnOnce(&D) -> Result<()> + Send + 'static,
    {
        let described = key.clone();
        self.ops.push(WriteOp::Check {
            key,
            predicate: Box::new(move |current| {
                let body = current.ok_or_else(|| missing(&described))?;
                let doc: D = decode(body.clone())?;
                predicate(&doc)
            }),
        });
        self
    }

    /// Commit against `documents`.
    ///
    /// # Errors
    ///
    /// Returns the first rejection raised by any step; nothing is written.
    pub async fn commit(self, documents: &Documents) -> Result<Committed> {
        let outcomes = documents.store.transact(self.ops).await?;
        Ok(Committed {
            outcomes: outcomes.into_iter().map(Some).collect(),
        })
    }
}
