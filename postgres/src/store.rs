//! [`PostgresStore`]: the production [`ConditionalStore`].
//!
//! # Locking
//!
//! A grouped write locks every key it touches before reading any of them,
//! in ascending lock-id order so that two groups over overlapping keys can
//! never deadlock. Locks are transaction-scoped advisory locks: they cover
//! keys that do not exist yet, which `SELECT … FOR UPDATE` alone cannot, so
//! two transactions creating the same claim document serialize exactly like
//! two transactions updating it.

use metrics::counter;
use roundhouse_core::store::{
    ConditionalStore, DocumentKey, StoreError, StoreFuture, StoredDocument, WriteOp, WriteOutcome,
};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::{BTreeSet, HashMap};

type Snapshot = HashMap<DocumentKey, Option<StoredDocument>>;

fn backend(context: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| StoreError::Backend(format!("{context}: {e}"))
}

fn stored(
    key: DocumentKey,
    partition: String,
    version: i64,
    body: Value,
) -> Result<StoredDocument, StoreError> {
    let version = u64::try_from(version)
        .map_err(|_| StoreError::Backend(format!("negative version for {key}")))?;
    Ok(StoredDocument {
        key,
        partition,
        version,
        body,
    })
}

/// Advisory lock id for a key (64-bit FNV-1a of `collection/id`).
fn lock_id(key: &DocumentKey) -> i64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key
        .collection
        .bytes()
        .chain(std::iter::once(b'/'))
        .chain(key.id.bytes())
    {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    i64::from_ne_bytes(hash.to_ne_bytes())
}

/// Run `ops` against `snapshot`, updating it in place.
///
/// Returns the outcomes in step order and the set of keys that must be
/// persisted. Nothing is persisted if any step rejects.
fn apply(
    snapshot: &mut Snapshot,
    ops: Vec<WriteOp>,
) -> Result<(Vec<WriteOutcome>, BTreeSet<DocumentKey>), StoreError> {
    let mut outcomes = Vec::with_capacity(ops.len());
    let mut written = BTreeSet::new();

    for op in ops {
        let key = op.key().clone();
        let current = snapshot.get(&key).cloned().flatten();

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

                let outcome = match next {
                    Some(body) => {
                        snapshot.insert(
                            key.clone(),
                            Some(StoredDocument {
                                key: key.clone(),
                                partition,
                                version: version + 1,
                                body: body.clone(),
                            }),
                        );
                        WriteOutcome {
                            key: key.clone(),
                            version: version + 1,
                            body: Some(body),
                        }
                    },
                    None => {
                        snapshot.insert(key.clone(), None);
                        WriteOutcome {
                            key: key.clone(),
                            version: 0,
                            body: None,
                        }
                    },
                };
                written.insert(key);
                outcomes.push(outcome);
            },
        }
    }
    Ok((outcomes, written))
}

/// `PostgreSQL`-backed conditional document store.
///
/// Requires the `documents` table created by [`PostgresStore::migrate`].
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(backend("connect"))?;
        Ok(Self::from_pool(pool))
    }

    /// Create the `documents` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run_transaction(&self, ops: Vec<WriteOp>) -> Result<Vec<WriteOutcome>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend("begin transaction"))?;

        let keys: BTreeSet<DocumentKey> = ops.iter().map(|op| op.key().clone()).collect();
        let mut lock_ids: Vec<i64> = keys.iter().map(lock_id).collect();
        lock_ids.sort_unstable();
        lock_ids.dedup();
        for id in lock_ids {
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(backend("lock document"))?;
        }

        let mut snapshot = Snapshot::with_capacity(keys.len());
        for key in keys {
            let row: Option<(String, i64, Value)> = sqlx::query_as(
                r"
                SELECT partition, version, body
                FROM documents
                WHERE collection = $1 AND id = $2
                FOR UPDATE
                ",
            )
            .bind(&key.collection)
            .bind(&key.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend("read document"))?;
            let doc = row
                .map(|(partition, version, body)| stored(key.clone(), partition, version, body))
                .transpose()?;
            snapshot.insert(key, doc);
        }

        let (outcomes, written) = match apply(&mut snapshot, ops) {
            Ok(applied) => applied,
            Err(error) => {
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(error = %e, "Rollback after rejected write failed");
                }
                return Err(error);
            },
        };

        for key in written {
            match snapshot.remove(&key).flatten() {
                Some(doc) => {
                    let version = i64::try_from(doc.version)
                        .map_err(|_| StoreError::Backend(format!("version overflow for {key}")))?;
                    sqlx::query(
                        r"
                        INSERT INTO documents (collection, id, partition, version, body)
                        VALUES ($1, $2, $3, $4, $5)
                        ON CONFLICT (collection, id) DO UPDATE
                        SET version = EXCLUDED.version, body = EXCLUDED.body, updated_at = now()
                        ",
                    )
                    .bind(&key.collection)
                    .bind(&key.id)
                    .bind(&doc.partition)
                    .bind(version)
                    .bind(&doc.body)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend("write document"))?;
                },
                None => {
                    sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                        .bind(&key.collection)
                        .bind(&key.id)
                        .execute(&mut *tx)
                        .await
                        .map_err(backend("delete document"))?;
                },
            }
        }

        tx.commit().await.map_err(backend("commit transaction"))?;
        Ok(outcomes)
    }
}

impl ConditionalStore for PostgresStore {
    fn read<'a>(&'a self, key: &'a DocumentKey) -> StoreFuture<'a, Option<StoredDocument>> {
        Box::pin(async move {
            let row: Option<(String, i64, Value)> = sqlx::query_as(
                "SELECT partition, version, body FROM documents WHERE collection = $1 AND id = $2",
            )
            .bind(&key.collection)
            .bind(&key.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend("read document"))?;

            row.map(|(partition, version, body)| stored(key.clone(), partition, version, body))
                .transpose()
        })
    }

    fn list<'a>(
        &'a self,
        collection: &'a str,
        partition: &'a str,
    ) -> StoreFuture<'a, Vec<StoredDocument>> {
        Box::pin(async move {
            let rows: Vec<(String, i64, Value)> = sqlx::query_as(
                r"
                SELECT id, version, body
                FROM documents
                WHERE collection = $1 AND partition = $2
                ORDER BY id
                ",
            )
            .bind(collection)
            .bind(partition)
            .fetch_all(&self.pool)
            .await
            .map_err(backend("list documents"))?;

            rows.into_iter()
                .map(|(id, version, body)| {
                    stored(
                        DocumentKey::new(collection, id),
                        partition.to_string(),
                        version,
                        body,
                    )
                })
                .collect()
        })
    }

    fn transact(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, Vec<WriteOutcome>> {
        Box::pin(async move {
            let steps = ops.len();
            let result = self.run_transaction(ops).await;
            let outcome = match &result {
                Ok(_) => "committed",
                Err(StoreError::Rejected(_)) => "rejected",
                Err(_) => "failed",
            };
            counter!("roundhouse_postgres_transactions_total", "outcome" => outcome).increment(1);
            if let Err(StoreError::Backend(message)) = &result {
                tracing::error!(steps, error = %message, "Postgres transaction failed");
            }
            result
        })
    }
}
