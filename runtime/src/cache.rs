//! Read-through cache in front of a [`ConditionalStore`].
//!
//! Only the `events`, `rounds` and `teams` collections are cached. Every
//! successful write evicts the keys it touched, locally and through the
//! injected [`CacheInvalidator`], so the next read goes back to the store.
//! Mutations and predicates always run against the store itself; the cache
//! only serves plain reads.
//!
//! ## Features
//!
//! - **LRU Eviction**: least-recently-used entry evicted at capacity
//! - **TTL Support**: entries expire after the configured lifetime
//! - **Generation guard**: a read that raced with a write never repopulates
//!   the cache with the pre-write value

use crate::metrics::EngineMetrics;
use roundhouse_core::environment::CacheInvalidator;
use roundhouse_core::records::{Event, Round, Team};
use roundhouse_core::store::{
    ConditionalStore, DocumentKey, StoreFuture, StoredDocument, WriteOp, WriteOutcome,
};
use roundhouse_core::Document;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const CACHED_COLLECTIONS: [&str; 3] = [Event::COLLECTION, Round::COLLECTION, Team::COLLECTION];

fn is_cached(key: &DocumentKey) -> bool {
    CACHED_COLLECTIONS.contains(&key.collection.as_str())
}

#[derive(Clone, Debug)]
struct CachedDocument {
    document: Option<StoredDocument>,
    cached_at: Instant,
    last_accessed: Instant,
}

impl CachedDocument {
    fn new(document: Option<StoredDocument>) -> Self {
        let now = Instant::now();
        Self {
            document,
            cached_at: now,
            last_accessed: now,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<DocumentKey, CachedDocument>,
    generation: u64,
    hits: u64,
    misses: u64,
}

/// Cache statistics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
    /// Current size
    pub size: usize,
    /// Maximum capacity
    pub capacity: usize,
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that went to the store
    pub misses: u64,
}

/// LRU/TTL read-through cache wrapping any [`ConditionalStore`].
pub struct CachedStore<S> {
    inner: S,
    capacity: usize,
    ttl: Duration,
    entries: Mutex<Entries>,
    invalidator: Arc<dyn CacheInvalidator>,
}

impl<S: ConditionalStore> CachedStore<S> {
    /// Wrap `inner`. A `capacity` of zero disables caching but keeps
    /// invalidation and timing.
    #[must_use]
    pub fn new(
        inner: S,
        capacity: usize,
        ttl: Duration,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Self {
        Self {
            inner,
            capacity,
            ttl,
            entries: Mutex::new(Entries::default()),
            invalidator,
        }
    }

    /// The wrapped store.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.entries.lock().map_or(
            CacheStats {
                size: 0,
                capacity: self.capacity,
                hits: 0,
                misses: 0,
            },
            |entries| CacheStats {
                size: entries.map.len(),
                capacity: self.capacity,
                hits: entries.hits,
                misses: entries.misses,
            },
        )
    }

    /// Look up `key`; returns the generation to insert under on a miss.
    fn lookup(&self, key: &DocumentKey) -> Result<Option<StoredDocument>, u64> {
        let Ok(mut guard) = self.entries.lock() else {
            return Err(u64::MAX);
        };
        let entries = &mut *guard;
        let hit = match entries.map.get(key).map(|entry| entry.is_expired(self.ttl)) {
            Some(false) => entries.map.get_mut(key).map(|entry| {
                entry.last_accessed = Instant::now();
                entry.document.clone()
            }),
            Some(true) => {
                entries.map.remove(key);
                None
            },
            None => None,
        };
        if let Some(document) = hit {
            entries.hits += 1;
            Ok(document)
        } else {
            entries.misses += 1;
            Err(entries.generation)
        }
    }

    fn insert(&self, key: DocumentKey, document: Option<StoredDocument>, generation: u64) {
        let Ok(mut guard) = self.entries.lock() else {
            return;
        };
        let entries = &mut *guard;
        // A write landed while we were reading; our value may be stale.
        if entries.generation != generation {
            return;
        }
        let ttl = self.ttl;
        entries.map.retain(|_, entry| !entry.is_expired(ttl));
        if entries.map.len() >= self.capacity {
            let lru = entries
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(key, _)| key.clone());
            if let Some(lru) = lru {
                entries.map.remove(&lru);
            }
        }
        entries.map.insert(key, CachedDocument::new(document));
    }

    fn invalidate(&self, keys: &[DocumentKey]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.generation = entries.generation.wrapping_add(1);
            for key in keys {
                entries.map.remove(key);
            }
        }
        for key in keys.iter().filter(|key| is_cached(key)) {
            self.invalidator.invalidate(key);
        }
    }
}

impl<S: ConditionalStore> ConditionalStore for CachedStore<S> {
    fn read<'a>(&'a self, key: &'a DocumentKey) -> StoreFuture<'a, Option<StoredDocument>> {
        Box::pin(async move {
            let cacheable = self.capacity > 0 && is_cached(key);
            let generation = if cacheable {
                match self.lookup(key) {
                    Ok(document) => return Ok(document),
                    Err(generation) => Some(generation),
                }
            } else {
                None
            };

            let started = Instant::now();
            let document = self.inner.read(key).await?;
            EngineMetrics::record_store_op("read", started.elapsed());

            if let Some(generation) = generation {
                self.insert(key.clone(), document.clone(), generation);
            }
            Ok(document)
        })
    }

    fn list<'a>(
        &'a self,
        collection: &'a str,
        partition: &'a str,
    ) -> StoreFuture<'a, Vec<StoredDocument>> {
        Box::pin(async move {
            let started = Instant::now();
            let documents = self.inner.list(collection, partition).await?;
            EngineMetrics::record_store_op("list", started.elapsed());
            Ok(documents)
        })
    }

    fn transact(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, Vec<WriteOutcome>> {
        Box::pin(async move {
            let written: Vec<DocumentKey> = ops
                .iter()
                .filter(|op| op.is_write())
                .map(|op| op.key().clone())
                .collect();

            let started = Instant::now();
            let result = self.inner.transact(ops).await;
            EngineMetrics::record_store_op("transact", started.elapsed());

            // Evict even on failure: a backend error may hide a committed write.
            if result.is_ok() || matches!(result, Err(roundhouse_core::StoreError::Backend(_))) {
                self.invalidate(&written);
            }
            result
        })
    }
}
