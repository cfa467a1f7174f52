//! `PostgreSQL` conditional store for Roundhouse.
//!
//! Implements [`ConditionalStore`](roundhouse_core::store::ConditionalStore)
//! over a single `documents` table:
//!
//! - JSONB bodies addressed by `(collection, id)`
//! - a `partition` column (the owning event) for listing
//! - grouped writes in one database transaction, all-or-nothing
//! - per-key exclusive locks held for the whole group, so every mutation
//!   sees the state at write time
//!
//! # Example
//!
//! ```ignore
//! use roundhouse_postgres::PostgresStore;
//! use std::sync::Arc;
//!
//! let store = PostgresStore::connect("postgres://localhost/roundhouse", 10).await?;
//! store.migrate().await?;
//! let engine = roundhouse_runtime::Engine::builder(Arc::new(store)).build();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod store;

pub use store::PostgresStore;
