//! HTTP surface for Roundhouse.
//!
//! Maps every engine operation onto an axum route. Handlers do three things:
//! extract the [`Caller`] and the request body, call one engine operation,
//! and map the result. Business rules, authorization checks and conflict
//! detection all live in the engine; an [`EngineError`](roundhouse_core::EngineError)
//! becomes an [`AppError`] with one fixed status per error kind:
//!
//! | Engine error        | Status | `code`              |
//! |---------------------|--------|---------------------|
//! | `Validation`        | 422    | `VALIDATION_ERROR`  |
//! | `Authorization`     | 403    | `FORBIDDEN`         |
//! | `NotFound`          | 404    | `NOT_FOUND`         |
//! | `StateConflict`     | 409    | `STATE_CONFLICT`    |
//! | `CapacityConflict`  | 409    | `CAPACITY_CONFLICT` |
//! | `Internal`          | 500    | `INTERNAL_SERVER_ERROR` |
//!
//! # Example
//!
//! ```ignore
//! use roundhouse_web::{AppState, build_router};
//!
//! let engine = Engine::builder(store).build();
//! let app = build_router(AppState::new(engine));
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError, StoreKind};
pub use error::AppError;
pub use extractors::{ADMIN_HEADER, Caller, USER_ID_HEADER};
pub use middleware::{REQUEST_ID_HEADER, RequestId, request_id_layer};
pub use routes::{build_router, metrics_router};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
