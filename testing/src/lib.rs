//! # Roundhouse Testing
//!
//! Testing utilities for the Roundhouse engine.
//!
//! This crate provides:
//! - [`InMemoryStore`]: a mutex-linearized [`ConditionalStore`] with fault injection
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - Recording collaborators ([`RecordingNotifier`], [`FailingNotifier`],
//!   [`RecordingInvalidator`])
//! - [`EventFixture`] for seeding events
//!
//! ## Example
//!
//! ```ignore
//! use roundhouse_testing::{EventFixture, InMemoryStore};
//!
//! #[tokio::test]
//! async fn registers_a_participant() {
//!     let store = Arc::new(InMemoryStore::new());
//!     let engine = Engine::builder(store.clone()).clock(test_clock()).build();
//!     let event = EventFixture::solo().capacity(2).seed(engine.documents()).await?;
//!     engine.capacity().register(&Actor::user(UserId::new()), event.id, None).await?;
//! }
//! ```
//!
//! [`ConditionalStore`]: roundhouse_core::ConditionalStore

pub mod fixtures;
pub mod mocks;
pub mod store;

// Re-export commonly used items
pub use fixtures::EventFixture;
pub use mocks::{
    FailingNotifier, FixedClock, ManualClock, RecordingInvalidator, RecordingNotifier,
    init_test_tracing, test_clock, test_time,
};
pub use store::InMemoryStore;
