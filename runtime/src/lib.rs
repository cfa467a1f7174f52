//! # Roundhouse Runtime
//!
//! The concurrency engine of a multi-round competition: rounds move strictly
//! forward, teams never exceed their size, events never oversell capacity,
//! and participants advance or are eliminated exactly once.
//!
//! ## Components
//!
//! - [`RoundStateMachine`]: round creation, status transitions, reverse-order deletion
//! - [`TeamRegistry`]: team formation, membership, locking, leadership
//! - [`CapacityGate`]: atomic admission into bounded event slots
//! - [`ProgressionCoordinator`]: advancing and eliminating participants
//! - [`EventCatalog`]: minimal event creation and lookup
//!
//! Handlers are stateless. Every invariant a race could break is re-checked
//! inside the store's conditional write; a failed check surfaces as a typed
//! conflict and is never retried here.
//!
//! ## Example
//!
//! ```ignore
//! use roundhouse_runtime::Engine;
//!
//! let engine = Engine::builder(store).notifier(mailer).build();
//! let team = engine.teams().create_team(&actor, event_id, "Night Owls").await?;
//! engine.teams().join_with_code(&friend, team.invite_code.as_str()).await?;
//! ```

pub mod cache;
pub mod capacity;
pub mod config;
pub mod events;
pub mod metrics;
pub mod notify;
pub mod progression;
pub mod rounds;
pub mod teams;

use crate::cache::CachedStore;
use crate::config::EngineConfig;
use crate::notify::Dispatcher;
use roundhouse_core::documents::Documents;
use roundhouse_core::environment::{
    CacheInvalidator, Clock, NoopInvalidator, NoopNotifier, Notifier, RegistrationPolicy,
    SystemClock, WindowPolicy,
};
use roundhouse_core::error::{EngineError, Result};
use roundhouse_core::ids::EventId;
use roundhouse_core::records::{Actor, Event};
use roundhouse_core::store::ConditionalStore;
use std::sync::Arc;

pub use capacity::{CapacityGate, Cancellation, refund_percentage};
pub use events::{EventCatalog, NewEvent};
pub use progression::{AdvanceReport, ProgressionCoordinator, Selection};
pub use rounds::{NewRound, RoundChanges, RoundStateMachine};
pub use teams::TeamRegistry;

/// Shared collaborators every component runs against.
#[derive(Clone)]
pub struct Environment {
    /// Typed store access
    pub documents: Documents,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Registration window and admission status rules
    pub policy: Arc<dyn RegistrationPolicy>,
    /// Post-commit notifications
    pub dispatcher: Dispatcher,
    /// Tunables
    pub config: Arc<EngineConfig>,
}

impl Environment {
    /// Load an event.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the event does not exist.
    pub async fn event(&self, event_id: EventId) -> Result<Event> {
        self.documents.require(&Event::key_for(event_id)).await
    }

    /// Load an event and require `actor` to organize it.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the event does not exist
    /// - [`EngineError::Authorization`] if `actor` is neither organizer nor admin
    pub async fn organized_event(&self, actor: &Actor, event_id: EventId) -> Result<Event> {
        let event = self.event(event_id).await?;
        if !actor.can_organize(&event) {
            return Err(EngineError::forbidden(
                "Only the event organizer can perform this action",
            ));
        }
        Ok(event)
    }
}

/// All components wired against one [`Environment`].
#[derive(Clone)]
pub struct Engine {
    env: Environment,
    events: EventCatalog,
    rounds: RoundStateMachine,
    teams: TeamRegistry,
    capacity: CapacityGate,
    progression: ProgressionCoordinator,
}

impl Engine {
    /// Start building an engine over `store`.
    #[must_use]
    pub fn builder(store: Arc<dyn ConditionalStore>) -> EngineBuilder {
        EngineBuilder {
            store,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(NoopNotifier),
            policy: Arc::new(WindowPolicy),
            invalidator: Arc::new(NoopInvalidator),
            config: EngineConfig::default(),
        }
    }

    /// Shared environment.
    #[must_use]
    pub const fn environment(&self) -> &Environment {
        &self.env
    }

    /// Typed store access (through the read cache).
    #[must_use]
    pub const fn documents(&self) -> &Documents {
        &self.env.documents
    }

    /// Event creation and lookup.
    #[must_use]
    pub const fn events(&self) -> &EventCatalog {
        &self.events
    }

    /// Round lifecycle.
    #[must_use]
    pub const fn rounds(&self) -> &RoundStateMachine {
        &self.rounds
    }

    /// Team lifecycle.
    #[must_use]
    pub const fn teams(&self) -> &TeamRegistry {
        &self.teams
    }

    /// Registration admission.
    #[must_use]
    pub const fn capacity(&self) -> &CapacityGate {
        &self.capacity
    }

    /// Advancement and elimination.
    #[must_use]
    pub const fn progression(&self) -> &ProgressionCoordinator {
        &self.progression
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    store: Arc<dyn ConditionalStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    policy: Arc<dyn RegistrationPolicy>,
    invalidator: Arc<dyn CacheInvalidator>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Set the time source.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Set the notification dispatcher.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Set the registration policy.
    #[must_use]
    pub fn policy(mut self, policy: Arc<dyn RegistrationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Set the external cache invalidation hook.
    #[must_use]
    pub fn invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Wire the components.
    #[must_use]
    pub fn build(self) -> Engine {
        let store = CachedStore::new(
            self.store,
            self.config.cache_capacity,
            self.config.cache_ttl,
            self.invalidator,
        );
        let env = Environment {
            documents: Documents::new(Arc::new(store)),
            clock: self.clock,
            policy: self.policy,
            dispatcher: Dispatcher::new(self.notifier),
            config: Arc::new(self.config),
        };
        Engine {
            events: EventCatalog::new(env.clone()),
            rounds: RoundStateMachine::new(env.clone()),
            teams: TeamRegistry::new(env.clone()),
            capacity: CapacityGate::new(env.clone()),
            progression: ProgressionCoordinator::new(env.clone()),
            env,
        }
    }
}
