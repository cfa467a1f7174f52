//! Minimal event creation and lookup.
//!
//! Everything else about events (publishing, pricing, venues) belongs to the
//! event-management service; the engine only needs the window, capacity and
//! team-size bounds that its own rules are checked against.

use crate::Environment;
use crate::metrics::EngineMetrics;
use chrono::{DateTime, Utc};
use roundhouse_core::documents::Transaction;
use roundhouse_core::error::{Result, Validator};
use roundhouse_core::ids::EventId;
use roundhouse_core::records::{Actor, Event};
use serde::Deserialize;

/// Input for [`EventCatalog::create_event`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    /// Display name
    pub name: String,
    /// Start of the event window
    pub start_time: DateTime<Utc>,
    /// End of the event window
    pub end_time: DateTime<Utc>,
    /// Registrations close here (defaults to `start_time`)
    #[serde(default)]
    pub registration_deadline: Option<DateTime<Utc>>,
    /// Declared maximum number of rounds
    #[serde(default)]
    pub rounds_count: Option<u32>,
    /// Registration capacity
    #[serde(default)]
    pub max_participants: Option<u32>,
    /// Minimum team size
    #[serde(default = "one")]
    pub min_team_size: u32,
    /// Maximum team size (1 for solo events)
    #[serde(default = "one")]
    pub max_team_size: u32,
    /// Registrations start `Pending` until paid
    #[serde(default)]
    pub requires_payment: bool,
    /// Registrations start `Pending` until approved
    #[serde(default)]
    pub requires_approval: bool,
    /// Full events take waitlisted registrations
    #[serde(default)]
    pub waitlist_enabled: bool,
}

const fn one() -> u32 {
    1
}

impl NewEvent {
    /// Solo event with defaults for every optional field.
    #[must_use]
    pub fn solo(name: impl Into<String>, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            start_time,
            end_time,
            registration_deadline: None,
            rounds_count: None,
            max_participants: None,
            min_team_size: 1,
            max_team_size: 1,
            requires_payment: false,
            requires_approval: false,
            waitlist_enabled: false,
        }
    }

    fn validate(&self) -> Result<()> {
        Validator::new()
            .check(self.name.trim().is_empty(), "name", "must not be empty")
            .check(
                self.end_time <= self.start_time,
                "end_time",
                "must be after start_time",
            )
            .check(
                self.registration_deadline
                    .is_some_and(|deadline| deadline > self.end_time),
                "registration_deadline",
                "must not be after end_time",
            )
            .check(self.rounds_count == Some(0), "rounds_count", "must be at least 1")
            .check(
                self.max_participants == Some(0),
                "max_participants",
                "must be at least 1",
            )
            .check(self.min_team_size == 0, "min_team_size", "must be at least 1")
            .check(
                self.max_team_size < self.min_team_size,
                "max_team_size",
                "must not be smaller than min_team_size",
            )
            .finish()
    }
}

/// Event creation and lookup.
#[derive(Clone)]
pub struct EventCatalog {
    env: Environment,
}

impl EventCatalog {
    /// Create the catalog.
    #[must_use]
    pub const fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Create an event organized by `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`roundhouse_core::EngineError::Validation`] for an inverted
    /// window or inconsistent bounds.
    pub async fn create_event(&self, actor: &Actor, input: NewEvent) -> Result<Event> {
        EngineMetrics::observe("create_event", self.create(actor, input).await)
    }

    async fn create(&self, actor: &Actor, input: NewEvent) -> Result<Event> {
        input.validate()?;
        let event = Event {
            id: EventId::new(),
            name: input.name.trim().to_string(),
            organizer_id: actor.user_id,
            start_time: input.start_time,
            end_time: input.end_time,
            registration_deadline: input.registration_deadline,
            rounds_count: input.rounds_count,
            current_round_number: 0,
            max_participants: input.max_participants,
            registered_count: 0,
            min_team_size: input.min_team_size,
            max_team_size: input.max_team_size,
            requires_payment: input.requires_payment,
            requires_approval: input.requires_approval,
            waitlist_enabled: input.waitlist_enabled,
            round_count: 0,
            rounds_revision: 0,
            ongoing_round: None,
            created_at: self.env.clock.now(),
        };

        Transaction::new()
            .insert(event.clone())
            .commit(&self.env.documents)
            .await?;

        tracing::info!(event_id = %event.id, organizer = %event.organizer_id, "Event created");
        Ok(event)
    }

    /// Look up an event.
    ///
    /// # Errors
    ///
    /// Returns [`roundhouse_core::EngineError::NotFound`] if absent.
    pub async fn get_event(&self, event_id: EventId) -> Result<Event> {
        self.env.event(event_id).await
    }
}
