//! Builders for seeding events directly into a store.
//!
//! Event creation is owned by the event-management service; tests seed the
//! event document and then drive rounds, teams and registrations through the
//! engine.

use crate::mocks::test_time;
use chrono::{DateTime, Duration, Utc};
use roundhouse_core::documents::{Documents, Transaction};
use roundhouse_core::error::Result;
use roundhouse_core::ids::{EventId, UserId};
use roundhouse_core::records::Event;

/// Builder for an [`Event`] record.
///
/// Defaults: solo event, organizer is a fresh user, runs days 10 to 20 after
/// [`test_time`], unlimited capacity, no rounds declared.
#[derive(Debug, Clone)]
pub struct EventFixture {
    event: Event,
}

impl EventFixture {
    /// Solo event.
    #[must_use]
    pub fn solo() -> Self {
        let base = test_time();
        Self {
            event: Event {
                id: EventId::new(),
                name: "Spring Hackathon".to_string(),
                organizer_id: UserId::new(),
                start_time: base + Duration::days(10),
                end_time: base + Duration::days(20),
                registration_deadline: None,
                rounds_count: None,
                current_round_number: 0,
                max_participants: None,
                registered_count: 0,
                min_team_size: 1,
                max_team_size: 1,
                requires_payment: false,
                requires_approval: false,
                waitlist_enabled: false,
                round_count: 0,
                rounds_revision: 0,
                ongoing_round: None,
                created_at: base,
            },
        }
    }

    /// Team event with sizes in `[min, max]`.
    #[must_use]
    pub fn team(min: u32, max: u32) -> Self {
        let mut fixture = Self::solo();
        fixture.event.min_team_size = min;
        fixture.event.max_team_size = max;
        fixture
    }

    /// Set the organizer.
    #[must_use]
    pub const fn organizer(mut self, organizer: UserId) -> Self {
        self.event.organizer_id = organizer;
        self
    }

    /// Set the event window.
    #[must_use]
    pub const fn window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.event.start_time = start;
        self.event.end_time = end;
        self
    }

    /// Set the registration deadline.
    #[must_use]
    pub const fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.event.registration_deadline = Some(deadline);
        self
    }

    /// Cap registrations.
    #[must_use]
    pub const fn capacity(mut self, max: u32) -> Self {
        self.event.max_participants = Some(max);
        self
    }

    /// Declare the number of rounds.
    #[must_use]
    pub const fn rounds(mut self, count: u32) -> Self {
        self.event.rounds_count = Some(count);
        self
    }

    /// Require payment before confirmation.
    #[must_use]
    pub const fn paid(mut self) -> Self {
        self.event.requires_payment = true;
        self
    }

    /// Require organizer approval before confirmation.
    #[must_use]
    pub const fn approval(mut self) -> Self {
        self.event.requires_approval = true;
        self
    }

    /// Accept waitlisted registrations when full.
    #[must_use]
    pub const fn waitlist(mut self) -> Self {
        self.event.waitlist_enabled = true;
        self
    }

    /// The record without persisting it.
    #[must_use]
    pub fn build(self) -> Event {
        self.event
    }

    /// Persist the record and return it.
    ///
    /// # Errors
    ///
    /// Returns a conflict if an event with the same id exists.
    pub async fn seed(self, documents: &Documents) -> Result<Event> {
        let event = self.event;
        Transaction::new()
            .insert(event.clone())
            .commit(documents)
            .await?;
        Ok(event)
    }
}
