//! Registration admission.
//!
//! The capacity check and the `registered_count` increment happen inside one
//! conditional write on the event document, grouped with the registration
//! inserts, the per-user [`RegistrationClaim`]s and the team counters. Either
//! every participant is admitted or none is.

use crate::Environment;
use crate::config::RefundTier;
use crate::metrics::EngineMetrics;
use chrono::{DateTime, Utc};
use roundhouse_core::documents::Transaction;
use roundhouse_core::environment::Notification;
use roundhouse_core::error::{EngineError, Result};
use roundhouse_core::ids::{EventId, RegistrationId, TeamId, UserId};
use roundhouse_core::records::{
    Actor, Event, Registration, RegistrationClaim, RegistrationStatus, Team, TeamStatus,
};
use serde::Serialize;

const CHANGED: &str = "Registration was changed concurrently; reload and try again";
const TEAM_NOT_LOCKED: &str = "Team must be locked before registering";
const TEAM_DISBANDED: &str = "Cannot confirm a registration for a disbanded team";

/// Share of the fee refunded when cancelling at `now` for an event starting
/// at `start`: the best tier whose notice is met, 0 if none is.
#[must_use]
pub fn refund_percentage(now: DateTime<Utc>, start: DateTime<Utc>, tiers: &[RefundTier]) -> u8 {
    let notice = start - now;
    tiers
        .iter()
        .filter(|tier| notice >= tier.min_notice)
        .map(|tier| tier.percentage)
        .max()
        .unwrap_or(0)
}

/// Result of [`CapacityGate::cancel_registration`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cancellation {
    /// The cancelled registration
    pub registration: Registration,
    /// Refunded share of the fee (0 for unpaid or unconfirmed registrations)
    pub refund_percentage: u8,
}

fn already_registered(is_self: bool) -> EngineError {
    EngineError::conflict(if is_self {
        "You are already registered for this event"
    } else {
        "A team member is already registered for this event"
    })
}

fn claim_registration(tx: Transaction, registration: &Registration, actor: UserId) -> Transaction {
    let event_id = registration.event_id;
    let user_id = registration.user_id;
    let registration_id = registration.id;
    tx.upsert(
        RegistrationClaim::key_for(event_id, user_id),
        event_id.to_string(),
        move |current: Option<RegistrationClaim>| {
            if current.and_then(|c| c.registration_id).is_some() {
                return Err(already_registered(user_id == actor));
            }
            Ok(RegistrationClaim {
                event_id,
                user_id,
                registration_id: Some(registration_id),
            })
        },
    )
}

fn release_registration(tx: Transaction, registration: &Registration) -> Transaction {
    let event_id = registration.event_id;
    let user_id = registration.user_id;
    let registration_id = registration.id;
    tx.upsert(
        RegistrationClaim::key_for(event_id, user_id),
        event_id.to_string(),
        move |current: Option<RegistrationClaim>| {
            Ok(RegistrationClaim {
                event_id,
                user_id,
                registration_id: current
                    .and_then(|c| c.registration_id)
                    .filter(|existing| *existing != registration_id),
            })
        },
    )
}

fn status_notifications(registrations: &[Registration]) -> Vec<Notification> {
    registrations
        .iter()
        .map(|r| Notification::RegistrationStatusChanged {
            registration_id: r.id,
            user_id: r.user_id,
            status: r.status,
        })
        .collect()
}

/// Owns admission into bounded event slots.
#[derive(Clone)]
pub struct CapacityGate {
    env: Environment,
}

impl CapacityGate {
    /// Create the gate.
    #[must_use]
    pub const fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Look up a registration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if absent.
    pub async fn get_registration(&self, registration_id: RegistrationId) -> Result<Registration> {
        self.env
            .documents
            .require(&Registration::key_for(registration_id))
            .await
    }

    /// Registrations of an event in every status.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the event does not exist.
    pub async fn list_registrations(&self, event_id: EventId) -> Result<Vec<Registration>> {
        self.env.event(event_id).await?;
        self.env.documents.list(&event_id.to_string()).await
    }

    /// Register `actor` (or, with `team_id`, every member of that team).
    ///
    /// Returns one registration per admitted participant. A full event
    /// yields `Waitlisted` registrations when the event keeps a waitlist.
    ///
    /// # Errors
    ///
    /// - [`EngineError::StateConflict`] if registration is closed, the team
    ///   is not locked or out of size bounds, or a participant already holds
    ///   a live registration
    /// - [`EngineError::Authorization`] if `actor` is not on the team
    /// - [`EngineError::CapacityConflict`] if the event is full and keeps no waitlist
    pub async fn register(
        &self,
        actor: &Actor,
        event_id: EventId,
        team_id: Option<TeamId>,
    ) -> Result<Vec<Registration>> {
        EngineMetrics::observe("register", self.admit(actor, event_id, team_id).await)
    }

    async fn admit(
        &self,
        actor: &Actor,
        event_id: EventId,
        team_id: Option<TeamId>,
    ) -> Result<Vec<Registration>> {
        let event = self.env.event(event_id).await?;
        let now = self.env.clock.now();
        if !self.env.policy.is_open(&event, now) {
            return Err(EngineError::conflict("Registration is closed for this event"));
        }

        let team = match team_id {
            Some(team_id) => {
                let team: Team = self.env.documents.require(&Team::key_for(team_id)).await?;
                check_team(&event, &team, actor)?;
                Some(team)
            },
            None if event.min_team_size > 1 => {
                return Err(EngineError::validation(
                    "team_id",
                    "is required for this event",
                ));
            },
            None => None,
        };
        let participants = team
            .as_ref()
            .map_or_else(|| vec![actor.user_id], |team| team.members.clone());

        for user in &participants {
            let claim: Option<RegistrationClaim> = self
                .env
                .documents
                .get(&RegistrationClaim::key_for(event_id, *user))
                .await?;
            if claim.and_then(|c| c.registration_id).is_some() {
                return Err(already_registered(*user == actor.user_id));
            }
        }

        let seats = u32::try_from(participants.len())
            .map_err(|_| EngineError::Internal("team too large".to_string()))?;
        if event.has_capacity_for(seats) {
            let status = self.env.policy.admitted_status(&event);
            let admitted = self
                .commit_admission(actor, &event, team.as_ref(), &participants, status, now)
                .await;
            match admitted {
                Err(e) if e.is_capacity_conflict() && event.waitlist_enabled => {
                    tracing::debug!(event_id = %event_id, "Lost the last seats, waitlisting");
                },
                other => return other,
            }
        } else if !event.waitlist_enabled {
            return Err(EngineError::capacity(event.full_reason()));
        }

        self.commit_admission(
            actor,
            &event,
            team.as_ref(),
            &participants,
            RegistrationStatus::Waitlisted,
            now,
        )
        .await
    }

    async fn commit_admission(
        &self,
        actor: &Actor,
        event: &Event,
        team: Option<&Team>,
        participants: &[UserId],
        status: RegistrationStatus,
        now: DateTime<Utc>,
    ) -> Result<Vec<Registration>> {
        let counted = status != RegistrationStatus::Waitlisted;
        let registrations: Vec<Registration> = participants
            .iter()
            .map(|user| Registration {
                id: RegistrationId::new(),
                event_id: event.id,
                user_id: *user,
                team_id: team.map(|t| t.id),
                status,
                current_round: 0,
                eliminated_in_round: None,
                check_in_time: None,
                counted,
                created_at: now,
                updated_at: now,
            })
            .collect();
        let seats = u32::try_from(registrations.len())
            .map_err(|_| EngineError::Internal("team too large".to_string()))?;
        let partition = event.id.to_string();

        let mut tx = Transaction::new();
        if counted {
            tx = tx.update(
                Event::key_for(event.id),
                partition.clone(),
                move |event: &mut Event| {
                    if !event.has_capacity_for(seats) {
                        return Err(EngineError::capacity(event.full_reason()));
                    }
                    event.registered_count += seats;
                    Ok(())
                },
            );
        }
        for registration in &registrations {
            tx = claim_registration(tx, registration, actor.user_id).insert(registration.clone());
        }
        if let Some(team) = team {
            let members = team.members.clone();
            tx = tx.update(Team::key_for(team.id), partition, move |team: &mut Team| {
                if team.status != TeamStatus::Locked {
                    return Err(EngineError::conflict(TEAM_NOT_LOCKED));
                }
                if team.members != members {
                    return Err(EngineError::conflict(
                        "Team membership changed concurrently; reload and try again",
                    ));
                }
                team.active_registrations += seats;
                if status == RegistrationStatus::Confirmed {
                    team.confirmed_registrations += seats;
                }
                Ok(())
            });
        }
        tx.commit(&self.env.documents).await?;

        tracing::info!(
            event_id = %event.id,
            participants = registrations.len(),
            status = status.as_str(),
            "Registration admitted"
        );
        EngineMetrics::record_admission(status.as_str(), registrations.len());
        self.env
            .dispatcher
            .send_all(status_notifications(&registrations))
            .await;
        Ok(registrations)
    }

    /// Cancel a live registration, releasing its slot if it held one.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` is the registrant or organizer
    /// - [`EngineError::StateConflict`] if the registration is already terminal
    pub async fn cancel_registration(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
    ) -> Result<Cancellation> {
        EngineMetrics::observe(
            "cancel_registration",
            self.cancel(actor, registration_id).await,
        )
    }

    async fn cancel(&self, actor: &Actor, registration_id: RegistrationId) -> Result<Cancellation> {
        let seen = self.get_registration(registration_id).await?;
        let event = self.env.event(seen.event_id).await?;
        if seen.user_id != actor.user_id && !actor.can_organize(&event) {
            return Err(EngineError::forbidden(
                "Only the registrant or the event organizer can cancel this registration",
            ));
        }
        if !seen.status.is_live() {
            return Err(EngineError::conflict(format!(
                "Registration is already {}",
                seen.status.as_str()
            )));
        }

        let now = self.env.clock.now();
        let registration = self
            .settle(&seen, RegistrationStatus::Cancelled, now)
            .await?;
        let refund = if event.requires_payment && seen.status == RegistrationStatus::Confirmed {
            refund_percentage(now, event.start_time, &self.env.config.refund_tiers)
        } else {
            0
        };
        Ok(Cancellation {
            registration,
            refund_percentage: refund,
        })
    }

    /// Organizer confirms a `Pending` registration.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` organizes the event
    /// - [`EngineError::StateConflict`] unless the registration is `Pending`,
    ///   or if its team was disbanded
    pub async fn approve_registration(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
    ) -> Result<Registration> {
        EngineMetrics::observe(
            "approve_registration",
            self.decide(actor, registration_id, RegistrationStatus::Confirmed)
                .await,
        )
    }

    /// Organizer refuses a `Pending` or `Waitlisted` registration.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` organizes the event
    /// - [`EngineError::StateConflict`] unless the registration is `Pending`
    ///   or `Waitlisted`
    pub async fn reject_registration(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
    ) -> Result<Registration> {
        EngineMetrics::observe(
            "reject_registration",
            self.decide(actor, registration_id, RegistrationStatus::Rejected)
                .await,
        )
    }

    async fn decide(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
        next: RegistrationStatus,
    ) -> Result<Registration> {
        let seen = self.get_registration(registration_id).await?;
        self.env.organized_event(actor, seen.event_id).await?;
        let allowed = match next {
            RegistrationStatus::Confirmed => seen.status == RegistrationStatus::Pending,
            _ => matches!(
                seen.status,
                RegistrationStatus::Pending | RegistrationStatus::Waitlisted
            ),
        };
        if !allowed {
            return Err(EngineError::conflict(format!(
                "Cannot move a {} registration to {}",
                seen.status.as_str(),
                next.as_str()
            )));
        }
        self.settle(&seen, next, self.env.clock.now()).await
    }

    /// Move `seen` to `next`, adjusting the event slot, the claim and the
    /// team counters in the same grouped write.
    async fn settle(
        &self,
        seen: &Registration,
        next: RegistrationStatus,
        now: DateTime<Utc>,
    ) -> Result<Registration> {
        let previous = seen.status;
        let counted = seen.counted;
        let releases_slot = counted && !next.is_live();
        let partition = seen.event_id.to_string();

        let mut tx = Transaction::new().update(
            Registration::key_for(seen.id),
            partition.clone(),
            move |registration: &mut Registration| {
                if registration.status != previous || registration.counted != counted {
                    return Err(EngineError::conflict(CHANGED));
                }
                registration.status = next;
                registration.updated_at = now;
                if releases_slot {
                    registration.counted = false;
                }
                Ok(())
            },
        );
        if releases_slot {
            tx = tx.update(
                Event::key_for(seen.event_id),
                partition.clone(),
                |event: &mut Event| {
                    event.registered_count = event.registered_count.saturating_sub(1);
                    Ok(())
                },
            );
        }
        if !next.is_live() {
            tx = release_registration(tx, seen);
        }
        if let Some(team_id) = seen.team_id {
            tx = tx.update(Team::key_for(team_id), partition, move |team: &mut Team| {
                if next == RegistrationStatus::Confirmed && team.status == TeamStatus::Disbanded {
                    return Err(EngineError::conflict(TEAM_DISBANDED));
                }
                if !next.is_live() {
                    team.active_registrations = team.active_registrations.saturating_sub(1);
                }
                match (previous == RegistrationStatus::Confirmed, next == RegistrationStatus::Confirmed) {
                    (true, false) => {
                        team.confirmed_registrations = team.confirmed_registrations.saturating_sub(1);
                    },
                    (false, true) => team.confirmed_registrations += 1,
                    _ => {},
                }
                Ok(())
            });
        }
        let registration: Registration = tx.commit(&self.env.documents).await?.take(0)?;

        tracing::info!(
            registration_id = %registration.id,
            from = previous.as_str(),
            to = next.as_str(),
            slot_released = releases_slot,
            "Registration status changed"
        );
        self.env
            .dispatcher
            .send(Notification::RegistrationStatusChanged {
                registration_id: registration.id,
                user_id: registration.user_id,
                status: next,
            })
            .await;
        Ok(registration)
    }

    /// Organizer admits a `Waitlisted` registration into a freed slot.
    ///
    /// The promoted registration takes the event's admitted status
    /// (`Confirmed`, or `Pending` when payment or approval is required).
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` organizes the event
    /// - [`EngineError::StateConflict`] unless the registration is `Waitlisted`,
    ///   or if it would be confirmed for a disbanded team
    /// - [`EngineError::CapacityConflict`] if the event is still full
    pub async fn promote_waitlisted(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
    ) -> Result<Registration> {
        EngineMetrics::observe(
            "promote_waitlisted",
            self.promote(actor, registration_id).await,
        )
    }

    async fn promote(&self, actor: &Actor, registration_id: RegistrationId) -> Result<Registration> {
        let seen = self.get_registration(registration_id).await?;
        let event = self.env.organized_event(actor, seen.event_id).await?;
        if seen.status != RegistrationStatus::Waitlisted {
            return Err(EngineError::conflict("Only waitlisted registrations can be promoted"));
        }
        if !event.has_capacity_for(1) {
            return Err(EngineError::capacity(event.full_reason()));
        }

        let next = self.env.policy.admitted_status(&event);
        let now = self.env.clock.now();
        let partition = event.id.to_string();
        let mut tx = Transaction::new()
            .update(
                Event::key_for(event.id),
                partition.clone(),
                |event: &mut Event| {
                    if !event.has_capacity_for(1) {
                        return Err(EngineError::capacity(event.full_reason()));
                    }
                    event.registered_count += 1;
                    Ok(())
                },
            )
            .update(
                Registration::key_for(seen.id),
                partition.clone(),
                move |registration: &mut Registration| {
                    if registration.status != RegistrationStatus::Waitlisted || registration.counted {
                        return Err(EngineError::conflict(CHANGED));
                    }
                    registration.status = next;
                    registration.counted = true;
                    registration.updated_at = now;
                    Ok(())
                },
            );
        if let (Some(team_id), RegistrationStatus::Confirmed) = (seen.team_id, next) {
            tx = tx.update(Team::key_for(team_id), partition, |team: &mut Team| {
                if team.status == TeamStatus::Disbanded {
                    return Err(EngineError::conflict(TEAM_DISBANDED));
                }
                team.confirmed_registrations += 1;
                Ok(())
            });
        }
        let registration: Registration = tx.commit(&self.env.documents).await?.take(1)?;

        tracing::info!(
            registration_id = %registration.id,
            status = next.as_str(),
            "Waitlisted registration promoted"
        );
        EngineMetrics::record_admission("promoted", 1);
        self.env
            .dispatcher
            .send(Notification::RegistrationStatusChanged {
                registration_id: registration.id,
                user_id: registration.user_id,
                status: next,
            })
            .await;
        Ok(registration)
    }
}

fn check_team(event: &Event, team: &Team, actor: &Actor) -> Result<()> {
    if team.event_id != event.id {
        return Err(EngineError::validation(
            "team_id",
            "belongs to a different event",
        ));
    }
    if !team.is_member(actor.user_id) {
        return Err(EngineError::forbidden(
            "Only members of the team can register it",
        ));
    }
    if team.status != TeamStatus::Locked {
        return Err(EngineError::conflict(TEAM_NOT_LOCKED));
    }
    if team.size() < event.min_team_size || team.size() > event.max_team_size {
        return Err(EngineError::conflict(format!(
            "Team size must be between {} and {} members ({})",
            event.min_team_size,
            event.max_team_size,
            team.size()
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::Engine;
    use crate::config::default_refund_tiers;
    use chrono::Duration;
    use proptest::prelude::*;
    use roundhouse_core::ErrorKind;
    use roundhouse_testing::{EventFixture, InMemoryStore, ManualClock, test_time};
    use std::sync::Arc;

    struct Harness {
        engine: Engine,
        clock: ManualClock,
        organizer: Actor,
        event: Event,
    }

    async fn harness(fixture: EventFixture) -> Harness {
        let clock = ManualClock::default();
        let engine = Engine::builder(Arc::new(InMemoryStore::new()))
            .clock(clock.clone())
            .build();
        let organizer = Actor::user(UserId::new());
        let event = fixture
            .organizer(organizer.user_id)
            .seed(engine.documents())
            .await
            .unwrap();
        Harness {
            engine,
            clock,
            organizer,
            event,
        }
    }

    impl Harness {
        fn gate(&self) -> &CapacityGate {
            self.engine.capacity()
        }

        async fn register(&self, actor: &Actor) -> Result<Registration> {
            let mut admitted = self.gate().register(actor, self.event.id, None).await?;
            Ok(admitted.remove(0))
        }

        async fn registered_count(&self) -> u32 {
            self.engine
                .events()
                .get_event(self.event.id)
                .await
                .unwrap()
                .registered_count
        }

        /// Locked team of `size` members.
        async fn locked_team(&self, size: usize) -> (Actor, Team) {
            let leader = Actor::user(UserId::new());
            let teams = self.engine.teams();
            let team = teams
                .create_team(&leader, self.event.id, "Byte Club")
                .await
                .unwrap();
            for _ in 1..size {
                teams
                    .join_with_code(&Actor::user(UserId::new()), team.invite_code.as_str())
                    .await
                    .unwrap();
            }
            (leader, teams.lock(&leader, team.id).await.unwrap())
        }
    }

    fn user() -> Actor {
        Actor::user(UserId::new())
    }

    #[test]
    fn refund_tiers() {
        let start = test_time() + Duration::days(30);
        let tiers = default_refund_tiers();
        let at = |notice: Duration| refund_percentage(start - notice, start, &tiers);

        assert_eq!(at(Duration::days(8)), 100);
        assert_eq!(at(Duration::days(7)), 100);
        assert_eq!(at(Duration::hours(60)), 50);
        assert_eq!(at(Duration::hours(30)), 25);
        assert_eq!(at(Duration::hours(23)), 0);
        assert_eq!(at(Duration::hours(-5)), 0);
    }

    proptest! {
        #[test]
        fn more_notice_never_refunds_less(a in -100i64..400, b in -100i64..400) {
            let start = test_time();
            let tiers = default_refund_tiers();
            let (short, long) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(
                refund_percentage(start - Duration::hours(long), start, &tiers)
                    >= refund_percentage(start - Duration::hours(short), start, &tiers)
            );
        }
    }

    #[tokio::test]
    async fn open_event_confirms_immediately() {
        let h = harness(EventFixture::solo().capacity(10)).await;
        let registration = h.register(&user()).await.unwrap();

        assert_eq!(registration.status, RegistrationStatus::Confirmed);
        assert!(registration.counted);
        assert_eq!(h.registered_count().await, 1);
    }

    #[tokio::test]
    async fn paid_event_starts_pending_until_approved() {
        let h = harness(EventFixture::solo().paid()).await;
        let registration = h.register(&user()).await.unwrap();
        assert_eq!(registration.status, RegistrationStatus::Pending);

        let err = h
            .gate()
            .approve_registration(&user(), registration.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let approved = h
            .gate()
            .approve_registration(&h.organizer, registration.id)
            .await
            .unwrap();
        assert_eq!(approved.status, RegistrationStatus::Confirmed);
        assert_eq!(h.registered_count().await, 1);
    }

    #[tokio::test]
    async fn one_live_registration_per_user() {
        let h = harness(EventFixture::solo()).await;
        let actor = user();
        h.register(&actor).await.unwrap();

        let err = h.register(&actor).await.unwrap_err();
        assert_eq!(err.to_string(), "You are already registered for this event");
        assert_eq!(h.registered_count().await, 1);
    }

    #[tokio::test]
    async fn closed_registration_is_a_conflict() {
        let h = harness(EventFixture::solo().deadline(test_time() + Duration::hours(1))).await;
        h.clock.advance(Duration::hours(2));

        let err = h.register(&user()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[tokio::test]
    async fn full_event_reports_its_capacity() {
        let h = harness(EventFixture::solo().capacity(1)).await;
        h.register(&user()).await.unwrap();

        let err = h.register(&user()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityConflict);
        assert_eq!(err.to_string(), "Event is full. Maximum 1 participants allowed.");
    }

    #[tokio::test]
    async fn full_event_with_waitlist_queues_then_promotes() {
        let h = harness(EventFixture::solo().capacity(1).waitlist()).await;
        let first = h.register(&user()).await.unwrap();
        let queued = h.register(&user()).await.unwrap();
        assert_eq!(queued.status, RegistrationStatus::Waitlisted);
        assert!(!queued.counted);
        assert_eq!(h.registered_count().await, 1);

        let err = h
            .gate()
            .promote_waitlisted(&h.organizer, queued.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityConflict);

        h.gate()
            .cancel_registration(&h.organizer, first.id)
            .await
            .unwrap();
        let promoted = h
            .gate()
            .promote_waitlisted(&h.organizer, queued.id)
            .await
            .unwrap();
        assert_eq!(promoted.status, RegistrationStatus::Confirmed);
        assert!(promoted.counted);
        assert_eq!(h.registered_count().await, 1);
    }

    #[tokio::test]
    async fn cancelling_frees_the_slot_and_the_claim() {
        let h = harness(EventFixture::solo().capacity(1)).await;
        let actor = user();
        let registration = h.register(&actor).await.unwrap();

        let err = h
            .gate()
            .cancel_registration(&user(), registration.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let cancellation = h
            .gate()
            .cancel_registration(&actor, registration.id)
            .await
            .unwrap();
        assert_eq!(cancellation.registration.status, RegistrationStatus::Cancelled);
        assert_eq!(cancellation.refund_percentage, 0);
        assert_eq!(h.registered_count().await, 0);

        let err = h
            .gate()
            .cancel_registration(&actor, registration.id)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Registration is already cancelled");

        h.register(&actor).await.unwrap();
    }

    #[tokio::test]
    async fn confirmed_paid_cancellation_is_refunded_by_notice() {
        // Event starts ten days after the clock's initial time.
        let h = harness(EventFixture::solo().paid()).await;
        let actor = user();
        let registration = h.register(&actor).await.unwrap();
        h.gate()
            .approve_registration(&h.organizer, registration.id)
            .await
            .unwrap();

        h.clock.set(h.event.start_time - Duration::hours(36));
        let cancellation = h
            .gate()
            .cancel_registration(&actor, registration.id)
            .await
            .unwrap();
        assert_eq!(cancellation.refund_percentage, 25);
    }

    #[tokio::test]
    async fn rejecting_a_waitlisted_registration_keeps_the_count() {
        let h = harness(EventFixture::solo().capacity(1).waitlist()).await;
        h.register(&user()).await.unwrap();
        let queued = h.register(&user()).await.unwrap();

        let rejected = h
            .gate()
            .reject_registration(&h.organizer, queued.id)
            .await
            .unwrap();
        assert_eq!(rejected.status, RegistrationStatus::Rejected);
        assert_eq!(h.registered_count().await, 1);

        let err = h
            .gate()
            .approve_registration(&h.organizer, queued.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[tokio::test]
    async fn team_registration_admits_every_member() {
        let h = harness(EventFixture::team(2, 4).capacity(10)).await;
        let (leader, team) = h.locked_team(3).await;

        let admitted = h
            .gate()
            .register(&leader, h.event.id, Some(team.id))
            .await
            .unwrap();
        assert_eq!(admitted.len(), 3);
        assert!(admitted.iter().all(|r| r.team_id == Some(team.id)));
        assert_eq!(h.registered_count().await, 3);

        let team = h.engine.teams().get_team(team.id).await.unwrap();
        assert_eq!(team.active_registrations, 3);
        assert_eq!(team.confirmed_registrations, 3);
    }

    #[tokio::test]
    async fn team_that_does_not_fit_is_not_partially_admitted() {
        let h = harness(EventFixture::team(2, 4).capacity(2)).await;
        let (leader, team) = h.locked_team(3).await;

        let err = h
            .gate()
            .register(&leader, h.event.id, Some(team.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityConflict);
        assert_eq!(h.registered_count().await, 0);
        assert!(h.gate().list_registrations(h.event.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unlocked_team_cannot_register() {
        let h = harness(EventFixture::team(1, 4)).await;
        let leader = user();
        let team = h
            .engine
            .teams()
            .create_team(&leader, h.event.id, "Open Door")
            .await
            .unwrap();

        let err = h
            .gate()
            .register(&leader, h.event.id, Some(team.id))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), TEAM_NOT_LOCKED);
    }

    #[tokio::test]
    async fn live_registrations_pin_the_team() {
        let h = harness(EventFixture::team(2, 4)).await;
        let (leader, team) = h.locked_team(2).await;
        let admitted = h
            .gate()
            .register(&leader, h.event.id, Some(team.id))
            .await
            .unwrap();

        let err = h.engine.teams().unlock(&leader, team.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        let err = h.engine.teams().disband(&leader, team.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        for registration in &admitted {
            h.gate()
                .cancel_registration(&h.organizer, registration.id)
                .await
                .unwrap();
        }
        h.engine.teams().unlock(&leader, team.id).await.unwrap();
    }

    #[tokio::test]
    async fn pending_team_registrations_pin_the_team() {
        let h = harness(EventFixture::team(2, 4).approval()).await;
        let (leader, team) = h.locked_team(2).await;
        let admitted = h
            .gate()
            .register(&leader, h.event.id, Some(team.id))
            .await
            .unwrap();
        assert!(admitted.iter().all(|r| r.status == RegistrationStatus::Pending));

        let err = h.engine.teams().unlock(&leader, team.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot unlock a team with active registrations");
    }

    #[tokio::test]
    async fn waitlisted_team_registrations_pin_the_team() {
        let h = harness(EventFixture::team(2, 4).capacity(1).waitlist()).await;
        let (leader, team) = h.locked_team(2).await;
        let queued = h
            .gate()
            .register(&leader, h.event.id, Some(team.id))
            .await
            .unwrap();
        assert!(queued.iter().all(|r| r.status == RegistrationStatus::Waitlisted));

        let err = h.engine.teams().unlock(&leader, team.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        for registration in &queued {
            h.gate()
                .reject_registration(&h.organizer, registration.id)
                .await
                .unwrap();
        }
        h.engine.teams().unlock(&leader, team.id).await.unwrap();
    }

    #[tokio::test]
    async fn disbanded_team_cannot_be_approved() {
        let h = harness(EventFixture::team(2, 4).approval()).await;
        let (leader, team) = h.locked_team(2).await;
        let admitted = h
            .gate()
            .register(&leader, h.event.id, Some(team.id))
            .await
            .unwrap();
        h.engine.teams().disband(&leader, team.id).await.unwrap();

        let err = h
            .gate()
            .approve_registration(&h.organizer, admitted[0].id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(err.to_string(), TEAM_DISBANDED);

        let registration = h.gate().get_registration(admitted[0].id).await.unwrap();
        assert_eq!(registration.status, RegistrationStatus::Pending);
        let team = h.engine.teams().get_team(team.id).await.unwrap();
        assert_eq!(team.status, TeamStatus::Disbanded);
        assert_eq!(team.confirmed_registrations, 0);

        h.gate()
            .reject_registration(&h.organizer, admitted[0].id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn disbanded_team_cannot_be_promoted() {
        let h = harness(EventFixture::team(2, 4).capacity(1).waitlist()).await;
        let (leader, team) = h.locked_team(2).await;
        let queued = h
            .gate()
            .register(&leader, h.event.id, Some(team.id))
            .await
            .unwrap();
        h.engine.teams().disband(&leader, team.id).await.unwrap();

        let err = h
            .gate()
            .promote_waitlisted(&h.organizer, queued[0].id)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), TEAM_DISBANDED);
        assert_eq!(h.registered_count().await, 0);
        let team = h.engine.teams().get_team(team.id).await.unwrap();
        assert_eq!(team.confirmed_registrations, 0);
    }

    #[tokio::test]
    async fn team_events_with_a_minimum_require_a_team() {
        let h = harness(EventFixture::team(2, 4)).await;
        let err = h.register(&user()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
