//! Domain records.
//!
//! An [`Event`] owns its rounds, teams and registrations. Rounds live in an
//! arena keyed by `(event, number)` rather than inside the event document,
//! so contiguity and "last round" questions become range queries.
//! Relations are plain foreign-key fields; the query layer performs joins.

use crate::documents::Document;
use crate::ids::{EventId, InviteCode, RegistrationId, TeamId, UserId};
use crate::store::DocumentKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Caller
// ============================================================================

/// The authenticated caller of an operation.
///
/// Identity is established by the external session service; the engine only
/// checks relationships (organizer of the event, leader of the team, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Calling user
    pub user_id: UserId,
    /// Platform administrators may act as organizer of any event
    pub is_admin: bool,
}

impl Actor {
    /// A regular user.
    #[must_use]
    pub const fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    /// A platform administrator.
    #[must_use]
    pub const fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    /// Whether this actor may perform organizer actions on `event`.
    #[must_use]
    pub fn can_organize(&self, event: &Event) -> bool {
        self.is_admin || self.user_id == event.organizer_id
    }
}

// ============================================================================
// Event
// ============================================================================

/// A competition event.
///
/// `round_count`, `rounds_revision` and `ongoing_round` are bookkeeping that
/// lets round creation, deletion and status changes be guarded on this single
/// document at commit time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Organizer allowed to manage rounds and progression
    pub organizer_id: UserId,
    /// Start of the event window
    pub start_time: DateTime<Utc>,
    /// End of the event window
    pub end_time: DateTime<Utc>,
    /// Registrations close at this instant (defaults to `start_time`)
    pub registration_deadline: Option<DateTime<Utc>>,
    /// Declared maximum number of rounds
    pub rounds_count: Option<u32>,
    /// Number of the round most recently started (0 = registration phase)
    pub current_round_number: u32,
    /// Registration capacity
    pub max_participants: Option<u32>,
    /// Participants currently holding a counted slot
    pub registered_count: u32,
    /// Minimum team size (1 for solo events)
    pub min_team_size: u32,
    /// Maximum team size (1 for solo events)
    pub max_team_size: u32,
    /// New registrations start `Pending` until paid
    pub requires_payment: bool,
    /// New registrations start `Pending` until approved
    pub requires_approval: bool,
    /// Full events accept `Waitlisted` registrations instead of rejecting
    pub waitlist_enabled: bool,
    /// Number of rounds that currently exist
    pub round_count: u32,
    /// Bumped on every round create, delete or reschedule
    pub rounds_revision: u64,
    /// Number of the round currently `Ongoing`, if any
    pub ongoing_round: Option<u32>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Key of the event document.
    #[must_use]
    pub fn key_for(id: EventId) -> DocumentKey {
        DocumentKey::new(Self::COLLECTION, id.to_string())
    }

    /// Team-based events have a maximum team size above one.
    #[must_use]
    pub const fn is_team_event(&self) -> bool {
        self.max_team_size > 1
    }

    /// Whether `additional` more participants fit under the capacity bound.
    #[must_use]
    pub fn has_capacity_for(&self, additional: u32) -> bool {
        self.max_participants
            .is_none_or(|max| self.registered_count.saturating_add(additional) <= max)
    }

    /// Human-readable "event is full" reason.
    #[must_use]
    pub fn full_reason(&self) -> String {
        match self.max_participants {
            Some(max) => format!("Event is full. Maximum {max} participants allowed."),
            None => "Event is full.".to_string(),
        }
    }

    /// Instant at which registration closes.
    #[must_use]
    pub fn registration_closes_at(&self) -> DateTime<Utc> {
        self.registration_deadline.unwrap_or(self.start_time)
    }
}

impl Document for Event {
    const COLLECTION: &'static str = "events";

    fn key(&self) -> DocumentKey {
        Self::key_for(self.id)
    }

    fn partition(&self) -> String {
        self.id.to_string()
    }
}

// ============================================================================
// Round
// ============================================================================

/// Lifecycle status of a round. Transitions never decrease [`RoundStatus::rank`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Scheduled, not started
    Upcoming,
    /// In progress; at most one per event
    Ongoing,
    /// Finished
    Completed,
}

impl RoundStatus {
    /// Position in the forward-only order.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Upcoming => 1,
            Self::Ongoing => 2,
            Self::Completed => 3,
        }
    }

    /// Whether moving to `next` respects the forward-only rule.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        next.rank() >= self.rank()
    }

    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
        }
    }
}

/// A numbered, time-bounded stage of an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Round {
    /// Owning event
    pub event_id: EventId,
    /// 1-based, contiguous
    pub number: u32,
    /// Display name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Scheduled start
    pub start_date: DateTime<Utc>,
    /// Scheduled end
    pub end_date: DateTime<Utc>,
    /// Lifecycle status
    pub status: RoundStatus,
    /// Participant capacity of this round
    pub max_participants: Option<u32>,
    /// Participants advanced into this round so far
    pub advanced_count: u32,
}

impl Round {
    /// Arena key for `(event, number)`. Zero-padded so ids sort by number.
    #[must_use]
    pub fn key_for(event_id: EventId, number: u32) -> DocumentKey {
        DocumentKey::new(Self::COLLECTION, format!("{event_id}/{number:05}"))
    }

    /// Whether this round's window intersects `[start, end)`.
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        windows_overlap(self.start_date, self.end_date, start, end)
    }
}

impl Document for Round {
    const COLLECTION: &'static str = "rounds";

    fn key(&self) -> DocumentKey {
        Self::key_for(self.event_id, self.number)
    }

    fn partition(&self) -> String {
        self.event_id.to_string()
    }
}

/// Half-open interval intersection: `a.start < b.end && b.start < a.end`.
#[must_use]
pub fn windows_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

// ============================================================================
// Team
// ============================================================================

/// Lifecycle status of a team.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    /// Open for membership changes
    Active,
    /// Membership frozen; eligible for registration
    Locked,
    /// Terminal
    Disbanded,
}

/// A group of users registering jointly for a team event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Team {
    /// Identifier
    pub id: TeamId,
    /// Owning event
    pub event_id: EventId,
    /// Display name
    pub name: String,
    /// Leader; always a member
    pub leader_id: UserId,
    /// Members in join order, leader included
    pub members: Vec<UserId>,
    /// Copied from the event at creation
    pub max_size: u32,
    /// Lifecycle status
    pub status: TeamStatus,
    /// Code other users join with
    pub invite_code: InviteCode,
    /// Highest round the team has reached
    pub current_round: u32,
    /// Set when no member advanced past a round
    pub eliminated: bool,
    /// Organizer-set score
    pub score: Option<f64>,
    /// Organizer-set rank
    pub rank: Option<u32>,
    /// Registrations referencing this team in `Pending`, `Confirmed` or `Waitlisted`
    pub active_registrations: u32,
    /// Registrations referencing this team in `Confirmed`
    pub confirmed_registrations: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Team {
    /// Key of the team document.
    #[must_use]
    pub fn key_for(id: TeamId) -> DocumentKey {
        DocumentKey::new(Self::COLLECTION, id.to_string())
    }

    /// Current member count.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn size(&self) -> u32 {
        self.members.len() as u32
    }

    /// Whether `user` is a member.
    #[must_use]
    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    /// Whether `user` leads the team.
    #[must_use]
    pub fn is_leader(&self, user: UserId) -> bool {
        self.leader_id == user
    }

    /// Human-readable "team is full" reason.
    #[must_use]
    pub fn full_reason(&self) -> String {
        format!(
            "This team is full ({}/{} members)",
            self.size(),
            self.max_size
        )
    }
}

impl Document for Team {
    const COLLECTION: &'static str = "teams";

    fn key(&self) -> DocumentKey {
        Self::key_for(self.id)
    }

    fn partition(&self) -> String {
        self.event_id.to_string()
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Status of a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Awaiting payment or approval; holds a counted slot
    Pending,
    /// Participating
    Confirmed,
    /// Queued behind a full event; holds no slot
    Waitlisted,
    /// Withdrawn (terminal)
    Cancelled,
    /// Refused by the organizer (terminal)
    Rejected,
}

impl RegistrationStatus {
    /// `Pending`, `Confirmed` and `Waitlisted` are live; the rest are terminal.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::Waitlisted)
    }

    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Waitlisted => "waitlisted",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }
}

/// A user's participation in an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Identifier
    pub id: RegistrationId,
    /// Owning event
    pub event_id: EventId,
    /// Participant
    pub user_id: UserId,
    /// Team the participant registered with
    pub team_id: Option<TeamId>,
    /// Status
    pub status: RegistrationStatus,
    /// Round the participant has reached (0 = registration phase)
    pub current_round: u32,
    /// Round in which the participant was eliminated; set once, never cleared
    pub eliminated_in_round: Option<u32>,
    /// Attendance check-in (owned by the attendance service)
    pub check_in_time: Option<DateTime<Utc>>,
    /// Whether admission incremented the event's `registered_count`
    pub counted: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    /// Key of the registration document.
    #[must_use]
    pub fn key_for(id: RegistrationId) -> DocumentKey {
        DocumentKey::new(Self::COLLECTION, id.to_string())
    }

    /// Confirmed and still in the competition.
    #[must_use]
    pub const fn is_competing(&self) -> bool {
        matches!(self.status, RegistrationStatus::Confirmed) && self.eliminated_in_round.is_none()
    }
}

impl Document for Registration {
    const COLLECTION: &'static str = "registrations";

    fn key(&self) -> DocumentKey {
        Self::key_for(self.id)
    }

    fn partition(&self) -> String {
        self.event_id.to_string()
    }
}

// ============================================================================
// Uniqueness claims
// ============================================================================

/// Claim on "the team of `user` in `event`".
///
/// Written in the same grouped write as the membership change, which makes
/// "one non-disbanded team per user per event" atomic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipClaim {
    /// Event
    pub event_id: EventId,
    /// User
    pub user_id: UserId,
    /// Current team (`None` once released)
    pub team_id: Option<TeamId>,
}

impl MembershipClaim {
    /// Key for `(event, user)`.
    #[must_use]
    pub fn key_for(event_id: EventId, user_id: UserId) -> DocumentKey {
        DocumentKey::new(Self::COLLECTION, format!("{event_id}/{user_id}"))
    }
}

impl Document for MembershipClaim {
    const COLLECTION: &'static str = "team_memberships";

    fn key(&self) -> DocumentKey {
        Self::key_for(self.event_id, self.user_id)
    }

    fn partition(&self) -> String {
        self.event_id.to_string()
    }
}

/// Claim on "the live registration of `user` in `event`".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationClaim {
    /// Event
    pub event_id: EventId,
    /// User
    pub user_id: UserId,
    /// Live registration (`None` once it reached a terminal status)
    pub registration_id: Option<RegistrationId>,
}

impl RegistrationClaim {
    /// Key for `(event, user)`.
    #[must_use]
    pub fn key_for(event_id: EventId, user_id: UserId) -> DocumentKey {
        DocumentKey::new(Self::COLLECTION, format!("{event_id}/{user_id}"))
    }
}

impl Document for RegistrationClaim {
    const COLLECTION: &'static str = "registration_claims";

    fn key(&self) -> DocumentKey {
        Self::key_for(self.event_id, self.user_id)
    }

    fn partition(&self) -> String {
        self.event_id.to_string()
    }
}

/// Index entry mapping a normalised invite code to its team.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteCodeEntry {
    /// Normalised code
    pub code: InviteCode,
    /// Team the code belongs to
    pub team_id: TeamId,
    /// Event of the team
    pub event_id: EventId,
}

impl InviteCodeEntry {
    /// Key for a code.
    #[must_use]
    pub fn key_for(code: &InviteCode) -> DocumentKey {
        DocumentKey::new(Self::COLLECTION, code.as_str())
    }
}

impl Document for InviteCodeEntry {
    const COLLECTION: &'static str = "invite_codes";

    fn key(&self) -> DocumentKey {
        Self::key_for(&self.code)
    }

    fn partition(&self) -> String {
        self.event_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single().unwrap_or_default() + Duration::hours(hour)
    }

    #[test]
    fn touching_windows_do_not_overlap() {
        assert!(!windows_overlap(at(0), at(2), at(2), at(4)));
        assert!(windows_overlap(at(0), at(3), at(2), at(4)));
    }

    #[test]
    fn round_keys_sort_by_number() {
        let event = EventId::new();
        assert!(Round::key_for(event, 9) < Round::key_for(event, 10));
    }

    #[test]
    fn live_statuses() {
        assert!(RegistrationStatus::Waitlisted.is_live());
        assert!(!RegistrationStatus::Cancelled.is_live());
        assert!(!RegistrationStatus::Rejected.is_live());
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric(a in 0i64..100, la in 1i64..50, b in 0i64..100, lb in 1i64..50) {
            prop_assert_eq!(
                windows_overlap(at(a), at(a + la), at(b), at(b + lb)),
                windows_overlap(at(b), at(b + lb), at(a), at(a + la))
            );
        }

        #[test]
        fn status_rank_never_regresses(from in 0usize..3, to in 0usize..3) {
            let all = [RoundStatus::Upcoming, RoundStatus::Ongoing, RoundStatus::Completed];
            prop_assert_eq!(all[from].can_advance_to(all[to]), to >= from);
        }
    }
}
