//! Dependency injection traits.
//!
//! All external collaborators are abstracted behind traits and injected into
//! the engine: time, notification delivery, cache invalidation and the
//! event-management rules for registration windows and payment.

use crate::ids::{EventId, RegistrationId, TeamId, UserId};
use crate::records::{Event, RegistrationStatus, RoundStatus};
use crate::store::DocumentKey;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// A committed state transition worth telling someone about.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// A user joined a team
    TeamJoined {
        /// Team
        team_id: TeamId,
        /// New member
        user_id: UserId,
    },
    /// A member left or was removed from a team
    TeamMemberRemoved {
        /// Team
        team_id: TeamId,
        /// Removed member
        user_id: UserId,
    },
    /// Team leadership changed hands
    TeamLeaderChanged {
        /// Team
        team_id: TeamId,
        /// New leader
        leader_id: UserId,
    },
    /// A team was disbanded
    TeamDisbanded {
        /// Team
        team_id: TeamId,
    },
    /// A registration changed status
    RegistrationStatusChanged {
        /// Registration
        registration_id: RegistrationId,
        /// Participant
        user_id: UserId,
        /// New status
        status: RegistrationStatus,
    },
    /// A round changed status
    RoundStatusChanged {
        /// Event
        event_id: EventId,
        /// Round number
        number: u32,
        /// New status
        status: RoundStatus,
    },
    /// A participant advanced to a round
    Advanced {
        /// Registration
        registration_id: RegistrationId,
        /// Participant
        user_id: UserId,
        /// Round reached
        round: u32,
    },
    /// A participant was eliminated
    Eliminated {
        /// Registration
        registration_id: RegistrationId,
        /// Participant
        user_id: UserId,
        /// Round of elimination
        round: u32,
    },
}

impl Notification {
    /// Stable name for logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TeamJoined { .. } => "team_joined",
            Self::TeamMemberRemoved { .. } => "team_member_removed",
            Self::TeamLeaderChanged { .. } => "team_leader_changed",
            Self::TeamDisbanded { .. } => "team_disbanded",
            Self::RegistrationStatusChanged { .. } => "registration_status_changed",
            Self::RoundStatusChanged { .. } => "round_status_changed",
            Self::Advanced { .. } => "advanced",
            Self::Eliminated { .. } => "eliminated",
        }
    }
}

/// Notification delivery failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound notification dispatcher (email, push, SMS are all behind this).
///
/// Called only after a state transition has committed. A failure is logged by
/// the engine and never rolls the transition back.
pub trait Notifier: Send + Sync {
    /// Deliver a notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if delivery failed.
    fn notify(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}

/// Notifier that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(
        &self,
        _notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

// ============================================================================
// Cache invalidation
// ============================================================================

/// Hook invoked after every successful write to a cached record.
///
/// Implementations evict (never update) the entry so the next read goes back
/// to the store.
pub trait CacheInvalidator: Send + Sync {
    /// Evict `key`.
    fn invalidate(&self, key: &DocumentKey);
}

/// Invalidator for deployments without an external cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate(&self, _key: &DocumentKey) {}
}

// ============================================================================
// Event management
// ============================================================================

/// Registration rules owned by the event-management service.
pub trait RegistrationPolicy: Send + Sync {
    /// Whether `event` accepts registrations at `now`.
    fn is_open(&self, event: &Event, now: DateTime<Utc>) -> bool;

    /// Status assigned to a newly admitted registration.
    fn admitted_status(&self, event: &Event) -> RegistrationStatus;
}

/// Default policy: open until the registration deadline (or event start),
/// `Pending` when payment or approval is required.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowPolicy;

impl RegistrationPolicy for WindowPolicy {
    fn is_open(&self, event: &Event, now: DateTime<Utc>) -> bool {
        now < event.registration_closes_at()
    }

    fn admitted_status(&self, event: &Event) -> RegistrationStatus {
        if event.requires_payment || event.requires_approval {
            RegistrationStatus::Pending
        } else {
            RegistrationStatus::Confirmed
        }
    }
}
