//! Mock implementations of the injected collaborators.

use chrono::{DateTime, Duration, Utc};
use roundhouse_core::environment::{
    CacheInvalidator, Clock, Notification, Notifier, NotifyError,
};
use roundhouse_core::store::DocumentKey;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use roundhouse_testing::mocks::FixedClock;
/// use roundhouse_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// 2025-01-01 00:00:00 UTC, the epoch every fixture is relative to.
///
/// # Panics
///
/// Never in practice; the timestamp is hardcoded.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .expect("hardcoded timestamp should always parse")
        .with_timezone(&Utc)
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(test_time())
}

/// Clock a test can move forward, e.g. past a round's start date.
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Start at `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Jump to `time`.
    pub fn set(&self, time: DateTime<Utc>) {
        if let Ok(mut current) = self.time.lock() {
            *current = time;
        }
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut current) = self.time.lock() {
            *current += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(test_time())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.time.lock().map_or_else(|_| test_time(), |time| *time)
    }
}

/// Notifier that records everything it is asked to deliver.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Number of deliveries whose [`Notification::name`] is `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.sent().iter().filter(|n| n.name() == name).count()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            self.sent
                .lock()
                .map_err(|_| NotifyError("recorder poisoned".to_string()))?
                .push(notification);
            Ok(())
        })
    }
}

/// Notifier whose every delivery fails.
#[derive(Debug, Clone, Default)]
pub struct FailingNotifier {
    attempts: Arc<Mutex<u32>>,
}

impl FailingNotifier {
    /// Create a failing notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deliveries attempted.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.lock().map_or(0, |attempts| *attempts)
    }
}

impl Notifier for FailingNotifier {
    fn notify(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            if let Ok(mut attempts) = self.attempts.lock() {
                *attempts += 1;
            }
            Err(NotifyError(format!("smtp unavailable for {}", notification.name())))
        })
    }
}

/// Invalidator that records evicted keys.
#[derive(Debug, Clone, Default)]
pub struct RecordingInvalidator {
    evicted: Arc<Mutex<Vec<DocumentKey>>>,
}

impl RecordingInvalidator {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys evicted so far, in order.
    #[must_use]
    pub fn evicted(&self) -> Vec<DocumentKey> {
        self.evicted.lock().map(|keys| keys.clone()).unwrap_or_default()
    }
}

impl CacheInvalidator for RecordingInvalidator {
    fn invalidate(&self, key: &DocumentKey) {
        if let Ok(mut evicted) = self.evicted.lock() {
            evicted.push(key.clone());
        }
    }
}

/// Route `tracing` output through the test harness writer.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use roundhouse_core::ids::TeamId;

    #[test]
    fn fixed_clock_is_stable() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn manual_clock_moves_forward() {
        let clock = ManualClock::default();
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), test_time() + Duration::hours(2));
    }

    #[tokio::test]
    async fn recorder_keeps_order() {
        let notifier = RecordingNotifier::new();
        let team_id = TeamId::new();
        notifier
            .notify(Notification::TeamDisbanded { team_id })
            .await
            .unwrap();
        assert_eq!(notifier.count("team_disbanded"), 1);
        assert_eq!(notifier.sent(), vec![Notification::TeamDisbanded { team_id }]);
    }

    #[tokio::test]
    async fn failing_notifier_counts_attempts() {
        let notifier = FailingNotifier::new();
        let result = notifier
            .notify(Notification::TeamDisbanded {
                team_id: TeamId::new(),
            })
            .await;
        assert!(result.is_err());
        assert_eq!(notifier.attempts(), 1);
    }
}
