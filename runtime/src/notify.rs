//! Post-commit notification dispatch.

use crate::metrics::EngineMetrics;
use roundhouse_core::environment::{Notification, Notifier};
use std::sync::Arc;

/// Delivers notifications after a transition has committed.
///
/// Delivery failures are logged and counted; they never reach the caller,
/// because the transition they describe is already durable.
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    /// Wrap a notifier.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Deliver one notification.
    pub async fn send(&self, notification: Notification) {
        let name = notification.name();
        if let Err(error) = self.notifier.notify(notification).await {
            EngineMetrics::record_notification_failure(name);
            tracing::warn!(notification = name, error = %error, "Notification delivery failed");
        }
    }

    /// Deliver several notifications concurrently.
    pub async fn send_all(&self, notifications: Vec<Notification>) {
        futures::future::join_all(notifications.into_iter().map(|n| self.send(n))).await;
    }
}
