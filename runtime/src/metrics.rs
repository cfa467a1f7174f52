//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the engine:
//! - Conflicts per operation and kind
//! - Admissions (registrations, waitlist entries, promotions)
//! - Store operation latency
//! - Swallowed notification failures
//!
//! # Example
//!
//! ```rust,no_run
//! use roundhouse_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Render for a /metrics endpoint
//! let body = server.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use roundhouse_core::error::Result;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// Installs the global recorder; the web layer serves [`MetricsServer::render`]
/// on its metrics listener.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the metrics endpoint is served on
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the metrics endpoint is served on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning and leaves `handle` empty.
    pub fn start(&mut self) -> std::result::Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "roundhouse_conflicts_total",
        "Operations rejected with a state or capacity conflict"
    );
    describe_counter!(
        "roundhouse_admissions_total",
        "Participants admitted, by outcome (counted, waitlisted, promoted)"
    );
    describe_counter!(
        "roundhouse_progressions_total",
        "Participants processed by advance, by outcome"
    );
    describe_counter!(
        "roundhouse_notification_failures_total",
        "Notifications whose delivery failed after commit"
    );
    describe_histogram!(
        "roundhouse_store_op_duration_seconds",
        "Time spent in conditional store operations"
    );
}

/// Engine metrics recorder.
pub struct EngineMetrics;

impl EngineMetrics {
    /// Record the outcome of a public operation, counting conflicts.
    ///
    /// # Errors
    ///
    /// Returns `result` unchanged.
    pub fn observe<T>(operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            if error.is_conflict() {
                counter!(
                    "roundhouse_conflicts_total",
                    "operation" => operation,
                    "kind" => error.kind().as_str()
                )
                .increment(1);
                tracing::debug!(operation, reason = %error, "Operation rejected");
            } else if matches!(error, roundhouse_core::EngineError::Internal(_)) {
                tracing::error!(operation, error = %error, "Operation failed");
            }
        }
        result
    }

    /// Record admitted participants.
    pub fn record_admission(outcome: &'static str, participants: usize) {
        counter!("roundhouse_admissions_total", "outcome" => outcome).increment(participants as u64);
    }

    /// Record a participant processed by advance.
    pub fn record_progression(outcome: &'static str) {
        counter!("roundhouse_progressions_total", "outcome" => outcome).increment(1);
    }

    /// Record a failed notification.
    pub fn record_notification_failure(notification: &'static str) {
        counter!(
            "roundhouse_notification_failures_total",
            "notification" => notification
        )
        .increment(1);
    }

    /// Record a store operation.
    pub fn record_store_op(op: &'static str, duration: Duration) {
        histogram!("roundhouse_store_op_duration_seconds", "op" => op)
            .record(duration.as_secs_f64());
    }
}
