//! Engine configuration.
//!
//! # Example
//!
//! ```rust
//! use roundhouse_runtime::config::EngineConfig;
//! use std::time::Duration;
//!
//! let config = EngineConfig::builder()
//!     .invite_code_length(8)
//!     .cache_capacity(4096)
//!     .cache_ttl(Duration::from_secs(60))
//!     .build();
//!
//! assert_eq!(config.invite_code_length, 8);
//! ```

use chrono::Duration as Notice;
use std::time::Duration;

/// One step of the refund schedule: cancelling at least `min_notice` before
/// the event starts refunds `percentage` percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundTier {
    /// Minimum time between cancellation and event start
    pub min_notice: Notice,
    /// Refunded share, 0 to 100
    pub percentage: u8,
}

impl RefundTier {
    /// Create a tier.
    #[must_use]
    pub const fn new(min_notice: Notice, percentage: u8) -> Self {
        Self {
            min_notice,
            percentage,
        }
    }
}

/// Default refund schedule: 100% a week out, 50% two days out, 25% a day out.
#[must_use]
pub fn default_refund_tiers() -> Vec<RefundTier> {
    vec![
        RefundTier::new(Notice::days(7), 100),
        RefundTier::new(Notice::hours(48), 50),
        RefundTier::new(Notice::hours(24), 25),
    ]
}

/// Engine configuration.
///
/// # Default Values
///
/// - `invite_code_length`: 6
/// - `invite_code_attempts`: 5
/// - `cache_capacity`: 1024 (0 disables read caching)
/// - `cache_ttl`: 30 seconds
/// - `refund_tiers`: [`default_refund_tiers`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Characters in a generated invite code
    pub invite_code_length: usize,
    /// Codes tried before giving up on a collision streak
    pub invite_code_attempts: u32,
    /// Maximum cached records
    pub cache_capacity: usize,
    /// Lifetime of a cached record
    pub cache_ttl: Duration,
    /// Refund schedule, any order
    pub refund_tiers: Vec<RefundTier>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            invite_code_length: 6,
            invite_code_attempts: 5,
            cache_capacity: 1024,
            cache_ttl: Duration::from_secs(30),
            refund_tiers: default_refund_tiers(),
        }
    }
}

impl EngineConfig {
    /// Create a new config builder.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the invite code length (minimum 4).
    #[must_use]
    pub fn invite_code_length(mut self, length: usize) -> Self {
        self.config.invite_code_length = length.max(4);
        self
    }

    /// Set how many fresh codes are tried on collision (minimum 1).
    #[must_use]
    pub fn invite_code_attempts(mut self, attempts: u32) -> Self {
        self.config.invite_code_attempts = attempts.max(1);
        self
    }

    /// Set the read cache capacity.
    #[must_use]
    pub const fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Set the read cache TTL.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    /// Replace the refund schedule.
    #[must_use]
    pub fn refund_tiers(mut self, tiers: Vec<RefundTier>) -> Self {
        self.config.refund_tiers = tiers;
        self
    }

    /// Build the [`EngineConfig`].
    #[must_use]
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
