//! Engine settings.

use chrono::Duration;

/// Days a reservation is held before it is reported as expired.
pub const DEFAULT_RESERVATION_TTL_DAYS: i64 = 7;

/// Longest reservation lifetime accepted; longer values are capped.
pub const MAX_RESERVATION_TTL_DAYS: i64 = 3650;

/// Attempts a read-compare-write credit makes before giving up on a busy row.
pub const DEFAULT_ADJUST_ATTEMPTS: u32 = 5;

/// Settings shared by every fulfillment component.
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    /// Lifetime stamped on new reservations as their expiry date.
    pub reservation_ttl: Duration,

    /// Drain the backorder queue after every goods receipt.
    pub auto_drain_on_receipt: bool,

    /// Attempts for ledger adjustments that must not be lost, such as
    /// crediting stock back during compensation.
    pub adjust_attempts: u32,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::days(DEFAULT_RESERVATION_TTL_DAYS),
            auto_drain_on_receipt: false,
            adjust_attempts: DEFAULT_ADJUST_ATTEMPTS,
        }
    }
}

impl FulfillmentConfig {
    /// Sets the reservation lifetime, clamped to `0..=MAX_RESERVATION_TTL_DAYS`.
    pub fn with_reservation_ttl(mut self, ttl: Duration) -> Self {
        self.reservation_ttl =
            ttl.clamp(Duration::zero(), Duration::days(MAX_RESERVATION_TTL_DAYS));
        self
    }

    pub fn with_auto_drain(mut self, enabled: bool) -> Self {
        self.auto_drain_on_receipt = enabled;
        self
    }

    pub fn with_adjust_attempts(mut self, attempts: u32) -> Self {
        self.adjust_attempts = attempts.max(1);
        self
    }
}
