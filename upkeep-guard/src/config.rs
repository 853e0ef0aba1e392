//! Guard configuration.
//!
//! Replay windows are fixed per operation type and loaded from environment
//! variables with defaults suitable for development.

use std::time::Duration;

/// Default replay window (24 hours).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Replay windows per guarded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Window within which a repeated order creation replays the first response.
    pub order_window: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            order_window: DEFAULT_WINDOW,
        }
    }
}

impl GuardConfig {
    /// Create GuardConfig from environment variables.
    ///
    /// Environment variables:
    /// - `UPKEEP_ORDER_IDEMPOTENCY_WINDOW_SECS`: order creation window in seconds (default: 86400)
    ///
    /// Unparseable or zero values fall back to the default.
    pub fn from_env() -> Self {
        let order_window = std::env::var("UPKEEP_ORDER_IDEMPOTENCY_WINDOW_SECS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_WINDOW);

        Self { order_window }
    }

    pub fn with_order_window(mut self, window: Duration) -> Self {
        self.order_window = window;
        self
    }
}
