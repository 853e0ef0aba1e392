//! Upkeep Guard - Idempotent Write Guard
//!
//! Ensures a side-effecting operation runs at most once per caller-supplied
//! request id within a replay window, and that every call inside the window
//! observes the original response:
//!
//! 1. [`IdempotencyGuard::check`] returns the stored snapshot on a hit.
//! 2. On a miss the caller performs the operation, then
//!    [`IdempotencyGuard::record`]s its snapshot.
//! 3. On [`RecordOutcome::Conflict`] the caller discards its own result and
//!    checks again to return the winner's snapshot.
//!
//! [`IdempotencyGuard::execute`] runs the whole protocol.

pub mod config;
pub mod error;
pub mod guard;
pub mod metrics;

pub use config::{GuardConfig, DEFAULT_WINDOW};
pub use error::{GuardError, GuardResult};
pub use guard::{CheckOutcome, Guarded, IdempotencyGuard, RecordOutcome};
pub use metrics::{GuardMetrics, GuardMetricsSnapshot};
