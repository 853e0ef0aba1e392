//! Upkeep Service - Service-Order Creation over PostgreSQL
//!
//! Wires the idempotency guard to the spare-part inventory:
//! - [`db`]: connection pool configuration, schema bootstrap
//! - [`pg_idempotency`], [`pg_orders`]: Postgres-backed stores
//! - [`orders`]: [`OrderService`], the guarded order operations
//! - [`error`]: [`ServiceError`] with codes and HTTP status mapping
//! - [`telemetry`]: tracing subscriber setup

pub mod db;
pub mod error;
pub mod orders;
pub mod pg_idempotency;
pub mod pg_orders;
pub mod telemetry;

pub use db::{DbClient, DbConfig, BOOTSTRAP_SQL};
pub use error::{ErrorCode, ServiceError, ServiceResult};
pub use orders::OrderService;
pub use pg_idempotency::PgIdempotencyStore;
pub use pg_orders::PgOrderStore;
pub use telemetry::{init_tracing, TelemetryConfig};

pub use upkeep_guard::{GuardConfig, Guarded};
