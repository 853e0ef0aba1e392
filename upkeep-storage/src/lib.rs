//! Upkeep Storage - Storage Traits and In-Memory Implementations
//!
//! Defines the storage abstraction layer for idempotency records and the
//! order inventory. The PostgreSQL implementations live in `upkeep-service`.

pub mod idempotency;
pub mod orders;

pub use idempotency::{IdempotencyStore, InMemoryIdempotencyStore, InsertOutcome};
pub use orders::{InMemoryOrderStore, OrderStore};

// ============================================================================
// PROPERTY TESTS
// ============================================================================
