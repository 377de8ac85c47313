//! Domain Layer - Core reconciliation types and business logic.
//!
//! Pure types with no I/O: execution reports, sequence continuity, venue
//! trading hours, and order tickets.

/// Execution report variants and sequenced frame bodies.
pub mod report;

/// Sequence continuity state machine.
pub mod sequence;

/// Venue trading hours.
pub mod calendar;

/// Order tickets and FIX codes.
pub mod order;
