//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the reconciliation services and the port interfaces
//! that define how they reach the gateway, the venue calendar and the host.

/// Lifecycle events published to the host.
pub mod events;

/// Port interfaces for external systems (gateway sockets, calendar, host).
pub mod ports;

/// Application services: session, sequencing, dispatch, order routing.
pub mod services;
