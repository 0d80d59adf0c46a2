//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (upstream API, broadcast).
pub mod ports;

/// Application services for aggregation, session lookup and scheduling.
pub mod services;
