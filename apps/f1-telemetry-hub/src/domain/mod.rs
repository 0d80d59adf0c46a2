//! Domain Layer - Core timing types and pure computations.
//!
//! This layer contains the OpenF1 record types, the per-driver timing
//! merge, and the real-time message envelope. Nothing here performs I/O.

/// Real-time envelope and client message types.
pub mod streaming;

/// Per-connection topic subscriptions.
pub mod subscription;

/// Upstream record types, timing snapshots and formatting.
pub mod timing;
