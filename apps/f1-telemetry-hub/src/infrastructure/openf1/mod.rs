//! OpenF1 Upstream Adapter
//!
//! Implements [`UpstreamPort`](crate::application::ports::UpstreamPort)
//! over the OpenF1 REST API with a TTL response cache, bounded request
//! concurrency and consecutive-failure / rate-limit tracking.

mod cache;
mod client;
mod error;

pub use cache::{CacheKey, ResponseCache, ServiceHealth};
pub use client::UpstreamClient;
pub use error::{ClientBuildError, UpstreamError};
