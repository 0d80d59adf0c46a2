//! OpenF1 client error types.

use std::time::Duration;

use thiserror::Error;

use crate::infrastructure::metrics::RequestOutcome;

/// Failure of a single upstream request.
///
/// Recovered inside the client: recorded in service health and never
/// returned past `fetch`.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connection failure, timeout or truncated body.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// HTTP 429.
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// How long the upstream asked us to stay away.
        retry_after: Duration,
    },

    /// Any other non-success status.
    #[error("upstream returned HTTP {status}")]
    Server {
        /// Status code.
        status: u16,
    },

    /// Body was not valid JSON.
    #[error("undecodable response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl UpstreamError {
    /// Metrics label for this failure.
    #[must_use]
    pub const fn outcome(&self) -> RequestOutcome {
        match self {
            Self::Transport(_) => RequestOutcome::Transport,
            Self::RateLimited { .. } => RequestOutcome::RateLimited,
            Self::Server { .. } => RequestOutcome::HttpError,
            Self::Decode(_) => RequestOutcome::Decode,
        }
    }
}

/// The HTTP client could not be constructed.
#[derive(Debug, Error)]
#[error("failed to build OpenF1 HTTP client: {0}")]
pub struct ClientBuildError(#[from] pub reqwest::Error);
