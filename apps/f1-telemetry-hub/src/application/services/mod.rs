//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `TimingAggregator`: merges the timing sources of a session into a board
//! - `SessionResolver`: finds the current session or a session by key
//! - `StreamingScheduler`: polls upstream and feeds the broadcast port
//! - `BackoffPolicy`: health-aware waits used by the scheduler

mod aggregator;
mod backoff;
mod scheduler;
mod session;

pub use aggregator::{AggregationError, TimingAggregator, TimingBoard};
pub use backoff::{BackoffPolicy, DEFAULT_JITTER_FACTOR};
pub use scheduler::{PollBatch, SchedulerState, StreamingScheduler, Transition};
pub use session::SessionResolver;
