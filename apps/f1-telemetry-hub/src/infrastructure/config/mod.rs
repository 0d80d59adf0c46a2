//! Configuration Module
//!
//! Configuration loading for the telemetry hub.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_OPENF1_BASE_URL, HubConfig, SchedulerSettings, ServerSettings,
    UpstreamSettings, WebSocketSettings,
};
