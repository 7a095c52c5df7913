//! Error types for the focus host and its platform seams.

use thiserror::Error;

/// A rejected call into a browser API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{api} failed: {message}")]
pub struct PlatformError {
    pub api: &'static str,
    pub message: String,
}

impl PlatformError {
    pub fn new(api: &'static str, message: impl Into<String>) -> Self {
        PlatformError {
            api,
            message: message.into(),
        }
    }
}

/// Core error type. Host transitions catch these at the operation boundary
/// and log them; only the WASM bridge turns them into values a caller sees.
#[derive(Error, Debug)]
pub enum FocusError {
    /// Durable store read or write failed
    #[error("Storage error: {0}")]
    Storage(#[source] PlatformError),

    /// Network rule update rejected (quota, invalid pattern)
    #[error("Blocking rule update failed: {0}")]
    Rules(#[source] PlatformError),

    /// Alarm could not be armed or cleared
    #[error("Alarm error: {0}")]
    Alarm(#[source] PlatformError),

    /// Badge, notification or broadcast failed
    #[error("Surface error: {0}")]
    Surface(#[source] PlatformError),

    /// A stored value could not be decoded
    #[error("Malformed value under '{key}': {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Input that does not name a blockable site
    #[error("Invalid site: '{0}'")]
    InvalidSite(String),

    /// Settings update that does not fit the settings schema
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Dynamic rule IDs overlap the static baseline ruleset
    #[error("Dynamic rule IDs {dynamic_start}..={dynamic_end} collide with static rule IDs up to {static_end}")]
    RuleIdCollision {
        static_end: u32,
        dynamic_start: u32,
        dynamic_end: u32,
    },

    /// Not enough free IDs left in the dynamic namespace
    #[error("Dynamic rule namespace exhausted: need {needed} IDs, {available} free")]
    RuleIdsExhausted { needed: usize, available: usize },
}

/// Result type alias for FocusError
pub type Result<T, E = FocusError> = std::result::Result<T, E>;
