//! Seams between the focus host and the browser.
//!
//! Each trait maps onto one family of extension APIs. The host only ever
//! talks to these traits, so the same state machine runs against Chrome in
//! the worker and against an in-memory double in tests.

#![allow(async_fn_in_trait)]

use serde::{Deserialize, Serialize};

use crate::blocking::BlockingRule;
use crate::error::PlatformError;

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Wall-clock source, epoch milliseconds.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

/// Process-independent key-value storage.
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> PlatformResult<Option<serde_json::Value>>;
    async fn set(&self, key: &str, value: serde_json::Value) -> PlatformResult<()>;
    async fn remove(&self, key: &str) -> PlatformResult<()>;
}

/// Durable deferred callbacks. Alarms survive the worker being torn down;
/// arming a name that is already armed replaces it.
pub trait AlarmScheduler {
    async fn arm(&self, name: &str, when_ms: i64) -> PlatformResult<()>;
    async fn arm_periodic(&self, name: &str, period_minutes: f64) -> PlatformResult<()>;
    async fn clear(&self, name: &str) -> PlatformResult<bool>;
    async fn is_armed(&self, name: &str) -> PlatformResult<bool>;
}

/// The networking layer's declarative rule set.
pub trait RuleEngine {
    async fn dynamic_rules(&self) -> PlatformResult<Vec<BlockingRule>>;
    /// Removals and additions are applied as one update.
    async fn update_dynamic_rules(
        &self,
        add: Vec<BlockingRule>,
        remove_ids: Vec<u32>,
    ) -> PlatformResult<()>;
    async fn set_ruleset_enabled(&self, ruleset_id: &str, enabled: bool) -> PlatformResult<()>;
}

/// User-visible side effects.
pub trait Surface {
    async fn set_badge(&self, badge: BadgeState) -> PlatformResult<()>;
    async fn notify(&self, notification: Notification) -> PlatformResult<()>;
    async fn broadcast(&self, event: FocusEvent) -> PlatformResult<()>;
}

/// Advisory foreground tick. Dies with the worker; never responsible for
/// ending a session on its own.
pub trait Ticker {
    fn start_ticker(&self, interval_ms: u32);
    fn stop_ticker(&self);
}

pub trait Platform: Clock + KeyValueStore + AlarmScheduler + RuleEngine + Surface + Ticker {}

impl<T> Platform for T where T: Clock + KeyValueStore + AlarmScheduler + RuleEngine + Surface + Ticker {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeState {
    Running,
    Paused,
    Idle,
}

impl BadgeState {
    pub fn text(self) -> &'static str {
        match self {
            BadgeState::Running => "FOCUS",
            BadgeState::Paused => "PAUSE",
            BadgeState::Idle => "",
        }
    }

    pub fn color(self) -> Option<&'static str> {
        match self {
            BadgeState::Running => Some("#ff4444"),
            BadgeState::Paused => Some("#ffaa00"),
            BadgeState::Idle => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notification {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Messages pushed to popups and page agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum FocusEvent {
    FocusModeStarted,
    FocusModePaused,
    FocusModeResumed,
    FocusModeEnded { completed: bool },
}
