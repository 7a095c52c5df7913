//! Built-in host configuration. User-tunable values live in `UserSettings`.

use crate::blocking::BlockingConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    /// Period of the advisory foreground tick.
    pub tick_interval_ms: u32,
    /// Single-shot alarm that ends the session.
    pub focus_alarm: String,
    /// Periodic maintenance alarm, handled outside the focus host.
    pub cleanup_alarm: String,
    pub activity_cap: usize,
    pub notification_icon: String,
    pub blocking: BlockingConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            tick_interval_ms: 1000,
            focus_alarm: "focusMode".to_string(),
            cleanup_alarm: "autoCleanup".to_string(),
            activity_cap: 50,
            notification_icon: "icon-48.png".to_string(),
            blocking: BlockingConfig::default(),
        }
    }
}
