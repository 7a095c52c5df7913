//! What a page agent should show for the page it runs in.

use serde::{Deserialize, Serialize};

use crate::domain::{extract_hostname, matches_blocked_site};
use crate::sites::BlockedSites;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteVerdict {
    /// Full-page block.
    Blocked,
    /// Passive "focus mode is on" reminder.
    Reminder,
    /// No session; leave the page alone.
    Allowed,
}

/// Paused sessions still count as active: blocking stays on during a pause.
pub fn evaluate(session_active: bool, page_url: &str, blocked: &BlockedSites) -> SiteVerdict {
    if !session_active {
        return SiteVerdict::Allowed;
    }

    let Some(hostname) = extract_hostname(page_url) else {
        return SiteVerdict::Reminder;
    };

    if blocked.iter().any(|site| matches_blocked_site(&hostname, site)) {
        SiteVerdict::Blocked
    } else {
        SiteVerdict::Reminder
    }
}
