//! Action-tagged messages exchanged between the worker and its observers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enforcement::SiteVerdict;
use crate::session::FocusSession;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    /// `duration` is in seconds.
    StartFocusMode { duration: u64 },
    PauseFocusMode,
    ResumeFocusMode,
    EndFocusMode,
    GetFocusStatus,
    UpdateSettings { settings: Value },
    AddBlockedSite { site: String },
    RemoveBlockedSite { site: String },
    GetBlockedSites,
    CheckSite { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    None,
    Status(FocusSession),
    Sites(Vec<String>),
    Verdict(SiteVerdict),
}
