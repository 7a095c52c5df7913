//! Typed access to `chrome.storage.local` keys, plus the activity log and
//! counters that live beside the session snapshot.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FocusError, Result};
use crate::platform::KeyValueStore;

pub mod keys {
    pub const FOCUS_MODE_STATE: &str = "focusModeState";
    pub const BLOCKED_SITES: &str = "blockedSites";
    /// Read by page agents through storage-change notifications.
    pub const FOCUS_MODE_ACTIVE: &str = "focusModeActive";
    pub const USER_SETTINGS: &str = "userSettings";
    pub const RECENT_ACTIVITIES: &str = "recentActivities";
    pub const PERFORMANCE_STATS: &str = "performanceStats";
}

pub async fn load<S, T>(store: &S, key: &str) -> Result<Option<T>>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    let Some(value) = store.get(key).await.map_err(FocusError::Storage)? else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| FocusError::Malformed {
            key: key.to_string(),
            source,
        })
}

pub async fn save<S, T>(store: &S, key: &str, value: &T) -> Result<()>
where
    S: KeyValueStore + ?Sized,
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value).map_err(|source| FocusError::Malformed {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value).await.map_err(FocusError::Storage)
}

pub async fn remove<S>(store: &S, key: &str) -> Result<()>
where
    S: KeyValueStore + ?Sized,
{
    store.remove(key).await.map_err(FocusError::Storage)
}

/// One line in the popup's "recent activity" list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub icon: String,
    pub text: String,
    pub timestamp: i64,
}

/// Newest-first, bounded list of activities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityLog {
    entries: Vec<Activity>,
}

impl ActivityLog {
    pub fn push(&mut self, activity: Activity, cap: usize) {
        self.entries.insert(0, activity);
        self.entries.truncate(cap);
    }

    pub fn entries(&self) -> &[Activity] {
        &self.entries
    }
}

/// Appends to `recentActivities`. Read-modify-write; a concurrent writer
/// can lose an entry.
pub async fn record_activity<S>(store: &S, activity: Activity, cap: usize) -> Result<()>
where
    S: KeyValueStore + ?Sized,
{
    // A corrupt log is replaced rather than blocking new entries.
    let mut log: ActivityLog = load(store, keys::RECENT_ACTIVITIES)
        .await
        .or_else(|e| match e {
            FocusError::Malformed { .. } => Ok(None),
            other => Err(other),
        })?
        .unwrap_or_default();
    log.push(activity, cap);
    save(store, keys::RECENT_ACTIVITIES, &log).await
}

/// Usage counters. Counters maintained by other parts of the extension are
/// preserved untouched in `other`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceStats {
    pub tabs_opened: u64,
    pub tabs_closed: u64,
    pub focus_sessions_completed: u64,
    /// Seconds.
    pub total_focus_time: u64,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl PerformanceStats {
    pub fn record_completed_session(&mut self, focused_ms: i64) {
        self.focus_sessions_completed += 1;
        let seconds = (focused_ms.max(0) as f64 / 1000.0).round() as u64;
        self.total_focus_time = self.total_focus_time.saturating_add(seconds);
    }
}

pub async fn record_completed_session<S>(store: &S, focused_ms: i64) -> Result<()>
where
    S: KeyValueStore + ?Sized,
{
    let mut stats: PerformanceStats = load(store, keys::PERFORMANCE_STATS)
        .await?
        .unwrap_or_default();
    stats.record_completed_session(focused_ms);
    save(store, keys::PERFORMANCE_STATS, &stats).await
}
