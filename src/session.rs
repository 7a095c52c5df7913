//! Focus session state machine.
//!
//! All time accounting is derived from absolute timestamps so a session
//! rebuilt from a snapshot continues on exactly the same trajectory.
//!
//! ```text
//! Idle -> Active -> Paused -> Active -> ... -> Ended
//! ```

use serde::{Deserialize, Serialize};

/// A focus session, persisted verbatim as the `focusModeState` snapshot.
///
/// `remaining_time` and `elapsed_time` are cached for observers only; they
/// are recomputed on every observation and never read back from storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub active: bool,
    /// Epoch milliseconds. Fixed for the session's lifetime.
    pub start_time: i64,
    /// Planned active duration in milliseconds.
    pub duration: i64,
    pub paused: bool,
    pub paused_at: Option<i64>,
    pub total_paused_time: i64,
    pub remaining_time: i64,
    pub elapsed_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Explicit,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub reason: EndReason,
    pub completed: bool,
    /// Active (unpaused) milliseconds at the moment the session ended.
    pub focused_ms: i64,
}

impl FocusSession {
    pub fn start(duration_secs: u64, now: i64) -> FocusSession {
        let duration = i64::try_from(duration_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        let mut session = FocusSession {
            active: true,
            start_time: now,
            duration,
            paused: false,
            paused_at: None,
            total_paused_time: 0,
            remaining_time: duration,
            elapsed_time: 0,
        };
        session.refresh(now);
        session
    }

    pub fn is_running(&self) -> bool {
        self.active && !self.paused
    }

    /// `(paused ? pausedAt : now) - startTime - totalPausedTime`, never negative.
    pub fn elapsed_at(&self, now: i64) -> i64 {
        let reference = match (self.paused, self.paused_at) {
            (true, Some(paused_at)) => paused_at,
            _ => now,
        };
        reference
            .saturating_sub(self.start_time)
            .saturating_sub(self.total_paused_time)
            .max(0)
    }

    pub fn remaining_at(&self, now: i64) -> i64 {
        self.duration.saturating_sub(self.elapsed_at(now)).max(0)
    }

    /// Recomputes the cached derived fields.
    pub fn refresh(&mut self, now: i64) {
        self.elapsed_time = self.elapsed_at(now);
        self.remaining_time = self.duration.saturating_sub(self.elapsed_time).max(0);
    }

    /// Returns false when the session is not running.
    pub fn pause(&mut self, now: i64) -> bool {
        if !self.is_running() {
            return false;
        }
        self.paused = true;
        self.paused_at = Some(now);
        self.refresh(now);
        true
    }

    /// Folds the preceding pause into `total_paused_time`. Returns false when
    /// the session is not paused.
    pub fn resume(&mut self, now: i64) -> bool {
        if !(self.active && self.paused) {
            return false;
        }
        let paused_for = self
            .paused_at
            .map(|paused_at| now.saturating_sub(paused_at).max(0))
            .unwrap_or(0);
        self.total_paused_time = self.total_paused_time.saturating_add(paused_for);
        self.paused = false;
        self.paused_at = None;
        self.refresh(now);
        true
    }

    /// Deactivates the session. `None` when it had already ended.
    pub fn finish(&mut self, reason: EndReason, now: i64) -> Option<SessionOutcome> {
        if !self.active {
            return None;
        }
        self.refresh(now);
        let focused_ms = self.elapsed_time;
        self.active = false;
        Some(SessionOutcome {
            reason,
            completed: focused_ms >= self.duration,
            focused_ms,
        })
    }
}

/// Lenient mirror of the snapshot used when rehydrating. Every field is
/// optional so a partially written snapshot decodes and can be judged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredSession {
    active: Option<bool>,
    start_time: Option<i64>,
    duration: Option<i64>,
    paused: Option<bool>,
    paused_at: Option<i64>,
    total_paused_time: Option<i64>,
}

/// What a persisted snapshot turned out to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovered {
    /// No snapshot, or one for a session that already ended.
    Idle,
    Active(FocusSession),
    /// Claims to be active but cannot be reconstructed.
    Corrupt(String),
}

impl Recovered {
    pub fn from_snapshot(snapshot: Option<serde_json::Value>, now: i64) -> Recovered {
        let Some(value) = snapshot else {
            return Recovered::Idle;
        };
        if value.is_null() {
            return Recovered::Idle;
        }

        let stored: StoredSession = match serde_json::from_value(value) {
            Ok(stored) => stored,
            Err(e) => return Recovered::Corrupt(e.to_string()),
        };

        if stored.active != Some(true) {
            return Recovered::Idle;
        }

        let (Some(start_time), Some(duration)) = (stored.start_time, stored.duration) else {
            return Recovered::Corrupt("missing startTime or duration".to_string());
        };
        let paused = stored.paused.unwrap_or(false);
        if paused && stored.paused_at.is_none() {
            return Recovered::Corrupt("paused without pausedAt".to_string());
        }
        if duration < 0 {
            return Recovered::Corrupt(format!("negative duration {duration}"));
        }

        let mut session = FocusSession {
            active: true,
            start_time,
            duration,
            paused,
            paused_at: if paused { stored.paused_at } else { None },
            total_paused_time: stored.total_paused_time.unwrap_or(0).max(0),
            remaining_time: 0,
            elapsed_time: 0,
        };
        session.refresh(now);
        Recovered::Active(session)
    }
}
