//! Session host: owns the one focus session of this worker, rehydrates it
//! from storage after a wake, and drives alarms, blocking rules and the
//! user-visible surfaces from its transitions.
//!
//! Every handler catches failures at its boundary. Storage, rule and
//! surface errors are logged and the transition still completes in memory;
//! the alarm armed in `start`/`resume` is the only thing that must fire for
//! a session to end.

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::blocking::RuleSynchronizer;
use crate::config::HostConfig;
use crate::domain::normalize_site;
use crate::enforcement::{self, SiteVerdict};
use crate::error::{FocusError, Result};
use crate::messages::{Request, Response};
use crate::platform::{BadgeState, FocusEvent, Notification, Platform};
use crate::session::{EndReason, FocusSession, Recovered};
use crate::settings::UserSettings;
use crate::sites::BlockedSites;
use crate::storage::{self, Activity, keys};

pub struct FocusHost<P: Platform> {
    platform: P,
    config: HostConfig,
    rules: RuleSynchronizer,
    settings: UserSettings,
    session: Option<FocusSession>,
    recovered: bool,
}

impl<P: Platform> FocusHost<P> {
    /// Fails only when the blocking configuration's rule IDs collide.
    pub fn new(platform: P, config: HostConfig) -> Result<Self> {
        let rules = RuleSynchronizer::new(config.blocking.clone())?;
        Ok(FocusHost {
            platform,
            config,
            rules,
            settings: UserSettings::default(),
            session: None,
            recovered: false,
        })
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn into_platform(self) -> P {
        self.platform
    }

    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    /// Runs recovery until it has succeeded once in this worker.
    pub async fn ensure_recovered(&mut self) {
        if !self.recovered {
            self.recover().await;
        }
    }

    /// Rehydrates from storage. Safe to call repeatedly: it never resets the
    /// stored timestamps and never arms a second focus alarm.
    ///
    /// Recovery only counts as done once the snapshot was read, so a failed
    /// read is retried by the next `ensure_recovered`.
    pub async fn recover(&mut self) {
        match storage::load::<_, UserSettings>(&self.platform, keys::USER_SETTINGS).await {
            Ok(Some(settings)) => self.settings = settings,
            Ok(None) => {}
            Err(e) => warn!("Keeping default settings: {e}"),
        }

        self.seed_blocked_sites().await;

        if self.reload_session().await {
            self.recovered = true;
        }

        if self.settings.auto_cleanup {
            match self.platform.is_armed(&self.config.cleanup_alarm).await {
                Ok(true) => {}
                Ok(false) => self.schedule_cleanup().await,
                Err(e) => warn!("Could not query cleanup alarm: {e}"),
            }
        }
    }

    /// Replaces the in-memory session with the stored snapshot. Returns
    /// false when the snapshot could not be read.
    async fn reload_session(&mut self) -> bool {
        let snapshot = match self.platform.get(keys::FOCUS_MODE_STATE).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Could not read focus snapshot, retrying on the next event: {e}");
                return false;
            }
        };

        let now = self.platform.now_ms();
        match Recovered::from_snapshot(snapshot, now) {
            Recovered::Idle => {
                debug!("No focus session to restore");
                self.session = None;
            }
            Recovered::Corrupt(reason) => {
                warn!("Discarding unreadable focus snapshot: {reason}");
                self.discard_corrupt_session().await;
            }
            Recovered::Active(session) => self.restore_session(session).await,
        }
        true
    }

    async fn seed_blocked_sites(&self) {
        match self.platform.get(keys::BLOCKED_SITES).await {
            Ok(Some(value)) if !value.is_null() => {}
            Ok(_) => {
                if let Err(e) =
                    storage::save(&self.platform, keys::BLOCKED_SITES, &BlockedSites::defaults()).await
                {
                    warn!("Could not seed default blocked sites: {e}");
                }
            }
            Err(e) => warn!("Could not read blocked sites: {e}"),
        }
    }

    async fn restore_session(&mut self, session: FocusSession) {
        let paused = session.paused;
        let remaining = session.remaining_time;
        info!(
            "Restoring focus session started at {} ({} ms remaining{})",
            session.start_time,
            remaining,
            if paused { ", paused" } else { "" }
        );
        self.session = Some(session);

        if !paused && remaining <= 0 {
            self.end(EndReason::Timeout).await;
            return;
        }

        self.platform.start_ticker(self.config.tick_interval_ms);
        self.show_badge(if paused { BadgeState::Paused } else { BadgeState::Running })
            .await;

        // Live dynamic rules may have been edited while no host was running.
        let sites = self.blocked_sites().await;
        if let Err(e) = self.rules.enable(&self.platform, &sites).await {
            warn!("Could not rebuild blocking rules for the restored session: {e}");
        }

        if !paused {
            match self.platform.is_armed(&self.config.focus_alarm).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Focus alarm missing for a running session, re-arming");
                    self.arm_focus_alarm(remaining).await;
                }
                Err(e) => warn!("Could not query focus alarm: {e}"),
            }
        }
    }

    async fn discard_corrupt_session(&mut self) {
        self.session = None;
        if let Err(e) = storage::remove(&self.platform, keys::FOCUS_MODE_STATE).await {
            warn!("Could not clear focus snapshot: {e}");
        }
        self.cancel_focus_alarm().await;
        if let Err(e) = self.rules.disable(&self.platform).await {
            warn!("Could not disable blocking after discarding snapshot: {e}");
        }
        self.show_badge(BadgeState::Idle).await;
    }

    /// Current session with derived fields recomputed, or an inactive
    /// default when idle.
    pub fn status(&self) -> FocusSession {
        let now = self.platform.now_ms();
        match &self.session {
            Some(session) => {
                let mut session = session.clone();
                session.refresh(now);
                session
            }
            None => FocusSession::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(|session| session.active)
    }

    /// Starts a session. A request while one is already active is ignored.
    pub async fn start(&mut self, duration_secs: u64) {
        if self.is_active() {
            info!("Ignoring start request: a focus session is already active");
            return;
        }
        if duration_secs == 0 {
            warn!("Ignoring start request with zero duration");
            return;
        }

        let now = self.platform.now_ms();
        let session = FocusSession::start(duration_secs, now);
        let duration = session.duration;
        self.session = Some(session);
        self.persist_session().await;

        self.arm_focus_alarm(duration).await;
        self.platform.start_ticker(self.config.tick_interval_ms);
        self.enable_blocking().await;
        self.show_badge(BadgeState::Running).await;

        let minutes = (duration_secs as f64 / 60.0).round() as u64;
        self.notify(Notification::new(
            "Focus Mode Started",
            format!("Focus session started for {minutes} minutes."),
        ))
        .await;
        self.broadcast(FocusEvent::FocusModeStarted).await;
        info!("Focus mode started for {duration_secs} s");
    }

    pub async fn pause(&mut self) {
        let now = self.platform.now_ms();
        let Some(session) = self.session.as_mut() else {
            debug!("Ignoring pause: no focus session");
            return;
        };
        if !session.pause(now) {
            debug!("Ignoring pause: session is not running");
            return;
        }

        self.persist_session().await;
        self.cancel_focus_alarm().await;
        self.show_badge(BadgeState::Paused).await;
        self.broadcast(FocusEvent::FocusModePaused).await;
        info!("Focus mode paused");
    }

    pub async fn resume(&mut self) {
        let now = self.platform.now_ms();
        let Some(session) = self.session.as_mut() else {
            debug!("Ignoring resume: no focus session");
            return;
        };
        if !session.resume(now) {
            debug!("Ignoring resume: session is not paused");
            return;
        }
        let remaining = session.remaining_time;

        self.persist_session().await;
        if remaining <= 0 {
            self.end(EndReason::Timeout).await;
            return;
        }

        self.arm_focus_alarm(remaining).await;
        self.platform.start_ticker(self.config.tick_interval_ms);
        self.show_badge(BadgeState::Running).await;
        self.broadcast(FocusEvent::FocusModeResumed).await;
        info!("Focus mode resumed with {remaining} ms remaining");
    }

    /// Ends the active session. No-op once ended, so a late alarm after a
    /// manual stop does nothing.
    pub async fn end(&mut self, reason: EndReason) {
        let now = self.platform.now_ms();
        let Some(mut session) = self.session.take() else {
            debug!("Ignoring end ({reason:?}): no focus session");
            return;
        };
        let Some(outcome) = session.finish(reason, now) else {
            debug!("Ignoring end ({reason:?}): session already ended");
            return;
        };

        self.platform.stop_ticker();
        self.cancel_focus_alarm().await;
        if let Err(e) = storage::remove(&self.platform, keys::FOCUS_MODE_STATE).await {
            warn!("Could not clear focus snapshot: {e}");
        }
        self.disable_blocking().await;
        self.show_badge(BadgeState::Idle).await;

        if outcome.completed {
            if let Err(e) = storage::record_completed_session(&self.platform, outcome.focused_ms).await {
                warn!("Could not update focus statistics: {e}");
            }
        }

        let notification = if outcome.completed {
            Notification::new(
                "Focus Session Completed!",
                "Congratulations! You completed your focus session.",
            )
        } else {
            Notification::new("Focus Session Ended", "Focus session was ended early.")
        };
        self.notify(notification).await;
        self.broadcast(FocusEvent::FocusModeEnded {
            completed: outcome.completed,
        })
        .await;
        info!(
            "Focus mode ended ({reason:?}): completed={}, focused {} ms",
            outcome.completed, outcome.focused_ms
        );
    }

    /// Advisory ~1 Hz refresh. Persists the snapshot and ends the session
    /// once the time is up.
    pub async fn tick(&mut self) {
        let now = self.platform.now_ms();
        let Some(session) = self.session.as_mut() else {
            self.platform.stop_ticker();
            return;
        };
        if !session.is_running() {
            return;
        }
        session.refresh(now);
        let remaining = session.remaining_time;

        self.persist_session().await;
        if remaining <= 0 {
            self.end(EndReason::Timeout).await;
        }
    }

    pub async fn on_alarm(&mut self, name: &str) {
        if name != self.config.focus_alarm {
            debug!("Alarm '{name}' is handled outside the focus host");
            return;
        }

        if self.session.is_none() {
            debug!("Focus alarm fired with no session in memory, rereading snapshot");
            self.reload_session().await;
        }

        let now = self.platform.now_ms();
        let Some(session) = self.session.as_ref().filter(|session| session.active) else {
            debug!("Focus alarm fired with no active session");
            return;
        };
        if session.paused {
            debug!("Stale focus alarm fired while paused");
            return;
        }

        let remaining = session.remaining_at(now);
        if remaining > 0 {
            debug!("Focus alarm fired {remaining} ms early, re-arming");
            self.arm_focus_alarm(remaining).await;
            return;
        }
        self.end(EndReason::Timeout).await;
    }

    pub async fn update_settings(&mut self, partial: &Value) {
        let change = match self.settings.merge(partial) {
            Ok(change) => change,
            Err(e) => {
                error!("Rejected settings update: {e}");
                return;
            }
        };

        if let Err(e) = storage::save(&self.platform, keys::USER_SETTINGS, &self.settings).await {
            warn!("Could not persist settings: {e}");
        }

        if change.cleanup_schedule {
            if self.settings.auto_cleanup {
                self.schedule_cleanup().await;
            } else if let Err(e) = self.platform.clear(&self.config.cleanup_alarm).await {
                warn!("Could not clear cleanup alarm: {e}");
            }
        }
        debug!("Settings updated: {:?}", self.settings);
    }

    async fn schedule_cleanup(&self) {
        let period = self.settings.cleanup_period_minutes();
        match self
            .platform
            .arm_periodic(&self.config.cleanup_alarm, period)
            .await
        {
            Ok(()) => info!("Auto-cleanup scheduled every {} hours", self.settings.cleanup_time),
            Err(e) => warn!("Could not schedule auto-cleanup: {e}"),
        }
    }

    pub async fn blocked_sites(&self) -> BlockedSites {
        self.stored_sites().await.unwrap_or_else(|e| {
            warn!("Falling back to default blocked sites: {e}");
            BlockedSites::defaults()
        })
    }

    /// The list exactly as stored. Other writers keep raw entries here, so
    /// nothing is normalized or dropped on the way in.
    async fn stored_sites(&self) -> Result<BlockedSites> {
        Ok(storage::load(&self.platform, keys::BLOCKED_SITES)
            .await?
            .unwrap_or_else(BlockedSites::defaults))
    }

    /// Adds a site (bare domain or page URL) to the blocked list, and to the
    /// live rules when blocking is on.
    pub async fn add_site(&mut self, input: &str) {
        if let Err(e) = self.try_add_site(input).await {
            error!("Could not block '{input}': {e}");
        }
    }

    async fn try_add_site(&mut self, input: &str) -> Result<()> {
        let site = normalize_site(input).ok_or_else(|| FocusError::InvalidSite(input.to_string()))?;
        let mut sites = self.stored_sites().await?;
        if !sites.insert(site.clone()) {
            debug!("{site} is already blocked");
            return Ok(());
        }
        storage::save(&self.platform, keys::BLOCKED_SITES, &sites).await?;

        if self.blocking_active().await {
            if let Err(e) = self.rules.add_site_rules(&self.platform, &site).await {
                warn!("Blocking rules for {site} not installed: {e}");
            }
        }

        self.record(format!("Added {site} to blocked sites"), "🚫").await;
        self.notify(Notification::new(
            "Site Added to Blacklist",
            format!("{site} will be blocked during focus mode."),
        ))
        .await;
        Ok(())
    }

    pub async fn remove_site(&mut self, input: &str) {
        if let Err(e) = self.try_remove_site(input).await {
            error!("Could not unblock '{input}': {e}");
        }
    }

    async fn try_remove_site(&mut self, input: &str) -> Result<()> {
        let site = normalize_site(input).ok_or_else(|| FocusError::InvalidSite(input.to_string()))?;
        let mut sites = self.stored_sites().await?;
        let removed_raw = sites.remove(input.trim());
        if !(sites.remove(&site) | removed_raw) {
            debug!("{site} was not blocked");
            return Ok(());
        }
        storage::save(&self.platform, keys::BLOCKED_SITES, &sites).await?;

        if self.blocking_active().await {
            if self.rules.config().is_static_site(&site) {
                warn!("{site} stays blocked by the static ruleset until focus mode ends");
            }
            if let Err(e) = self.rules.remove_site_rules(&self.platform, &site).await {
                warn!("Blocking rules for {site} not removed: {e}");
            }
        }

        self.record(format!("Removed {site} from blocked sites"), "✅").await;
        self.notify(Notification::new(
            "Site Removed from Blacklist",
            format!("{site} is no longer blocked during focus mode."),
        ))
        .await;
        Ok(())
    }

    pub async fn check_site(&self, url: &str) -> SiteVerdict {
        let sites = self.blocked_sites().await;
        enforcement::evaluate(self.is_active(), url, &sites)
    }

    pub async fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::StartFocusMode { duration } => {
                self.start(duration).await;
                Response::None
            }
            Request::PauseFocusMode => {
                self.pause().await;
                Response::None
            }
            Request::ResumeFocusMode => {
                self.resume().await;
                Response::None
            }
            Request::EndFocusMode => {
                self.end(EndReason::Explicit).await;
                Response::None
            }
            Request::GetFocusStatus => Response::Status(self.status()),
            Request::UpdateSettings { settings } => {
                self.update_settings(&settings).await;
                Response::None
            }
            Request::AddBlockedSite { site } => {
                self.add_site(&site).await;
                Response::None
            }
            Request::RemoveBlockedSite { site } => {
                self.remove_site(&site).await;
                Response::None
            }
            Request::GetBlockedSites => Response::Sites(self.blocked_sites().await.to_vec()),
            Request::CheckSite { url } => Response::Verdict(self.check_site(&url).await),
        }
    }

    async fn blocking_active(&self) -> bool {
        match self.rules.is_active(&self.platform).await {
            Ok(active) => active,
            Err(e) => {
                warn!("Could not read blocking flag, using session state: {e}");
                self.is_active()
            }
        }
    }

    async fn enable_blocking(&self) {
        let sites = self.blocked_sites().await;
        if let Err(e) = self.rules.enable(&self.platform, &sites).await {
            warn!("Site blocking is best-effort this session: {e}");
        }
        self.record("Site blocking enabled".to_string(), "🚫").await;
    }

    async fn disable_blocking(&self) {
        if let Err(e) = self.rules.disable(&self.platform).await {
            warn!("Could not fully disable site blocking: {e}");
        }
        self.record("Site blocking disabled".to_string(), "✅").await;
    }

    async fn persist_session(&self) {
        let Some(session) = &self.session else {
            return;
        };
        if let Err(e) = storage::save(&self.platform, keys::FOCUS_MODE_STATE, session).await {
            warn!("Focus snapshot not persisted, session will not survive a restart: {e}");
        }
    }

    async fn arm_focus_alarm(&self, delay_ms: i64) {
        let when = self.platform.now_ms().saturating_add(delay_ms.max(0));
        if let Err(e) = self.platform.arm(&self.config.focus_alarm, when).await {
            warn!("Could not arm focus alarm: {e}");
        }
    }

    async fn cancel_focus_alarm(&self) {
        if let Err(e) = self.platform.clear(&self.config.focus_alarm).await {
            warn!("Could not clear focus alarm: {e}");
        }
    }

    async fn show_badge(&self, badge: BadgeState) {
        if let Err(e) = self.platform.set_badge(badge).await {
            warn!("Could not update badge: {e}");
        }
    }

    async fn notify(&self, notification: Notification) {
        if !self.settings.enable_notifications {
            return;
        }
        if let Err(e) = self.platform.notify(notification).await {
            warn!("Could not show notification: {e}");
        }
    }

    async fn broadcast(&self, event: FocusEvent) {
        if let Err(e) = self.platform.broadcast(event).await {
            debug!("Broadcast not delivered: {e}");
        }
    }

    async fn record(&self, text: String, icon: &str) {
        let activity = Activity {
            icon: icon.to_string(),
            text,
            timestamp: self.platform.now_ms(),
        };
        if let Err(e) =
            storage::record_activity(&self.platform, activity, self.config.activity_cap).await
        {
            warn!("Could not record activity: {e}");
        }
    }
}
