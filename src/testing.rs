//! In-memory platform for exercising the host without a browser.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::blocking::BlockingRule;
use crate::error::PlatformError;
use crate::platform::{
    AlarmScheduler, BadgeState, Clock, FocusEvent, KeyValueStore, Notification, PlatformResult,
    RuleEngine, Surface, Ticker,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alarm {
    Once { when_ms: i64 },
    Periodic { period_minutes: f64 },
}

#[derive(Default)]
pub struct MemoryPlatform {
    now: Cell<i64>,
    store: RefCell<HashMap<String, Value>>,
    alarms: RefCell<BTreeMap<String, Alarm>>,
    arm_calls: Cell<usize>,
    rules: RefCell<BTreeMap<u32, BlockingRule>>,
    enabled_rulesets: RefCell<Vec<String>>,
    badge: Cell<Option<BadgeState>>,
    notifications: RefCell<Vec<Notification>>,
    events: RefCell<Vec<FocusEvent>>,
    ticker: Cell<Option<u32>>,
    ticker_starts: Cell<usize>,
    fail_storage: Cell<bool>,
    fail_rules: Cell<bool>,
}

impl MemoryPlatform {
    pub fn new(now: i64) -> Self {
        let platform = MemoryPlatform::default();
        platform.now.set(now);
        platform
    }

    pub fn advance(&self, ms: i64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn seed(&self, key: &str, value: Value) {
        self.store.borrow_mut().insert(key.to_string(), value);
    }

    pub fn stored(&self, key: &str) -> Option<Value> {
        self.store.borrow().get(key).cloned()
    }

    pub fn fail_storage(&self, fail: bool) {
        self.fail_storage.set(fail);
    }

    pub fn fail_rules(&self, fail: bool) {
        self.fail_rules.set(fail);
    }

    pub fn alarm(&self, name: &str) -> Option<Alarm> {
        self.alarms.borrow().get(name).copied()
    }

    pub fn arm_calls(&self) -> usize {
        self.arm_calls.get()
    }

    /// Removes and returns the single-shot alarms that are due, like the
    /// browser does when it fires them.
    pub fn fire_due_alarms(&self) -> Vec<String> {
        let now = self.now.get();
        let mut alarms = self.alarms.borrow_mut();
        let due: Vec<String> = alarms
            .iter()
            .filter(|(_, alarm)| matches!(alarm, Alarm::Once { when_ms } if *when_ms <= now))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &due {
            alarms.remove(name);
        }
        due
    }

    /// Sorted by rule ID.
    pub fn rules(&self) -> Vec<BlockingRule> {
        self.rules.borrow().values().cloned().collect()
    }

    pub fn install_rule(&self, rule: BlockingRule) {
        self.rules.borrow_mut().insert(rule.id, rule);
    }

    pub fn ruleset_enabled(&self, ruleset_id: &str) -> bool {
        self.enabled_rulesets.borrow().iter().any(|id| id == ruleset_id)
    }

    pub fn badge(&self) -> Option<BadgeState> {
        self.badge.get()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.borrow().clone()
    }

    pub fn events(&self) -> Vec<FocusEvent> {
        self.events.borrow().clone()
    }

    pub fn ticker_running(&self) -> bool {
        self.ticker.get().is_some()
    }

    pub fn ticker_starts(&self) -> usize {
        self.ticker_starts.get()
    }

    /// The worker was torn down: in-memory timers die, durable state stays.
    pub fn evict(&self) {
        self.ticker.set(None);
        self.badge.set(None);
    }

    fn check_storage(&self, api: &'static str) -> PlatformResult<()> {
        if self.fail_storage.get() {
            Err(PlatformError::new(api, "storage unavailable"))
        } else {
            Ok(())
        }
    }

    fn check_rules(&self) -> PlatformResult<()> {
        if self.fail_rules.get() {
            Err(PlatformError::new("declarativeNetRequest", "rule quota exceeded"))
        } else {
            Ok(())
        }
    }
}

impl Clock for MemoryPlatform {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }
}

impl KeyValueStore for MemoryPlatform {
    async fn get(&self, key: &str) -> PlatformResult<Option<Value>> {
        self.check_storage("storage.local.get")?;
        Ok(self.stored(key))
    }

    async fn set(&self, key: &str, value: Value) -> PlatformResult<()> {
        self.check_storage("storage.local.set")?;
        self.seed(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> PlatformResult<()> {
        self.check_storage("storage.local.remove")?;
        self.store.borrow_mut().remove(key);
        Ok(())
    }
}

impl AlarmScheduler for MemoryPlatform {
    async fn arm(&self, name: &str, when_ms: i64) -> PlatformResult<()> {
        self.arm_calls.set(self.arm_calls.get() + 1);
        self.alarms
            .borrow_mut()
            .insert(name.to_string(), Alarm::Once { when_ms });
        Ok(())
    }

    async fn arm_periodic(&self, name: &str, period_minutes: f64) -> PlatformResult<()> {
        self.alarms
            .borrow_mut()
            .insert(name.to_string(), Alarm::Periodic { period_minutes });
        Ok(())
    }

    async fn clear(&self, name: &str) -> PlatformResult<bool> {
        Ok(self.alarms.borrow_mut().remove(name).is_some())
    }

    async fn is_armed(&self, name: &str) -> PlatformResult<bool> {
        Ok(self.alarms.borrow().contains_key(name))
    }
}

impl RuleEngine for MemoryPlatform {
    async fn dynamic_rules(&self) -> PlatformResult<Vec<BlockingRule>> {
        Ok(self.rules())
    }

    /// Mirrors the browser: the update is all-or-nothing and adding an ID
    /// that is still live is an error.
    async fn update_dynamic_rules(
        &self,
        add: Vec<BlockingRule>,
        remove_ids: Vec<u32>,
    ) -> PlatformResult<()> {
        self.check_rules()?;
        let mut rules = self.rules.borrow_mut();
        let mut next = rules.clone();
        for id in remove_ids {
            next.remove(&id);
        }
        for rule in add {
            if next.contains_key(&rule.id) {
                return Err(PlatformError::new(
                    "declarativeNetRequest.updateDynamicRules",
                    format!("Rule with id {} does not have a unique ID", rule.id),
                ));
            }
            next.insert(rule.id, rule);
        }
        *rules = next;
        Ok(())
    }

    async fn set_ruleset_enabled(&self, ruleset_id: &str, enabled: bool) -> PlatformResult<()> {
        self.check_rules()?;
        let mut rulesets = self.enabled_rulesets.borrow_mut();
        rulesets.retain(|id| id != ruleset_id);
        if enabled {
            rulesets.push(ruleset_id.to_string());
        }
        Ok(())
    }
}

impl Surface for MemoryPlatform {
    async fn set_badge(&self, badge: BadgeState) -> PlatformResult<()> {
        self.badge.set(Some(badge));
        Ok(())
    }

    async fn notify(&self, notification: Notification) -> PlatformResult<()> {
        self.notifications.borrow_mut().push(notification);
        Ok(())
    }

    async fn broadcast(&self, event: FocusEvent) -> PlatformResult<()> {
        self.events.borrow_mut().push(event);
        Ok(())
    }
}

impl Ticker for MemoryPlatform {
    fn start_ticker(&self, interval_ms: u32) {
        if self.ticker.get().is_none() {
            self.ticker_starts.set(self.ticker_starts.get() + 1);
        }
        self.ticker.set(Some(interval_ms));
    }

    fn stop_ticker(&self) {
        self.ticker.set(None);
    }
}
