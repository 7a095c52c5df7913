//! `Platform` backed by the extension APIs of the running browser.
//!
//! The calls go through a thin JS module so every Chrome promise surfaces
//! here as an awaitable `Result<JsValue, JsValue>`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::blocking::BlockingRule;
use crate::error::PlatformError;
use crate::platform::{
    AlarmScheduler, BadgeState, Clock, FocusEvent, KeyValueStore, Notification, PlatformResult,
    RuleEngine, Surface, Ticker,
};

#[wasm_bindgen(module = "/chrome_api.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn storageGet(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageSet(key: &str, value: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageRemove(key: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn alarmCreateAt(name: &str, when: f64) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn alarmCreatePeriodic(name: &str, period_in_minutes: f64) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn alarmClear(name: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn alarmGet(name: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getDynamicRules() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn updateDynamicRules(add_rules: JsValue, remove_rule_ids: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn updateEnabledRulesets(ruleset_id: &str, enabled: bool) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn setBadge(text: &str, color: Option<String>) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn createNotification(icon_url: &str, title: &str, message: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn broadcastMessage(message: JsValue) -> Result<(), JsValue>;

    fn startTicker(interval_ms: u32, callback: &js_sys::Function);

    fn stopTicker();
}

/// Converts a rejected promise into a `PlatformError`.
fn platform_error(api: &'static str, error: JsValue) -> PlatformError {
    let message = error
        .dyn_ref::<js_sys::Error>()
        .map(|e| String::from(e.message()))
        .or_else(|| error.as_string())
        .unwrap_or_else(|| format!("{error:?}"));
    PlatformError::new(api, message)
}

/// Plain objects and arrays, never JS `Map`s, so Chrome can store them.
fn to_js<T: Serialize + ?Sized>(api: &'static str, value: &T) -> PlatformResult<JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| PlatformError::new(api, e.to_string()))
}

fn from_js<T: DeserializeOwned>(api: &'static str, value: JsValue) -> PlatformResult<T> {
    serde_wasm_bindgen::from_value(value).map_err(|e| PlatformError::new(api, e.to_string()))
}

pub struct ChromePlatform {
    notification_icon: String,
    on_tick: Closure<dyn FnMut()>,
}

impl ChromePlatform {
    /// `on_tick` runs on every advisory tick while the ticker is started.
    pub fn new(notification_icon: impl Into<String>, on_tick: Closure<dyn FnMut()>) -> Self {
        ChromePlatform {
            notification_icon: notification_icon.into(),
            on_tick,
        }
    }
}

impl Clock for ChromePlatform {
    fn now_ms(&self) -> i64 {
        js_sys::Date::now() as i64
    }
}

impl KeyValueStore for ChromePlatform {
    async fn get(&self, key: &str) -> PlatformResult<Option<Value>> {
        let value = storageGet(key)
            .await
            .map_err(|e| platform_error("storage.local.get", e))?;
        if value.is_undefined() {
            return Ok(None);
        }
        from_js("storage.local.get", value)
    }

    async fn set(&self, key: &str, value: Value) -> PlatformResult<()> {
        let value = to_js("storage.local.set", &value)?;
        storageSet(key, value)
            .await
            .map_err(|e| platform_error("storage.local.set", e))
    }

    async fn remove(&self, key: &str) -> PlatformResult<()> {
        storageRemove(key)
            .await
            .map_err(|e| platform_error("storage.local.remove", e))
    }
}

impl AlarmScheduler for ChromePlatform {
    async fn arm(&self, name: &str, when_ms: i64) -> PlatformResult<()> {
        alarmCreateAt(name, when_ms as f64)
            .await
            .map_err(|e| platform_error("alarms.create", e))
    }

    async fn arm_periodic(&self, name: &str, period_minutes: f64) -> PlatformResult<()> {
        alarmCreatePeriodic(name, period_minutes)
            .await
            .map_err(|e| platform_error("alarms.create", e))
    }

    async fn clear(&self, name: &str) -> PlatformResult<bool> {
        let cleared = alarmClear(name)
            .await
            .map_err(|e| platform_error("alarms.clear", e))?;
        Ok(cleared.as_bool().unwrap_or(false))
    }

    async fn is_armed(&self, name: &str) -> PlatformResult<bool> {
        let alarm = alarmGet(name)
            .await
            .map_err(|e| platform_error("alarms.get", e))?;
        Ok(!alarm.is_undefined() && !alarm.is_null())
    }
}

impl RuleEngine for ChromePlatform {
    async fn dynamic_rules(&self) -> PlatformResult<Vec<BlockingRule>> {
        let rules = getDynamicRules()
            .await
            .map_err(|e| platform_error("declarativeNetRequest.getDynamicRules", e))?;
        from_js("declarativeNetRequest.getDynamicRules", rules)
    }

    async fn update_dynamic_rules(
        &self,
        add: Vec<BlockingRule>,
        remove_ids: Vec<u32>,
    ) -> PlatformResult<()> {
        const API: &str = "declarativeNetRequest.updateDynamicRules";
        let add = to_js(API, &add)?;
        let remove_ids = to_js(API, &remove_ids)?;
        updateDynamicRules(add, remove_ids)
            .await
            .map_err(|e| platform_error(API, e))
    }

    async fn set_ruleset_enabled(&self, ruleset_id: &str, enabled: bool) -> PlatformResult<()> {
        updateEnabledRulesets(ruleset_id, enabled)
            .await
            .map_err(|e| platform_error("declarativeNetRequest.updateEnabledRulesets", e))
    }
}

impl Surface for ChromePlatform {
    async fn set_badge(&self, badge: BadgeState) -> PlatformResult<()> {
        setBadge(badge.text(), badge.color().map(str::to_string))
            .await
            .map_err(|e| platform_error("action.setBadgeText", e))
    }

    async fn notify(&self, notification: Notification) -> PlatformResult<()> {
        createNotification(
            &self.notification_icon,
            &notification.title,
            &notification.message,
        )
        .await
        .map_err(|e| platform_error("notifications.create", e))
    }

    /// Popups and page agents that are not listening are skipped by the JS
    /// side, so this only fails when the event cannot be encoded.
    async fn broadcast(&self, event: FocusEvent) -> PlatformResult<()> {
        let message = to_js("runtime.sendMessage", &event)?;
        broadcastMessage(message)
            .await
            .map_err(|e| platform_error("runtime.sendMessage", e))
    }
}

impl Ticker for ChromePlatform {
    fn start_ticker(&self, interval_ms: u32) {
        startTicker(interval_ms, self.on_tick.as_ref().unchecked_ref());
    }

    fn stop_ticker(&self) {
        stopTicker();
    }
}
