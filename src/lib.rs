/// Smart Tab Manager - focus mode background worker
/// Built with Rust + WASM

mod blocking;
mod chrome;
mod config;
mod domain;
mod enforcement;
mod error;
mod host;
mod messages;
mod platform;
mod session;
mod settings;
mod sites;
mod storage;
#[cfg(test)]
mod testing;

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, error};
use tokio::sync::Mutex;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

pub use blocking::{BlockingConfig, BlockingRule, RuleSynchronizer};
pub use chrome::ChromePlatform;
pub use config::HostConfig;
pub use domain::{extract_hostname, matches_blocked_site, normalize_site};
pub use enforcement::{SiteVerdict, evaluate};
pub use error::{FocusError, PlatformError, Result};
pub use host::FocusHost;
pub use messages::{Request, Response};
pub use platform::{
    AlarmScheduler, BadgeState, Clock, FocusEvent, KeyValueStore, Notification, Platform,
    PlatformResult, RuleEngine, Surface, Ticker,
};
pub use session::{EndReason, FocusSession, Recovered, SessionOutcome};
pub use settings::UserSettings;
pub use sites::{BlockedSites, DEFAULT_BLOCKED_SITES};
pub use storage::{Activity, ActivityLog, PerformanceStats};

type SharedHost = Rc<Mutex<FocusHost<ChromePlatform>>>;

thread_local! {
    // One host per worker. Handlers queue on the lock, so a transition never
    // interleaves with another at an await point.
    static HOST: RefCell<Option<SharedHost>> = const { RefCell::new(None) };
}

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

fn shared_host() -> std::result::Result<SharedHost, JsValue> {
    if let Some(host) = HOST.with(|cell| cell.borrow().clone()) {
        return Ok(host);
    }

    let config = HostConfig::default();
    let on_tick = Closure::<dyn FnMut()>::new(|| spawn_local(tick()));
    let platform = ChromePlatform::new(config.notification_icon.clone(), on_tick);
    let host = FocusHost::new(platform, config).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let host = Rc::new(Mutex::new(host));
    HOST.with(|cell| *cell.borrow_mut() = Some(host.clone()));
    Ok(host)
}

async fn tick() {
    match shared_host() {
        Ok(host) => host.lock().await.tick().await,
        Err(e) => error!("Tick without a host: {e:?}"),
    }
}

/// Restores any session left by a previous worker. Call once per wake.
#[wasm_bindgen]
pub async fn handle_startup() -> std::result::Result<(), JsValue> {
    let host = shared_host()?;
    host.lock().await.ensure_recovered().await;
    Ok(())
}

/// Handles one `{action, ...}` message and returns its response value.
#[wasm_bindgen]
pub async fn handle_message(message: JsValue) -> std::result::Result<JsValue, JsValue> {
    let request: Request = serde_wasm_bindgen::from_value(message).map_err(|e| {
        error!("Rejected message: {e}");
        JsValue::from_str(&format!("Invalid message: {e}"))
    })?;
    debug!("Handling {request:?}");

    let host = shared_host()?;
    let mut host = host.lock().await;
    host.ensure_recovered().await;
    let response = host.handle(request).await;

    serde::Serialize::serialize(&response, &serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
pub async fn handle_alarm(name: String) -> std::result::Result<(), JsValue> {
    let host = shared_host()?;
    let mut host = host.lock().await;
    host.ensure_recovered().await;
    host.on_alarm(&name).await;
    Ok(())
}

/// Blocked-list form of a URL or domain, for the popup's "block this site".
#[wasm_bindgen]
pub fn extract_site(url: &str) -> Option<String> {
    normalize_site(url)
}
