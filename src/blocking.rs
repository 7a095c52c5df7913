//! Blocking rule synchronizer.
//!
//! Keeps the browser's dynamic redirect rules in step with the blocked-site
//! list and with whether a focus session is active. The rule set is always
//! derived: `enable` rebuilds it from the site list and `disable` removes
//! whatever is live, never trusting a local copy.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::domain::url_filters;
use crate::error::{FocusError, Result};
use crate::platform::{KeyValueStore, RuleEngine};
use crate::sites::BlockedSites;
use crate::storage::{self, keys};

/// Sites covered by the packaged `focus_mode_rules` ruleset.
pub const STATIC_BASELINE_SITES: [&str; 10] = [
    "youtube.com",
    "facebook.com",
    "twitter.com",
    "instagram.com",
    "reddit.com",
    "netflix.com",
    "tiktok.com",
    "twitch.tv",
    "discord.com",
    "whatsapp.com",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub extension_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default)]
    pub url_filter: Option<String>,
    #[serde(default)]
    pub resource_types: Vec<String>,
}

impl BlockingRule {
    /// Main-frame redirect to the extension's blocked page.
    pub fn redirect(id: u32, url_filter: String, extension_path: &str) -> BlockingRule {
        BlockingRule {
            id,
            priority: 1,
            action: RuleAction {
                kind: "redirect".to_string(),
                redirect: Some(Redirect {
                    extension_path: extension_path.to_string(),
                }),
            },
            condition: RuleCondition {
                url_filter: Some(url_filter),
                resource_types: vec!["main_frame".to_string()],
            },
        }
    }

    pub fn url_filter(&self) -> Option<&str> {
        self.condition.url_filter.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingConfig {
    pub static_ruleset_id: String,
    pub static_sites: Vec<String>,
    /// IDs used by the packaged ruleset.
    pub static_rule_ids: RangeInclusive<u32>,
    /// IDs reserved for rules generated at runtime.
    pub dynamic_rule_ids: RangeInclusive<u32>,
    pub redirect_path: String,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        BlockingConfig {
            static_ruleset_id: "focus_mode_rules".to_string(),
            static_sites: STATIC_BASELINE_SITES.iter().map(|s| s.to_string()).collect(),
            static_rule_ids: 1..=999,
            dynamic_rule_ids: 1000..=4999,
            redirect_path: "/blocked.html".to_string(),
        }
    }
}

impl BlockingConfig {
    /// The dynamic namespace must be non-empty and sit entirely outside the
    /// static one.
    pub fn validate(&self) -> Result<()> {
        let (dyn_start, dyn_end) = (*self.dynamic_rule_ids.start(), *self.dynamic_rule_ids.end());
        let (static_start, static_end) = (*self.static_rule_ids.start(), *self.static_rule_ids.end());
        let overlaps = dyn_start <= static_end && static_start <= dyn_end;

        if self.dynamic_rule_ids.is_empty() || (!self.static_rule_ids.is_empty() && overlaps) {
            return Err(FocusError::RuleIdCollision {
                static_end,
                dynamic_start: dyn_start,
                dynamic_end: dyn_end,
            });
        }
        Ok(())
    }

    pub fn is_static_site(&self, site: &str) -> bool {
        self.static_sites.iter().any(|s| s == site)
    }

    fn is_dynamic_id(&self, id: u32) -> bool {
        self.dynamic_rule_ids.contains(&id)
    }
}

pub struct RuleSynchronizer {
    config: BlockingConfig,
}

impl RuleSynchronizer {
    pub fn new(config: BlockingConfig) -> Result<Self> {
        config.validate()?;
        Ok(RuleSynchronizer { config })
    }

    pub fn config(&self) -> &BlockingConfig {
        &self.config
    }

    /// Rules for every site not covered by the static ruleset, IDs assigned
    /// sequentially from the start of the dynamic namespace.
    pub fn build_rules(&self, sites: &BlockedSites) -> Result<Vec<BlockingRule>> {
        let filters: Vec<String> = sites
            .iter()
            .filter(|site| !self.config.is_static_site(site))
            .flat_map(url_filters)
            .collect();

        let available = self.config.dynamic_rule_ids.clone().count();
        if filters.len() > available {
            return Err(FocusError::RuleIdsExhausted {
                needed: filters.len(),
                available,
            });
        }

        Ok(self
            .config
            .dynamic_rule_ids
            .clone()
            .zip(filters)
            .map(|(id, filter)| BlockingRule::redirect(id, filter, &self.config.redirect_path))
            .collect())
    }

    /// Turns blocking on and rebuilds the dynamic rules from scratch.
    /// Returns the number of dynamic rules installed.
    ///
    /// The `focusModeActive` flag is written even when the rule update
    /// fails so page agents keep enforcing.
    pub async fn enable<P>(&self, platform: &P, sites: &BlockedSites) -> Result<usize>
    where
        P: RuleEngine + KeyValueStore,
    {
        let rules = self.install(platform, sites).await;
        storage::save(platform, keys::FOCUS_MODE_ACTIVE, &true).await?;
        let installed = rules?;
        info!("Site blocking enabled with {installed} dynamic rules");
        Ok(installed)
    }

    async fn install<P>(&self, platform: &P, sites: &BlockedSites) -> Result<usize>
    where
        P: RuleEngine,
    {
        let rules = self.build_rules(sites)?;
        let installed = rules.len();

        platform
            .set_ruleset_enabled(&self.config.static_ruleset_id, true)
            .await
            .map_err(FocusError::Rules)?;

        let stale: Vec<u32> = platform
            .dynamic_rules()
            .await
            .map_err(FocusError::Rules)?
            .iter()
            .map(|rule| rule.id)
            .collect();

        platform
            .update_dynamic_rules(rules, stale)
            .await
            .map_err(FocusError::Rules)?;
        Ok(installed)
    }

    /// Removes every live dynamic rule and turns the static ruleset off.
    pub async fn disable<P>(&self, platform: &P) -> Result<usize>
    where
        P: RuleEngine + KeyValueStore,
    {
        let removed = self.uninstall(platform).await;
        storage::save(platform, keys::FOCUS_MODE_ACTIVE, &false).await?;
        let removed = removed?;
        info!("Site blocking disabled, removed {removed} dynamic rules");
        Ok(removed)
    }

    async fn uninstall<P>(&self, platform: &P) -> Result<usize>
    where
        P: RuleEngine,
    {
        platform
            .set_ruleset_enabled(&self.config.static_ruleset_id, false)
            .await
            .map_err(FocusError::Rules)?;

        let live: Vec<u32> = platform
            .dynamic_rules()
            .await
            .map_err(FocusError::Rules)?
            .iter()
            .map(|rule| rule.id)
            .collect();

        let removed = live.len();
        if removed > 0 {
            platform
                .update_dynamic_rules(Vec::new(), live)
                .await
                .map_err(FocusError::Rules)?;
        }
        Ok(removed)
    }

    /// Whether blocking is currently switched on, per the persisted flag.
    pub async fn is_active<S>(&self, store: &S) -> Result<bool>
    where
        S: KeyValueStore,
    {
        Ok(storage::load(store, keys::FOCUS_MODE_ACTIVE)
            .await?
            .unwrap_or(false))
    }

    /// Installs the two rules for one newly blocked site, using the lowest
    /// free IDs in the dynamic namespace. Static baseline sites get their own
    /// dynamic rules too, so removing them later lifts the block they add.
    pub async fn add_site_rules<P>(&self, platform: &P, site: &str) -> Result<Vec<u32>>
    where
        P: RuleEngine,
    {
        let live = platform.dynamic_rules().await.map_err(FocusError::Rules)?;
        let filters = url_filters(site);

        // Already installed (e.g. a repeated add); nothing to do.
        if filters
            .iter()
            .all(|filter| live.iter().any(|rule| rule.url_filter() == Some(filter.as_str())))
        {
            return Ok(Vec::new());
        }

        let used: BTreeSet<u32> = live.iter().map(|rule| rule.id).collect();
        let free: Vec<u32> = self
            .config
            .dynamic_rule_ids
            .clone()
            .filter(|id| !used.contains(id))
            .take(filters.len())
            .collect();
        if free.len() < filters.len() {
            return Err(FocusError::RuleIdsExhausted {
                needed: filters.len(),
                available: free.len(),
            });
        }

        let rules: Vec<BlockingRule> = free
            .iter()
            .zip(filters)
            .map(|(&id, filter)| BlockingRule::redirect(id, filter, &self.config.redirect_path))
            .collect();

        platform
            .update_dynamic_rules(rules, Vec::new())
            .await
            .map_err(FocusError::Rules)?;
        debug!("Added dynamic rules {free:?} for {site}");
        Ok(free)
    }

    /// Removes exactly the live rules whose filter is one of the site's two
    /// patterns.
    pub async fn remove_site_rules<P>(&self, platform: &P, site: &str) -> Result<Vec<u32>>
    where
        P: RuleEngine,
    {
        let filters = url_filters(site);
        let doomed: Vec<u32> = platform
            .dynamic_rules()
            .await
            .map_err(FocusError::Rules)?
            .iter()
            .filter(|rule| self.config.is_dynamic_id(rule.id))
            .filter(|rule| {
                rule.url_filter()
                    .is_some_and(|filter| filters.iter().any(|f| f == filter))
            })
            .map(|rule| rule.id)
            .collect();

        if !doomed.is_empty() {
            platform
                .update_dynamic_rules(Vec::new(), doomed.clone())
                .await
                .map_err(FocusError::Rules)?;
            debug!("Removed dynamic rules {doomed:?} for {site}");
        }
        Ok(doomed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryPlatform;

    fn synchronizer() -> RuleSynchronizer {
        RuleSynchronizer::new(BlockingConfig::default()).unwrap()
    }

    fn sites(list: &[&str]) -> BlockedSites {
        list.iter().copied().collect()
    }

    fn filters_of(platform: &MemoryPlatform) -> Vec<String> {
        platform
            .rules()
            .iter()
            .filter_map(|rule| rule.url_filter().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let config = BlockingConfig {
            dynamic_rule_ids: 500..=4999,
            ..BlockingConfig::default()
        };
        assert!(matches!(
            RuleSynchronizer::new(config),
            Err(FocusError::RuleIdCollision { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_dynamic_range() {
        #[allow(clippy::reversed_empty_ranges)]
        let config = BlockingConfig {
            dynamic_rule_ids: 5000..=4999,
            ..BlockingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_adjacent_ranges() {
        let config = BlockingConfig {
            static_rule_ids: 1..=999,
            dynamic_rule_ids: 1000..=1001,
            ..BlockingConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_rules_skips_static_sites() {
        let rules = synchronizer()
            .build_rules(&sites(&["youtube.com", "news.ycombinator.com", "telegram.org"]))
            .unwrap();

        let ids: Vec<u32> = rules.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1000, 1001, 1002, 1003]);
        assert_eq!(rules[0].url_filter(), Some("*://*.news.ycombinator.com/*"));
        assert_eq!(rules[1].url_filter(), Some("*://news.ycombinator.com/*"));
        assert_eq!(rules[2].url_filter(), Some("*://*.telegram.org/*"));
    }

    #[test]
    fn test_build_rules_exhausted_namespace() {
        let config = BlockingConfig {
            dynamic_rule_ids: 1000..=1002,
            ..BlockingConfig::default()
        };
        let synchronizer = RuleSynchronizer::new(config).unwrap();

        let result = synchronizer.build_rules(&sites(&["a.org", "b.org"]));
        assert!(matches!(
            result,
            Err(FocusError::RuleIdsExhausted { needed: 4, available: 3 })
        ));
    }

    #[test]
    fn test_rule_wire_shape() {
        let rule = BlockingRule::redirect(1000, "*://*.a.org/*".to_string(), "/blocked.html");
        let json = serde_json::to_value(&rule).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "id": 1000,
                "priority": 1,
                "action": {"type": "redirect", "redirect": {"extensionPath": "/blocked.html"}},
                "condition": {"urlFilter": "*://*.a.org/*", "resourceTypes": ["main_frame"]}
            })
        );
    }

    #[tokio::test]
    async fn test_enable_installs_rules_and_flag() {
        let platform = MemoryPlatform::new(0);
        let installed = synchronizer()
            .enable(&platform, &sites(&["a.org", "youtube.com"]))
            .await
            .unwrap();

        assert_eq!(installed, 2);
        assert!(platform.ruleset_enabled("focus_mode_rules"));
        assert_eq!(filters_of(&platform), vec!["*://*.a.org/*", "*://a.org/*"]);
        assert!(synchronizer().is_active(&platform).await.unwrap());
    }

    #[tokio::test]
    async fn test_enable_twice_is_idempotent() {
        let platform = MemoryPlatform::new(0);
        let sync = synchronizer();
        let list = sites(&["a.org", "b.org"]);

        sync.enable(&platform, &list).await.unwrap();
        let once = platform.rules();
        sync.enable(&platform, &list).await.unwrap();

        assert_eq!(platform.rules(), once);
        assert_eq!(once.len(), 4);
    }

    #[tokio::test]
    async fn test_enable_discards_foreign_dynamic_rules() {
        let platform = MemoryPlatform::new(0);
        platform.install_rule(BlockingRule::redirect(
            1_698_000_000,
            "*://leftover.org/*".to_string(),
            "/blocked.html",
        ));

        synchronizer().enable(&platform, &sites(&["a.org"])).await.unwrap();

        assert_eq!(filters_of(&platform), vec!["*://*.a.org/*", "*://a.org/*"]);
    }

    #[tokio::test]
    async fn test_disable_removes_live_rules_and_clears_flag() {
        let platform = MemoryPlatform::new(0);
        let sync = synchronizer();
        sync.enable(&platform, &sites(&["a.org"])).await.unwrap();
        platform.install_rule(BlockingRule::redirect(4242, "*://other.org/*".to_string(), "/blocked.html"));

        let removed = sync.disable(&platform).await.unwrap();

        assert_eq!(removed, 3);
        assert!(platform.rules().is_empty());
        assert!(!platform.ruleset_enabled("focus_mode_rules"));
        assert!(!sync.is_active(&platform).await.unwrap());
    }

    #[tokio::test]
    async fn test_rule_failure_still_sets_flag() {
        let platform = MemoryPlatform::new(0);
        platform.fail_rules(true);

        let result = synchronizer().enable(&platform, &sites(&["a.org"])).await;

        assert!(matches!(result, Err(FocusError::Rules(_))));
        assert!(synchronizer().is_active(&platform).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_and_remove_site_rules() {
        let platform = MemoryPlatform::new(0);
        let sync = synchronizer();
        sync.enable(&platform, &sites(&["a.org"])).await.unwrap();

        let added = sync.add_site_rules(&platform, "example.net").await.unwrap();
        assert_eq!(added, vec![1002, 1003]);
        assert_eq!(platform.rules().len(), 4);

        let removed = sync.remove_site_rules(&platform, "example.net").await.unwrap();
        assert_eq!(removed, vec![1002, 1003]);
        assert_eq!(filters_of(&platform), vec!["*://*.a.org/*", "*://a.org/*"]);
    }

    #[tokio::test]
    async fn test_add_reuses_lowest_free_ids() {
        let platform = MemoryPlatform::new(0);
        let sync = synchronizer();
        sync.enable(&platform, &sites(&["a.org", "b.org"])).await.unwrap();
        sync.remove_site_rules(&platform, "a.org").await.unwrap();

        let added = sync.add_site_rules(&platform, "c.org").await.unwrap();
        assert_eq!(added, vec![1000, 1001]);
    }

    #[tokio::test]
    async fn test_add_site_rules_skips_duplicates() {
        let platform = MemoryPlatform::new(0);
        let sync = synchronizer();

        sync.add_site_rules(&platform, "a.org").await.unwrap();
        assert!(sync.add_site_rules(&platform, "a.org").await.unwrap().is_empty());
        assert_eq!(platform.rules().len(), 2);
    }

    #[tokio::test]
    async fn test_add_site_rules_for_static_site() {
        let platform = MemoryPlatform::new(0);
        let sync = synchronizer();

        let added = sync.add_site_rules(&platform, "reddit.com").await.unwrap();

        assert_eq!(added, vec![1000, 1001]);
        assert_eq!(filters_of(&platform), vec!["*://*.reddit.com/*", "*://reddit.com/*"]);

        let removed = sync.remove_site_rules(&platform, "reddit.com").await.unwrap();
        assert_eq!(removed, vec![1000, 1001]);
        assert!(platform.rules().is_empty());
    }

    #[tokio::test]
    async fn test_remove_site_rules_does_not_touch_superstrings() {
        let platform = MemoryPlatform::new(0);
        let sync = synchronizer();
        sync.enable(&platform, &sites(&["tube.org", "youtube.org"])).await.unwrap();

        let removed = sync.remove_site_rules(&platform, "tube.org").await.unwrap();

        assert_eq!(removed.len(), 2);
        assert_eq!(filters_of(&platform), vec!["*://*.youtube.org/*", "*://youtube.org/*"]);
    }
}
