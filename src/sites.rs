//! The blocked-site list, persisted under `blockedSites`.

use serde::{Deserialize, Serialize};

use crate::domain::normalize_site;

/// Seeded on first run when no list has been stored yet.
pub const DEFAULT_BLOCKED_SITES: [&str; 14] = [
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
    "telegram.org",
    "snapchat.com",
    "pinterest.com",
    "linkedin.com",
];

/// Blocked domains in stored order. Entries read back from storage are kept
/// verbatim, since other writers may store raw strings; only `FromIterator`
/// normalizes. Order is kept stable so rule IDs come out the same for the
/// same list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockedSites {
    sites: Vec<String>,
}

impl BlockedSites {
    pub fn new() -> Self {
        BlockedSites { sites: Vec::new() }
    }

    pub fn defaults() -> Self {
        DEFAULT_BLOCKED_SITES.iter().copied().collect()
    }

    /// Adds an already normalized domain. Returns false when present.
    pub fn insert(&mut self, site: String) -> bool {
        if self.contains(&site) {
            return false;
        }
        self.sites.push(site);
        true
    }

    pub fn remove(&mut self, site: &str) -> bool {
        let original_len = self.sites.len();
        self.sites.retain(|s| s != site);
        self.sites.len() < original_len
    }

    pub fn contains(&self, site: &str) -> bool {
        self.sites.iter().any(|s| s == site)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.sites.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.sites.clone()
    }
}

/// Entries that fail normalization are dropped; duplicates collapse.
impl<'a> FromIterator<&'a str> for BlockedSites {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut sites = BlockedSites::new();
        for site in iter.into_iter().filter_map(normalize_site) {
            sites.insert(site);
        }
        sites
    }
}
