//! Hostname extraction, site normalization and block matching.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static SITE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)+$")
        .expect("site pattern is a valid regex")
});

/// Extract the lowercase hostname from a URL
///
/// Scheme-less input such as `"news.example.com/article"` or
/// `"example.org:8080"` is split by hand, since `Url` would read the
/// hostname as a scheme.
pub fn extract_hostname(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.contains("://") {
        if let Ok(parsed) = Url::parse(trimmed) {
            return parsed
                .host_str()
                .filter(|host| !host.is_empty())
                .map(|host| host.to_lowercase());
        }
    }

    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let host_with_port = without_scheme.split(['/', '?', '#']).next()?;
    let host = host_with_port.split(':').next()?.to_lowercase();

    if host.is_empty() { None } else { Some(host) }
}

/// Normalize user input (a bare domain or a full page URL) into the form
/// stored in the blocked-site list: lowercase hostname, no leading `www.`.
///
/// Examples:
/// - `"https://www.YouTube.com/watch?v=1"` → `youtube.com`
/// - `"news.ycombinator.com"` → `news.ycombinator.com`
/// - `"localhost"` → rejected (needs at least one dot)
pub fn normalize_site(input: &str) -> Option<String> {
    let host = extract_hostname(input)?;
    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);

    if SITE_PATTERN.is_match(host) {
        Some(host.to_string())
    } else {
        None
    }
}

/// Page-level block matching: the hostname contains the site string or the
/// site string contains the hostname.
///
/// This is deliberately loose and produces false positives such as
/// `"a.com"` matching `"cba.com"`. Kept as is until the product decides on
/// stricter suffix matching.
pub fn matches_blocked_site(hostname: &str, site: &str) -> bool {
    if hostname.is_empty() || site.is_empty() {
        return false;
    }
    hostname.contains(site) || site.contains(hostname)
}

/// The two URL filters that block a domain and all of its subdomains.
pub fn url_filters(site: &str) -> [String; 2] {
    [format!("*://*.{site}/*"), format!("*://{site}/*")]
}
