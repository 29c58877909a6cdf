//! Page helpers: host extraction, scheme checks, domain exclusion and titles.

use url::Url;

/// Schemes that represent real web pages.
const TRACKED_SCHEMES: &[&str] = &["http", "https"];

/// Title shown when neither a title nor a URL is available.
pub const UNTITLED_PAGE: &str = "Untitled page";

/// Returns the lowercase host name of `raw_url`, or an empty string when the
/// URL does not parse or has no host.
pub fn extract_domain(raw_url: &str) -> String {
    Url::parse(raw_url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_lowercase))
        .unwrap_or_default()
}

/// Returns true when `raw_url` is an absolute `http` or `https` URL.
pub fn is_trackable_url(raw_url: &str) -> bool {
    Url::parse(raw_url).is_ok_and(|parsed| TRACKED_SCHEMES.contains(&parsed.scheme()))
}

/// Returns true when the host of `raw_url` equals, or is a subdomain of, one
/// of the `excluded` entries.
///
/// Entries are compared case-insensitively after trimming; blank entries never
/// match. `example.com` excludes `docs.example.com` but not `notexample.com`.
pub fn is_excluded_domain<S: AsRef<str>>(raw_url: &str, excluded: &[S]) -> bool {
    if raw_url.is_empty() || excluded.is_empty() {
        return false;
    }

    let hostname = extract_domain(raw_url);
    if hostname.is_empty() {
        return false;
    }

    excluded.iter().any(|entry| {
        let normalized = entry.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            return false;
        }
        hostname == normalized
            || hostname
                .strip_suffix(normalized.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Picks a human-readable title: the trimmed title if non-blank, otherwise the
/// URL, otherwise [`UNTITLED_PAGE`].
pub fn readable_title(title: Option<&str>, fallback_url: Option<&str>) -> String {
    let trimmed = title.map(str::trim).unwrap_or_default();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    match fallback_url {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => UNTITLED_PAGE.to_string(),
    }
}

/// Normalizes a list of domains: trims, lowercases, drops blanks and removes
/// duplicates while keeping first-seen order.
pub fn normalize_domains<I, S>(domains: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for domain in domains {
        let domain = domain.as_ref().trim().to_lowercase();
        if !domain.is_empty() && !normalized.contains(&domain) {
            normalized.push(domain);
        }
    }
    normalized
}
