//! URL and domain normalization used for citation matching and page keys.
//!
//! A normalized URL is `host` or `host/path`: lower-cased, no scheme, no
//! leading `www.`, no port, query, fragment or trailing slash.

use url::Url;

pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with("mailto:") || lower.starts_with("tel:") {
        return None;
    }
    // A bare path has no host to normalize.
    if is_bare_path(&lower) {
        return None;
    }

    let with_scheme = if lower.contains("://") {
        lower
    } else if let Some(rest) = lower.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{lower}")
    };

    let parsed = Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        return None;
    }

    let path = parsed.path().trim_end_matches('/');
    Some(format!("{host}{path}"))
}

/// `/pricing` style input: a path with no host. `//host/...` is not a path.
pub fn is_bare_path(raw: &str) -> bool {
    let t = raw.trim();
    t.starts_with('/') && !t.starts_with("//")
}

pub fn normalize_domain(raw: &str) -> Option<String> {
    let normalized = normalize_url(raw)?;
    let host = normalized.split('/').next().unwrap_or_default();
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Path component only: starts with `/`, no trailing slash except the root.
/// Accepts full URLs, schemeless URLs and bare paths.
pub fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim();
    let path = if is_bare_path(trimmed) {
        trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_lowercase()
    } else {
        normalize_url(trimmed)
            .and_then(|n| n.find('/').map(|i| n[i..].to_string()))
            .unwrap_or_default()
    };

    let path = path.trim_end_matches('/');
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

pub fn same_page(a: &str, b: &str) -> bool {
    match (normalize_url(a), normalize_url(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// True when `candidate` is the target domain or one of its subdomains.
pub fn domain_matches(candidate: &str, target: &str) -> bool {
    let (Some(candidate), Some(target)) = (normalize_domain(candidate), normalize_domain(target))
    else {
        return false;
    };
    candidate == target || candidate.ends_with(&format!(".{target}"))
}
