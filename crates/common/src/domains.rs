//! Domain-name helpers shared by configuration validation and DNS-01 solving.

/// Returns `true` for wildcard entries such as `*.example.com`
pub fn is_wildcard(domain: &str) -> bool {
    domain.starts_with("*.")
}

/// Strip a leading wildcard label.
///
/// `*.example.com` becomes `example.com`; other names are returned unchanged.
pub fn base_domain(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// The first domain of an ordered domain set, which names the certificate
pub fn primary_domain(domains: &[String]) -> Option<&str> {
    domains.first().map(String::as_str)
}

/// Base domains required by wildcard entries but absent from the set.
///
/// A wildcard certificate for `*.example.com` does not cover `example.com`
/// itself, so the base name must be requested explicitly.
pub fn missing_wildcard_bases(domains: &[String]) -> Vec<String> {
    let mut missing = Vec::new();
    for domain in domains.iter().filter(|d| is_wildcard(d)) {
        let base = base_domain(domain);
        let listed = domains.iter().any(|d| d.eq_ignore_ascii_case(base));
        if !listed && !missing.iter().any(|m: &String| m == base) {
            missing.push(base.to_string());
        }
    }
    missing
}
