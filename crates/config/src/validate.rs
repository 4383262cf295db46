//! Cross-field checks that the `validator` derive cannot express.

use crate::{ConfigError, ProviderCredentials, RenewalConfig};
use certrenew_common::{base_domain, is_wildcard, missing_wildcard_bases};
use std::collections::BTreeMap;
use tracing::warn;

/// Names of required fields that are empty
pub fn missing_fields(config: &RenewalConfig) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if config.email.trim().is_empty() {
        missing.push("email");
    }
    if config.domains.is_empty() {
        missing.push("domains");
    }
    if config.active_provider.trim().is_empty() {
        missing.push("active_provider");
    }
    if config.ca_directory_url.trim().is_empty() {
        missing.push("ca_directory_url");
    }
    if config.account_private_key.trim().is_empty() {
        missing.push("account_private_key");
    }
    if config.providers.is_empty() {
        missing.push("providers");
    }
    missing
}

/// Reject malformed or duplicate names and wildcards whose base is absent
pub fn check_domains(domains: &[String]) -> Result<(), ConfigError> {
    for (i, domain) in domains.iter().enumerate() {
        if !is_valid_domain(domain) {
            return Err(ConfigError::InvalidDomain(domain.clone()));
        }
        if domains[..i].iter().any(|d| d.eq_ignore_ascii_case(domain)) {
            return Err(ConfigError::DuplicateDomain(domain.clone()));
        }
    }

    if let Some(base) = missing_wildcard_bases(domains).into_iter().next() {
        return Err(ConfigError::WildcardWithoutBase {
            wildcard: format!("*.{}", base),
            base,
        });
    }

    Ok(())
}

/// Every configured provider needs a token
pub fn check_providers(providers: &BTreeMap<String, ProviderCredentials>) -> Result<(), ConfigError> {
    for (name, creds) in providers {
        if creds.api_token.trim().is_empty() {
            return Err(ConfigError::EmptyProviderToken(name.clone()));
        }
    }
    Ok(())
}

/// ACME requires TLS to the directory. Plain http is accepted for loopback
/// test servers only.
pub fn check_directory_url(raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|_| ConfigError::InsecureDirectoryUrl(raw.to_string()))?;
    match parsed.scheme() {
        "https" => Ok(()),
        "http" if is_loopback(&parsed) => {
            warn!(url = %raw, "Using plain http CA directory on loopback");
            Ok(())
        }
        _ => Err(ConfigError::InsecureDirectoryUrl(raw.to_string())),
    }
}

fn is_loopback(url: &url::Url) -> bool {
    matches!(
        url.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    )
}

fn is_valid_domain(domain: &str) -> bool {
    if is_wildcard(base_domain(domain)) {
        // "*.*.example.com"
        return false;
    }
    let name = base_domain(domain);
    if name.is_empty() || name.len() > 253 || !name.contains('.') {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn domains(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_domain_shapes() {
        assert!(is_valid_domain("example.com"));
        assert!(is_valid_domain("*.example.com"));
        assert!(is_valid_domain("a-b.example.co.uk"));
        assert!(!is_valid_domain("localhost"));
        assert!(!is_valid_domain("*.*.example.com"));
        assert!(!is_valid_domain("-bad.example.com"));
        assert!(!is_valid_domain("exa mple.com"));
        assert!(!is_valid_domain("example..com"));
    }

    #[test]
    fn test_duplicate_domains_rejected() {
        let err = check_domains(&domains(&["example.com", "EXAMPLE.com"])).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDomain(_)));
    }

    #[test]
    fn test_wildcard_base_required() {
        assert!(check_domains(&domains(&["example.com", "*.example.com"])).is_ok());
        let err = check_domains(&domains(&["*.example.com"])).unwrap_err();
        match err {
            ConfigError::WildcardWithoutBase { wildcard, base } => {
                assert_eq!(wildcard, "*.example.com");
                assert_eq!(base, "example.com");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_token_rejected() {
        let mut providers = BTreeMap::new();
        providers.insert("cloudflare".to_string(), ProviderCredentials::new("  "));
        assert!(matches!(
            check_providers(&providers),
            Err(ConfigError::EmptyProviderToken(name)) if name == "cloudflare"
        ));
    }

    #[test]
    fn test_directory_url_scheme() {
        assert!(check_directory_url("https://acme-v02.api.letsencrypt.org/directory").is_ok());
        assert!(check_directory_url("http://localhost:14000/dir").is_ok());
        assert!(check_directory_url("http://ca.example.com/directory").is_err());
        assert!(check_directory_url("not a url").is_err());
    }

    proptest! {
        #[test]
        fn generated_hostnames_are_valid(labels in proptest::collection::vec("[a-z0-9]{1,20}", 2..5)) {
            let name = labels.join(".");
            prop_assert!(is_valid_domain(&name));
            let wildcard = format!("*.{}", name);
            prop_assert!(is_valid_domain(&wildcard));
        }
    }
}
