//! DNS provider interface
//!
//! A provider publishes and removes the TXT records that answer DNS-01
//! challenges. Providers work with fully qualified record names
//! (`_acme-challenge.example.com`) and find the owning zone themselves.

use std::fmt::Debug;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use certrenew_common::base_domain;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub type DnsResult<T> = Result<T, DnsProviderError>;

/// DNS provider failures
#[derive(Debug, Error)]
pub enum DnsProviderError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("no zone found for '{domain}'")]
    ZoneNotFound { domain: String },

    #[error("failed to create TXT record '{record_name}': {message}")]
    RecordCreation { record_name: String, message: String },

    #[error("failed to delete TXT record '{record_id}': {message}")]
    RecordDeletion { record_id: String, message: String },

    #[error("API request failed: {0}")]
    ApiRequest(String),

    #[error("rate limited by DNS provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("request timed out")]
    Timeout,

    #[error("invalid provider configuration: {0}")]
    Configuration(String),
}

impl DnsProviderError {
    /// Map a transport failure from the HTTP client
    pub(crate) fn from_request(context: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DnsProviderError::Timeout
        } else {
            DnsProviderError::ApiRequest(format!("{}: {}", context, e))
        }
    }
}

/// Publishes DNS-01 TXT records for one DNS hosting service
#[async_trait]
pub trait DnsProvider: Send + Sync + Debug {
    /// Provider name as used in configuration (e.g., "cloudflare")
    fn name(&self) -> &'static str;

    /// Create a TXT record and return its provider-side id.
    ///
    /// Several values may be published under the same name at once, as
    /// happens when `example.com` and `*.example.com` are validated together.
    async fn create_txt_record(&self, fqdn: &str, value: &str) -> DnsResult<String>;

    /// Delete a TXT record created by [`DnsProvider::create_txt_record`].
    ///
    /// Deleting a record that no longer exists succeeds.
    async fn delete_txt_record(&self, fqdn: &str, record_id: &str) -> DnsResult<()>;
}

/// Label prefixed to the validated name
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// TTL for challenge records
pub const CHALLENGE_TTL: u32 = 120;

/// Name of the TXT record that answers the challenge for `domain`.
///
/// Wildcards are validated on their base name, so `*.example.com` and
/// `example.com` share `_acme-challenge.example.com`.
pub fn challenge_record_fqdn(domain: &str) -> String {
    format!(
        "{}.{}",
        ACME_CHALLENGE_LABEL,
        base_domain(domain).trim_end_matches('.')
    )
}

/// TXT record value: base64url(SHA-256(key authorization)) without padding
pub fn challenge_value(key_authorization: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key_authorization.as_bytes()))
}

/// Candidate zone names for a record, most specific first.
///
/// `_acme-challenge.www.example.com` yields `www.example.com` then
/// `example.com`. Single-label names are never candidates.
pub fn zone_candidates(fqdn: &str) -> Vec<&str> {
    let fqdn = fqdn.trim_end_matches('.');
    let name = fqdn
        .strip_prefix(ACME_CHALLENGE_LABEL)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(fqdn);

    let mut candidates = Vec::new();
    let mut current = name;
    while current.contains('.') {
        candidates.push(current);
        match current.find('.') {
            Some(pos) => current = &current[pos + 1..],
            None => break,
        }
    }
    candidates
}

/// Record name relative to its zone (`@` for the apex)
pub fn relative_record_name(fqdn: &str, zone: &str) -> String {
    let fqdn = fqdn.trim_end_matches('.');
    if fqdn == zone {
        "@".to_string()
    } else if let Some(stripped) = fqdn.strip_suffix(&format!(".{}", zone)) {
        stripped.to_string()
    } else {
        fqdn.to_string()
    }
}

/// Reject tokens that cannot be sent as an HTTP header value
pub(crate) fn check_token(provider: &str, token: &str) -> DnsResult<()> {
    if token.trim().is_empty() {
        return Err(DnsProviderError::Configuration(format!(
            "{} API token is empty",
            provider
        )));
    }
    if !token.chars().all(|c| c.is_ascii_graphic()) {
        return Err(DnsProviderError::Configuration(format!(
            "{} API token contains whitespace or non-ASCII characters",
            provider
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_challenge_record_fqdn() {
        assert_eq!(challenge_record_fqdn("example.com"), "_acme-challenge.example.com");
        assert_eq!(challenge_record_fqdn("*.example.com"), "_acme-challenge.example.com");
        assert_eq!(
            challenge_record_fqdn("www.example.com."),
            "_acme-challenge.www.example.com"
        );
    }

    #[test]
    fn test_challenge_value() {
        // RFC 8555 section 8.4: base64url(SHA-256(key authorization))
        let value = challenge_value("token.thumbprint");
        assert_eq!(value.len(), 43);
        assert!(!value.contains('='));
        assert!(!value.contains('+'));
        assert_eq!(value, challenge_value("token.thumbprint"));
        assert_ne!(value, challenge_value("token.other"));
    }

    #[test]
    fn test_zone_candidates() {
        assert_eq!(
            zone_candidates("_acme-challenge.www.example.co.uk"),
            vec!["www.example.co.uk", "example.co.uk", "co.uk"]
        );
        assert_eq!(zone_candidates("_acme-challenge.example.com."), vec!["example.com"]);
    }

    #[test]
    fn test_relative_record_name() {
        assert_eq!(
            relative_record_name("_acme-challenge.www.example.com", "example.com"),
            "_acme-challenge.www"
        );
        assert_eq!(relative_record_name("example.com", "example.com"), "@");
        assert_eq!(relative_record_name("other.org", "example.com"), "other.org");
    }

    #[test]
    fn test_check_token() {
        assert!(check_token("cloudflare", "abc-123_XYZ").is_ok());
        assert!(check_token("cloudflare", "").is_err());
        assert!(check_token("cloudflare", "abc 123").is_err());
        assert!(check_token("cloudflare", "tok\n").is_err());
    }

    /// Provider keeping records in memory
    #[derive(Debug, Default)]
    pub(crate) struct MockDnsProvider {
        /// record id -> (fqdn, value)
        pub records: Mutex<HashMap<String, (String, String)>>,
        pub counter: AtomicU64,
        pub fail_on_create: bool,
        pub fail_on_delete: bool,
    }

    impl MockDnsProvider {
        pub fn values_for(&self, fqdn: &str) -> Vec<String> {
            self.records
                .lock()
                .values()
                .filter(|(name, _)| name == fqdn)
                .map(|(_, value)| value.clone())
                .collect()
        }

        pub fn record_count(&self) -> usize {
            self.records.lock().len()
        }
    }

    #[async_trait]
    impl DnsProvider for MockDnsProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn create_txt_record(&self, fqdn: &str, value: &str) -> DnsResult<String> {
            if self.fail_on_create {
                return Err(DnsProviderError::RecordCreation {
                    record_name: fqdn.to_string(),
                    message: "mock failure".to_string(),
                });
            }
            let id = format!("record-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
            self.records
                .lock()
                .insert(id.clone(), (fqdn.to_string(), value.to_string()));
            Ok(id)
        }

        async fn delete_txt_record(&self, _fqdn: &str, record_id: &str) -> DnsResult<()> {
            if self.fail_on_delete {
                return Err(DnsProviderError::RecordDeletion {
                    record_id: record_id.to_string(),
                    message: "mock failure".to_string(),
                });
            }
            self.records.lock().remove(record_id);
            Ok(())
        }
    }
}
