//! Configuration for certrenew.
//!
//! A [`RenewalConfig`] describes one certificate request: the ACME account,
//! the domain set, the DNS providers able to answer DNS-01 challenges and the
//! renewal thresholds. It is stored as TOML, either in a file or in the
//! `acme_config` storage scope.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, trace};
use validator::Validate;

mod blueprint;
mod error;
pub mod validate;

pub use blueprint::{blueprint, LETS_ENCRYPT_PRODUCTION, LETS_ENCRYPT_STAGING};
pub use error::ConfigError;

/// Default number of days before expiry at which a certificate is renewed
pub const DEFAULT_RENEW_BEFORE_DAYS: u32 = 30;

/// Default time allowed for a DNS-01 record to become visible
pub const DEFAULT_PROPAGATION_TIMEOUT_SECS: u64 = 600;

/// Default timeout for DNS provider API calls
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Credentials for one DNS provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    /// API token with permission to edit DNS records
    #[serde(default)]
    pub api_token: String,

    /// Zone identifier; looked up from the domain when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
}

impl ProviderCredentials {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            zone_id: None,
        }
    }

    pub fn with_zone_id(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = Some(zone_id.into());
        self
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_token", &"[REDACTED]")
            .field("zone_id", &self.zone_id)
            .finish()
    }
}

/// One certificate renewal request.
///
/// Every request field is required unless `enabled` is false, in which case
/// a run is a successful no-op and the rest of the document is ignored.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct RenewalConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Contact address registered with the CA account
    #[serde(default)]
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,

    /// Ordered domain set; the first entry names the certificate
    #[serde(default)]
    #[validate(length(min = 1, message = "at least one domain is required"))]
    pub domains: Vec<String>,

    /// Name of the provider in `providers` that answers DNS-01 challenges
    #[serde(default)]
    pub active_provider: String,

    /// ACME directory URL. Staging and production hold distinct accounts.
    #[serde(default)]
    #[validate(url(message = "ca_directory_url must be a valid URL"))]
    pub ca_directory_url: String,

    /// PEM-encoded EC P-256 account key
    #[serde(default)]
    pub account_private_key: String,

    #[serde(default = "default_renew_before_days")]
    #[validate(range(min = 1, max = 365))]
    pub renew_before_days: u32,

    #[serde(default = "default_propagation_timeout_secs")]
    #[validate(range(min = 1))]
    pub propagation_timeout_secs: u64,

    #[serde(default = "default_api_timeout_secs")]
    #[validate(range(min = 1))]
    pub api_timeout_secs: u64,

    /// DNS provider credentials keyed by provider name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderCredentials>,
}

fn default_enabled() -> bool {
    true
}

fn default_renew_before_days() -> u32 {
    DEFAULT_RENEW_BEFORE_DAYS
}

fn default_propagation_timeout_secs() -> u64 {
    DEFAULT_PROPAGATION_TIMEOUT_SECS
}

fn default_api_timeout_secs() -> u64 {
    DEFAULT_API_TIMEOUT_SECS
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            email: String::new(),
            domains: Vec::new(),
            active_provider: String::new(),
            ca_directory_url: String::new(),
            account_private_key: String::new(),
            renew_before_days: DEFAULT_RENEW_BEFORE_DAYS,
            propagation_timeout_secs: DEFAULT_PROPAGATION_TIMEOUT_SECS,
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            providers: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for RenewalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenewalConfig")
            .field("enabled", &self.enabled)
            .field("email", &self.email)
            .field("domains", &self.domains)
            .field("active_provider", &self.active_provider)
            .field("ca_directory_url", &self.ca_directory_url)
            .field("account_private_key", &"[REDACTED]")
            .field("renew_before_days", &self.renew_before_days)
            .field("propagation_timeout_secs", &self.propagation_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("providers", &self.providers)
            .finish()
    }
}

impl RenewalConfig {
    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading renewal configuration");

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;

        trace!(
            enabled = config.enabled,
            domains = ?config.domains,
            active_provider = %config.active_provider,
            "Parsed renewal configuration"
        );

        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check required fields, field formats and cross-field rules.
    ///
    /// A disabled configuration always passes. Whether `active_provider`
    /// names a configured provider is checked when the provider is resolved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        let missing = validate::missing_fields(self);
        if !missing.is_empty() {
            return Err(ConfigError::MissingFields(missing.join(", ")));
        }

        Validate::validate(self)?;
        validate::check_domains(&self.domains)?;
        validate::check_providers(&self.providers)?;
        validate::check_directory_url(&self.ca_directory_url)?;

        Ok(())
    }

    /// The primary domain, which identifies the certificate
    pub fn primary_domain(&self) -> Option<&str> {
        certrenew_common::primary_domain(&self.domains)
    }

    /// Credentials of the active provider
    pub fn active_credentials(&self) -> Result<&ProviderCredentials, ConfigError> {
        self.providers
            .get(&self.active_provider)
            .ok_or_else(|| ConfigError::UnknownProvider {
                name: self.active_provider.clone(),
                configured: self.providers.keys().cloned().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn propagation_timeout(&self) -> Duration {
        Duration::from_secs(self.propagation_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}
