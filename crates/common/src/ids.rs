//! Type-safe identifier newtypes for certrenew.
//!
//! These types keep certificate identifiers and storage scope names apart
//! at compile time, so a scope can never be passed where a certificate
//! identifier is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Scope holding the renewal configuration (TOML).
pub const ACME_CONFIG_SCOPE: &str = "acme_config";

/// Scope holding obtained certificate records (TOML).
pub const CERTIFICATE_OUTPUT_SCOPE: &str = "certificate_output";

/// Scope holding the application configuration that embeds the served certificate.
pub const APP_CONFIG_SCOPE: &str = "app_config";

/// Stable identifier of a logical certificate.
///
/// Usually the primary domain of the request. It does not change across
/// renewals, so stores can key history or upserts on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(String);

impl CertificateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CertificateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CertificateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Rejected storage scope name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid scope name '{0}': use 1-64 characters from [A-Za-z0-9_-]")]
pub struct InvalidScope(pub String);

/// Name of a versioned storage partition.
///
/// Scope names double as directory names in file-backed stores, so only
/// ASCII alphanumerics, `_` and `-` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope(String);

impl Scope {
    /// Validate and wrap a scope name
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidScope> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.len() <= 64
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(name))
        } else {
            Err(InvalidScope(name))
        }
    }

    /// The renewal configuration scope
    pub fn acme_config() -> Self {
        Self(ACME_CONFIG_SCOPE.to_string())
    }

    /// The obtained certificate scope
    pub fn certificate_output() -> Self {
        Self(CERTIFICATE_OUTPUT_SCOPE.to_string())
    }

    /// The application configuration scope
    pub fn app_config() -> Self {
        Self(APP_CONFIG_SCOPE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Scope {
    type Error = InvalidScope;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_id() {
        let id = CertificateId::new("example.com");
        assert_eq!(id.as_str(), "example.com");
        assert_eq!(id.to_string(), "example.com");
        assert_eq!(CertificateId::from("example.com"), id);
    }

    #[test]
    fn test_certificate_id_serializes_as_string() {
        let id = CertificateId::new("example.com");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"example.com\"");
    }

    #[test]
    fn test_well_known_scopes_are_valid() {
        assert!(Scope::new(ACME_CONFIG_SCOPE).is_ok());
        assert!(Scope::new(CERTIFICATE_OUTPUT_SCOPE).is_ok());
        assert!(Scope::new(APP_CONFIG_SCOPE).is_ok());
        assert_eq!(Scope::acme_config().as_str(), "acme_config");
    }

    #[test]
    fn test_rejects_path_like_scopes() {
        assert!(Scope::new("").is_err());
        assert!(Scope::new("../etc").is_err());
        assert!(Scope::new("a/b").is_err());
        assert!(Scope::new("with space").is_err());
        assert!(Scope::new("x".repeat(65)).is_err());
    }

    #[test]
    fn test_scope_deserialize_validates() {
        let ok: Result<Scope, _> = serde_json::from_str("\"certificate_output\"");
        assert!(ok.is_ok());

        let bad: Result<Scope, _> = serde_json::from_str("\"../../secret\"");
        assert!(bad.is_err());
    }
}
