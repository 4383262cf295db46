//! Shared types for the certrenew workspace.
//!
//! - [`ids`] - Type-safe identifiers for certificates and storage scopes
//! - [`domains`] - Domain-name helpers (wildcards, primary domain)
//! - [`time`] - RFC 3339 formatting used by persisted records

pub mod domains;
pub mod ids;
pub mod time;

pub use domains::{base_domain, is_wildcard, missing_wildcard_bases, primary_domain};
pub use ids::{
    CertificateId, InvalidScope, Scope, ACME_CONFIG_SCOPE, APP_CONFIG_SCOPE,
    CERTIFICATE_OUTPUT_SCOPE,
};
