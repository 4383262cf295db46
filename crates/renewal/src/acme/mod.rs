//! ACME certificate issuance
//!
//! Obtains certificates from Let's Encrypt and compatible CAs using DNS-01
//! challenges.
//!
//! # Architecture
//!
//! - [`IssuanceClient`] - The seam the renewal orchestrator talks to
//! - [`AcmeIssuer`] - Production client: account registration plus the
//!   order flow on top of `instant-acme`
//! - [`AccountKey`] - The configured EC P-256 account key
//!
//! # Challenge Flow
//!
//! 1. The account is registered (or found) with the configured key
//! 2. A new order is created for all configured domains
//! 3. Every pending authorization is handed to the [`ChallengeSolver`],
//!    which publishes the TXT record and waits for it to propagate
//! 4. The CA is told the challenges are ready and the order is polled
//! 5. A CSR for a fresh key is submitted and the chain downloaded
//! 6. Every presented challenge is cleaned up, whatever the outcome

mod account;
mod client;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::challenge::{ChallengeSolver, SolverError};

pub use account::{register_account, AccountKey, AccountKeyError};
pub use client::{
    order_timeout_within, AcmeIssuer, DEFAULT_ORDER_TIMEOUT, DEFAULT_POLL_INTERVAL,
};

#[cfg(test)]
pub(crate) use account::tests::{PKCS8_PEM as TEST_ACCOUNT_KEY_PKCS8, SEC1_PEM as TEST_ACCOUNT_KEY_SEC1};

/// Errors from the ACME protocol exchange
#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("failed to read ACME directory: {0}")]
    Directory(String),

    #[error("account registration failed: {0}")]
    Registration(String),

    #[error("HTTP request to CA failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ACME protocol error: {0}")]
    Acme(#[from] instant_acme::Error),

    #[error("challenge for '{domain}' failed: {source}")]
    Challenge {
        domain: String,
        #[source]
        source: SolverError,
    },

    #[error("CA offered no dns-01 challenge for '{0}'")]
    NoDns01Challenge(String),

    #[error("authorization for '{domain}' is {status}")]
    AuthorizationFailed { domain: String, status: String },

    #[error("order has no domains")]
    NoDomains,

    #[error("order became invalid")]
    OrderInvalid,

    #[error("timed out while {stage}")]
    Timeout { stage: &'static str },

    #[error("failed to build CSR: {0}")]
    Csr(#[from] rcgen::Error),

    #[error("CA did not deliver the certificate")]
    CertificateUnavailable,

    #[error("JWS signing failed: {0}")]
    Signing(String),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Input for account registration
#[derive(Debug, Clone, Copy)]
pub struct AccountRequest<'a> {
    pub email: &'a str,
    pub directory_url: &'a str,
    pub key: &'a AccountKey,
}

/// A registered account, usable for orders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountHandle {
    pub account_url: String,
    pub directory_url: String,
    pub key: AccountKey,
}

/// Input for one certificate order
#[derive(Debug, Clone)]
pub struct ObtainRequest {
    /// All identifiers go into a single order
    pub domains: Vec<String>,
    /// Keep intermediates after the leaf
    pub bundle: bool,
    pub solver: Arc<dyn ChallengeSolver>,
}

/// Material returned by the CA
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    /// First requested domain
    pub domain: String,
    /// PEM leaf, followed by intermediates when bundled
    pub certificate_chain: String,
    /// PEM private key matching the leaf
    pub private_key: String,
}

impl Debug for IssuedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("domain", &self.domain)
            .field("certificate_chain_len", &self.certificate_chain.len())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// ACME protocol client
#[async_trait]
pub trait IssuanceClient: Send + Sync + Debug {
    /// Register the account, or retrieve it if the key is already known
    async fn register_account(
        &self,
        request: &AccountRequest<'_>,
    ) -> Result<AccountHandle, IssuanceError>;

    /// Order, validate and download a certificate
    async fn obtain(
        &self,
        account: &AccountHandle,
        request: ObtainRequest,
    ) -> Result<IssuedCertificate, IssuanceError>;
}
