//! certrenew library
//!
//! Renews a TLS certificate through ACME with DNS-01 challenges and stores
//! the result in a versioned secret store.
//!
//! - **Orchestration**: [`RenewalOrchestrator`] runs one renewal attempt
//! - **Expiry**: [`needs_renewal`] decides whether a stored chain is due
//! - **Providers**: [`ProviderRegistry`] maps provider names to DNS-01 solvers
//! - **Issuance**: [`IssuanceClient`] with the production [`AcmeIssuer`]
//! - **Records**: [`CertificateRecord`] built from the issued chain and key
//! - **Storage**: [`SecureStore`] with file and in-memory implementations
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use certrenew::{AcmeIssuer, FileStore, RenewalOrchestrator};
//! use certrenew_config::RenewalConfig;
//!
//! let config = RenewalConfig::from_file("acme.toml")?;
//! let orchestrator = RenewalOrchestrator::builder()
//!     .issuer(Arc::new(AcmeIssuer::new(config.api_timeout())?))
//!     .store(Arc::new(FileStore::new("/var/lib/certrenew".as_ref())?))
//!     .config(config)
//!     .build()?;
//! let outcome = orchestrator.run().await?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod app_config;
pub mod challenge;
pub mod dns;
pub mod error;
pub mod expiry;
pub mod orchestrator;
pub mod record;
pub mod registry;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Orchestration
pub use error::{ConfigurationError, RenewalError, RenewalErrorKind, RenewalPhase};
pub use orchestrator::{RenewalOrchestrator, RenewalOrchestratorBuilder, RenewalOutcome};

// Expiry
pub use expiry::{needs_renewal, needs_renewal_at};

// Providers and challenges
pub use challenge::{ChallengeSolver, SolverError};
pub use registry::{ProviderError, ProviderRegistry, SolverSettings};

// Issuance
pub use acme::{
    AccountHandle, AccountKey, AccountRequest, AcmeIssuer, IssuanceClient, IssuanceError,
    IssuedCertificate, ObtainRequest,
};

// Records and storage
pub use record::{CertificateRecord, RecordError};
pub use store::{FileStore, MemoryStore, PayloadFormat, SecureStore, StoreError, VersionedPayload};

// Application config
pub use app_config::{update_app_certificate, AppConfigError, AppConfigUpdate};
