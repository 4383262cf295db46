//! Renewal errors
//!
//! Every failed run ends in a [`RenewalError`] naming the phase it failed in
//! and the domains it was working on. The [`RenewalErrorKind`] tells callers
//! whether anything reached the network.

use std::fmt;

use certrenew_config::ConfigError;
use thiserror::Error;

use crate::acme::{AccountKeyError, IssuanceError};
use crate::record::RecordError;
use crate::registry::ProviderError;
use crate::store::StoreError;

/// Where in the pipeline a run was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenewalPhase {
    Idle,
    ValidatingConfig,
    ResolvingProvider,
    RegisteringAccount,
    Obtaining,
    Persisting,
}

impl RenewalPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalPhase::Idle => "idle",
            RenewalPhase::ValidatingConfig => "validating_config",
            RenewalPhase::ResolvingProvider => "resolving_provider",
            RenewalPhase::RegisteringAccount => "registering_account",
            RenewalPhase::Obtaining => "obtaining",
            RenewalPhase::Persisting => "persisting",
        }
    }
}

impl fmt::Display for RenewalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration problems found before any network call
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unusable account_private_key: {0}")]
    AccountKey(#[from] AccountKeyError),
}

#[derive(Debug, Error)]
pub enum RenewalErrorKind {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    ProviderConstruction(#[from] ProviderError),

    #[error(transparent)]
    Protocol(#[from] IssuanceError),

    #[error("issued certificate is malformed: {0}")]
    Parse(#[from] RecordError),

    #[error("failed to persist certificate: {0}")]
    Persistence(#[from] StoreError),

    #[error("renewal orchestrator is missing its {0}")]
    MissingDependency(&'static str),
}

/// A failed renewal run
#[derive(Debug, Error)]
#[error("certificate renewal for [{}] failed while {phase}: {kind}", .domains.join(", "))]
pub struct RenewalError {
    pub phase: RenewalPhase,
    pub domains: Vec<String>,
    #[source]
    pub kind: RenewalErrorKind,
}

impl RenewalError {
    pub fn new(phase: RenewalPhase, domains: &[String], kind: impl Into<RenewalErrorKind>) -> Self {
        Self {
            phase,
            domains: domains.to_vec(),
            kind: kind.into(),
        }
    }

    /// Whether the run failed before contacting the CA or a DNS provider
    pub fn is_pre_network(&self) -> bool {
        matches!(
            self.kind,
            RenewalErrorKind::Configuration(_)
                | RenewalErrorKind::ProviderConstruction(_)
                | RenewalErrorKind::MissingDependency(_)
        )
    }
}
