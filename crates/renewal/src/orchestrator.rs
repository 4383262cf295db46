//! Renewal orchestration
//!
//! One [`RenewalOrchestrator::run`] is one renewal attempt:
//!
//! ```text
//! Idle -> ValidatingConfig -> ResolvingProvider -> RegisteringAccount
//!      -> Obtaining -> Persisting -> Done
//! ```
//!
//! Any phase can fail; the error carries the phase and the domain set. A
//! disabled configuration or a certificate that is not yet due ends the run
//! successfully without touching the network.

use std::sync::Arc;

use certrenew_common::{CertificateId, Scope};
use certrenew_config::RenewalConfig;
use chrono::{DateTime, Utc};
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};

use crate::acme::{AccountKey, AccountRequest, IssuanceClient, ObtainRequest};
use crate::error::{ConfigurationError, RenewalError, RenewalErrorKind, RenewalPhase};
use crate::expiry::needs_renewal_at;
use crate::record::CertificateRecord;
use crate::registry::{ProviderRegistry, SolverSettings};
use crate::store::{PayloadFormat, SecureStore};

/// How a successful run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// `enabled = false`; nothing was done
    Disabled,
    /// The stored certificate is not due yet
    NotDue {
        identifier: CertificateId,
        expires_at: DateTime<Utc>,
    },
    /// A new certificate was obtained and stored
    Renewed {
        identifier: CertificateId,
        expires_at: DateTime<Utc>,
        version: u64,
    },
}

/// Drives one renewal attempt
#[derive(Debug)]
pub struct RenewalOrchestrator {
    config: RenewalConfig,
    registry: ProviderRegistry,
    issuer: Arc<dyn IssuanceClient>,
    store: Arc<dyn SecureStore>,
    settings: SolverSettings,
    span: Span,
    force: bool,
}

impl RenewalOrchestrator {
    pub fn builder() -> RenewalOrchestratorBuilder {
        RenewalOrchestratorBuilder::default()
    }

    pub fn config(&self) -> &RenewalConfig {
        &self.config
    }

    /// Run one renewal attempt inside the orchestrator's span
    pub async fn run(&self) -> Result<RenewalOutcome, RenewalError> {
        let span = self.span.clone();
        span.record("domains", field::display(self.config.domains.join(",")));
        if let Some(primary) = self.config.primary_domain() {
            span.record("identifier", field::display(primary));
        }
        self.run_phases().instrument(span).await
    }

    fn enter(&self, phase: RenewalPhase) -> RenewalPhase {
        self.span.record("phase", field::display(phase));
        debug!(phase = %phase, "Entering renewal phase");
        phase
    }

    fn fail(&self, phase: RenewalPhase, kind: impl Into<RenewalErrorKind>) -> RenewalError {
        let err = RenewalError::new(phase, &self.config.domains, kind);
        warn!(phase = %phase, error = %err.kind, "Certificate renewal failed");
        err
    }

    async fn run_phases(&self) -> Result<RenewalOutcome, RenewalError> {
        let started_at = Utc::now();
        let config = &self.config;

        if !config.enabled {
            info!("Certificate renewal disabled, nothing to do");
            return Ok(RenewalOutcome::Disabled);
        }

        let phase = self.enter(RenewalPhase::ValidatingConfig);
        config
            .validate()
            .map_err(|e| self.fail(phase, ConfigurationError::from(e)))?;

        let identifier = match config.primary_domain() {
            Some(primary) => CertificateId::from(primary),
            None => {
                return Err(self.fail(
                    phase,
                    ConfigurationError::from(certrenew_config::ConfigError::MissingFields(
                        "domains".to_string(),
                    )),
                ))
            }
        };

        let stored = self.stored_certificate().await;
        if self.force {
            info!("Renewal forced, skipping expiry check");
        } else if let Some(existing) = &stored {
            let same_domains = existing.domains == config.domains;
            if !same_domains {
                info!(
                    stored = %existing.domains.join(","),
                    "Configured domains changed since the last issuance, renewing"
                );
            } else if !needs_renewal_at(
                Some(&existing.certificate_chain),
                config.renew_before_days,
                started_at,
            ) {
                info!(
                    expires_at = %existing.expires_at,
                    renew_before_days = config.renew_before_days,
                    "Certificate not due for renewal"
                );
                return Ok(RenewalOutcome::NotDue {
                    identifier: existing.identifier.clone(),
                    expires_at: existing.expires_at,
                });
            }
        }

        let account_key = AccountKey::from_pem(&config.account_private_key)
            .map_err(|e| self.fail(phase, ConfigurationError::from(e)))?;

        let phase = self.enter(RenewalPhase::ResolvingProvider);
        let credentials = config
            .active_credentials()
            .map_err(|e| self.fail(phase, ConfigurationError::from(e)))?;
        let solver = self
            .registry
            .resolve(&config.active_provider, credentials, &self.settings)
            .map_err(|e| self.fail(phase, e))?;

        let phase = self.enter(RenewalPhase::RegisteringAccount);
        let account = self
            .issuer
            .register_account(&AccountRequest {
                email: &config.email,
                directory_url: &config.ca_directory_url,
                key: &account_key,
            })
            .await
            .map_err(|e| self.fail(phase, e))?;
        debug!(account = %account.account_url, "Using ACME account");

        let phase = self.enter(RenewalPhase::Obtaining);
        info!(provider = %config.active_provider, "Obtaining certificate");
        let issued = self
            .issuer
            .obtain(
                &account,
                ObtainRequest {
                    domains: config.domains.clone(),
                    bundle: true,
                    solver,
                },
            )
            .await
            .map_err(|e| self.fail(phase, e))?;

        let phase = self.enter(RenewalPhase::Persisting);
        let mut record =
            CertificateRecord::builder(&config.domains, &issued.certificate_chain, &issued.private_key)
                .identifier(identifier.clone())
                .attempted_at(started_at)
                .build()
                .map_err(|e| self.fail(phase, e))?;
        record.created_at = stored
            .filter(|previous| previous.identifier == record.identifier)
            .and_then(|previous| previous.created_at);

        let payload = record.to_toml_string().map_err(|e| self.fail(phase, e))?;
        let version = match self
            .store
            .save(
                &Scope::certificate_output(),
                payload.as_bytes(),
                PayloadFormat::Toml,
                &record.description(),
            )
            .await
        {
            Ok(version) => version,
            Err(e) => {
                error!(
                    identifier = %record.identifier,
                    expires_at = %record.expires_at,
                    error = %e,
                    "Obtained certificate could not be stored"
                );
                return Err(RenewalError::new(phase, &config.domains, e));
            }
        };

        info!(
            identifier = %record.identifier,
            expires_at = %record.expires_at,
            version,
            "Certificate renewed"
        );
        Ok(RenewalOutcome::Renewed {
            identifier: record.identifier,
            expires_at: record.expires_at,
            version,
        })
    }

    /// Latest stored certificate; any failure reads as "nothing stored"
    async fn stored_certificate(&self) -> Option<CertificateRecord> {
        let latest = match self.store.latest(&Scope::certificate_output()).await {
            Ok(latest) => latest,
            Err(e) if e.is_not_found() => {
                debug!("No certificate stored yet");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored certificate, treating as absent");
                return None;
            }
        };

        match CertificateRecord::from_stored(&latest) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(version = latest.version, error = %e, "Stored certificate is undecodable, treating as absent");
                None
            }
        }
    }
}

/// Builder for [`RenewalOrchestrator`]
#[derive(Debug, Default)]
pub struct RenewalOrchestratorBuilder {
    config: Option<RenewalConfig>,
    registry: Option<ProviderRegistry>,
    issuer: Option<Arc<dyn IssuanceClient>>,
    store: Option<Arc<dyn SecureStore>>,
    settings: Option<SolverSettings>,
    span: Option<Span>,
    force: bool,
}

impl RenewalOrchestratorBuilder {
    pub fn config(mut self, config: RenewalConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Provider registry; defaults to [`ProviderRegistry::with_defaults`]
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn issuer(mut self, issuer: Arc<dyn IssuanceClient>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Solver settings; derived from the configuration when unset
    pub fn solver_settings(mut self, settings: SolverSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Span the run logs under. It should declare `identifier`, `domains`
    /// and `phase` fields for them to be recorded.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Skip the expiry check
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn build(self) -> Result<RenewalOrchestrator, RenewalError> {
        let missing = |what: &'static str| {
            RenewalError::new(
                RenewalPhase::Idle,
                &[],
                RenewalErrorKind::MissingDependency(what),
            )
        };

        let config = self.config.ok_or_else(|| missing("configuration"))?;
        let issuer = self.issuer.ok_or_else(|| missing("issuance client"))?;
        let store = self.store.ok_or_else(|| missing("store"))?;
        let settings = self
            .settings
            .unwrap_or_else(|| SolverSettings::from_config(&config));
        let span = self.span.unwrap_or_else(|| {
            info_span!(
                "cert_renewal",
                identifier = field::Empty,
                domains = field::Empty,
                phase = field::Empty
            )
        });

        Ok(RenewalOrchestrator {
            config,
            registry: self.registry.unwrap_or_else(ProviderRegistry::with_defaults),
            issuer,
            store,
            settings,
            span,
            force: self.force,
        })
    }
}
