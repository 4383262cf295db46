//! Shared fixtures for the renewal integration tests
//!
//! A scripted issuance client, a no-op solver, failing stores and helpers
//! minting certificates relative to the current time.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use rcgen::{date_time_ymd, CertificateParams, KeyPair};

use certrenew::acme::{
    AccountHandle, AccountRequest, IssuanceClient, IssuanceError, IssuedCertificate, ObtainRequest,
};
use certrenew::store::{PayloadFormat, SecureStore, StoreError, VersionedPayload};
use certrenew::{CertificateRecord, ChallengeSolver, ProviderRegistry, SolverError};
use certrenew_common::Scope;
use certrenew_config::{ProviderCredentials, RenewalConfig};

pub const PRIMARY: &str = "example.com";
pub const MOCK_PROVIDER: &str = "mock";

pub fn domains() -> Vec<String> {
    vec![PRIMARY.to_string(), "*.example.com".to_string()]
}

/// Certificate valid from `days_before` days ago until `days_after` days from now
pub fn cert_around_now(sans: &[String], days_before: i64, days_after: i64) -> (String, String) {
    let now = Utc::now();
    let start = now - ChronoDuration::days(days_before);
    let end = now + ChronoDuration::days(days_after);

    let mut params = CertificateParams::new(sans.to_vec()).unwrap();
    params.not_before = date_time_ymd(start.year(), start.month() as u8, start.day() as u8);
    params.not_after = date_time_ymd(end.year(), end.month() as u8, end.day() as u8);

    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

/// A complete, enabled configuration using the mock provider
pub fn config() -> RenewalConfig {
    let mut providers = BTreeMap::new();
    providers.insert(MOCK_PROVIDER.to_string(), ProviderCredentials::new("mock-token"));

    RenewalConfig {
        email: "ops@example.com".to_string(),
        domains: domains(),
        active_provider: MOCK_PROVIDER.to_string(),
        ca_directory_url: "https://ca.test/directory".to_string(),
        account_private_key: KeyPair::generate().unwrap().serialize_pem(),
        renew_before_days: 30,
        providers,
        ..RenewalConfig::default()
    }
}

/// Store a certificate record the way a previous run would have
pub async fn seed_certificate(store: &dyn SecureStore, domains: &[String], days_after: i64) -> CertificateRecord {
    let (chain, key) = cert_around_now(domains, 60, days_after);
    let record = CertificateRecord::builder(domains, &chain, &key)
        .identifier(domains[0].as_str())
        .build()
        .unwrap();
    store
        .save(
            &Scope::certificate_output(),
            record.to_toml_string().unwrap().as_bytes(),
            PayloadFormat::Toml,
            &record.description(),
        )
        .await
        .unwrap();
    record
}

/// Solver that accepts every challenge
#[derive(Debug, Default)]
pub struct NoopSolver;

#[async_trait]
impl ChallengeSolver for NoopSolver {
    fn name(&self) -> &str {
        MOCK_PROVIDER
    }

    async fn present(&self, _: &str, _: &str, _: &str) -> Result<(), SolverError> {
        Ok(())
    }

    async fn cleanup(&self, _: &str, _: &str, _: &str) -> Result<(), SolverError> {
        Ok(())
    }
}

/// Registry with only the mock provider, counting constructions
pub fn mock_registry(constructions: Arc<AtomicUsize>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(MOCK_PROVIDER, move |_, _| {
        constructions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(NoopSolver) as Arc<dyn ChallengeSolver>)
    });
    registry
}

/// What the scripted client does on `obtain`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObtainBehavior {
    /// Issue a 90-day certificate for the requested domains
    Issue,
    /// Fail as if the order never completed
    Timeout,
}

/// Issuance client that records calls instead of talking to a CA
#[derive(Debug)]
pub struct ScriptedIssuer {
    behavior: ObtainBehavior,
    fail_registration: bool,
    pub register_calls: AtomicUsize,
    pub obtain_requests: Mutex<Vec<(Vec<String>, bool)>>,
}

impl ScriptedIssuer {
    pub fn new(behavior: ObtainBehavior) -> Self {
        Self {
            behavior,
            fail_registration: false,
            register_calls: AtomicUsize::new(0),
            obtain_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_registration() -> Self {
        Self {
            fail_registration: true,
            ..Self::new(ObtainBehavior::Issue)
        }
    }

    pub fn register_count(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn obtain_count(&self) -> usize {
        self.obtain_requests.lock().len()
    }

    pub fn total_calls(&self) -> usize {
        self.register_count() + self.obtain_count()
    }
}

#[async_trait]
impl IssuanceClient for ScriptedIssuer {
    async fn register_account(
        &self,
        request: &AccountRequest<'_>,
    ) -> Result<AccountHandle, IssuanceError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_registration {
            return Err(IssuanceError::Registration(
                "HTTP 400: urn:ietf:params:acme:error:malformed".to_string(),
            ));
        }
        Ok(AccountHandle {
            account_url: "https://ca.test/acme/acct/1".to_string(),
            directory_url: request.directory_url.to_string(),
            key: request.key.clone(),
        })
    }

    async fn obtain(
        &self,
        _account: &AccountHandle,
        request: ObtainRequest,
    ) -> Result<IssuedCertificate, IssuanceError> {
        self.obtain_requests
            .lock()
            .push((request.domains.clone(), request.bundle));

        match self.behavior {
            ObtainBehavior::Timeout => Err(IssuanceError::Timeout {
                stage: "waiting for the order to complete",
            }),
            ObtainBehavior::Issue => {
                let (certificate_chain, private_key) = cert_around_now(&request.domains, 1, 90);
                Ok(IssuedCertificate {
                    domain: request.domains[0].clone(),
                    certificate_chain,
                    private_key,
                })
            }
        }
    }
}

/// Store whose writes always fail; reads report an empty scope
#[derive(Debug, Default)]
pub struct ReadOnlyStore;

#[async_trait]
impl SecureStore for ReadOnlyStore {
    async fn save(
        &self,
        _scope: &Scope,
        _payload: &[u8],
        _format: PayloadFormat,
        _description: &str,
    ) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("store is read-only".to_string()))
    }

    async fn latest(&self, scope: &Scope) -> Result<VersionedPayload, StoreError> {
        Err(StoreError::NotFound {
            scope: scope.to_string(),
        })
    }
}
