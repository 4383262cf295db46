//! Production ACME client
//!
//! Account registration goes through our own signed request (see
//! [`register_account`]); the order flow runs on `instant-acme`, loaded
//! from the registered account URL and key.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewOrder,
    OrderStatus,
};
use parking_lot::Mutex;
use rcgen::{CertificateParams, DistinguishedName, KeyPair};
use reqwest::Client;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use x509_parser::prelude::Pem;

use super::account::register_account;
use super::{
    AccountHandle, AccountRequest, IssuanceClient, IssuanceError, IssuedCertificate, ObtainRequest,
};
use crate::challenge::ChallengeSolver;

/// Delay between order status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound for one order, challenges included
pub const DEFAULT_ORDER_TIMEOUT: Duration = Duration::from_secs(900);

/// Attempts at downloading the chain once the order is valid
const CERTIFICATE_DOWNLOAD_ATTEMPTS: u32 = 5;

/// Requests made before the order starts: directory, nonce, newAccount and
/// one badNonce retry
const REGISTRATION_REQUESTS: u32 = 4;

/// Order timeout that fits, with account registration before it and one
/// cleanup request per domain after it, inside `deadline`.
///
/// Returns `None` when `deadline` does not even cover those requests.
pub fn order_timeout_within(
    deadline: Duration,
    request_timeout: Duration,
    domains: usize,
) -> Option<Duration> {
    let requests = REGISTRATION_REQUESTS.checked_add(u32::try_from(domains).ok()?)?;
    let reserved = request_timeout.checked_mul(requests)?;
    deadline.checked_sub(reserved).filter(|budget| !budget.is_zero())
}

/// A challenge handed to the solver, kept for cleanup
#[derive(Debug, Clone)]
struct Presented {
    domain: String,
    token: String,
    key_authorization: String,
    url: String,
}

/// Challenges presented during one order
#[derive(Debug, Default)]
struct PresentedChallenges {
    entries: Mutex<Vec<Presented>>,
}

impl PresentedChallenges {
    /// Record the challenge, then present it. Recorded first so a
    /// half-created record is still cleaned up.
    async fn present(
        &self,
        solver: &dyn ChallengeSolver,
        challenge: Presented,
    ) -> Result<(), IssuanceError> {
        self.entries.lock().push(challenge.clone());
        solver
            .present(&challenge.domain, &challenge.token, &challenge.key_authorization)
            .await
            .map_err(|source| IssuanceError::Challenge {
                domain: challenge.domain,
                source,
            })
    }

    fn urls(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .iter()
            .map(|c| (c.domain.clone(), c.url.clone()))
            .collect()
    }

    /// Clean up everything presented so far; failures are logged only
    async fn cleanup(&self, solver: &dyn ChallengeSolver) {
        let presented = std::mem::take(&mut *self.entries.lock());
        for challenge in &presented {
            if let Err(e) = solver
                .cleanup(&challenge.domain, &challenge.token, &challenge.key_authorization)
                .await
            {
                warn!(domain = %challenge.domain, error = %e, "Challenge cleanup failed");
            }
        }
    }
}

/// Run `drive` for at most `timeout`, then clean up whatever it presented,
/// however it ended.
async fn settle_challenges<T>(
    solver: &dyn ChallengeSolver,
    presented: &PresentedChallenges,
    timeout: Duration,
    drive: impl Future<Output = Result<T, IssuanceError>>,
) -> Result<T, IssuanceError> {
    let result = tokio::time::timeout(timeout, drive).await;
    presented.cleanup(solver).await;
    match result {
        Ok(result) => result,
        Err(_) => Err(IssuanceError::Timeout {
            stage: "waiting for the order to complete",
        }),
    }
}

/// [`IssuanceClient`] talking to a real CA
#[derive(Debug, Clone)]
pub struct AcmeIssuer {
    http: Client,
    poll_interval: Duration,
    order_timeout: Duration,
}

impl AcmeIssuer {
    /// Create an issuer whose registration requests time out after `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self, IssuanceError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("certrenew/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            poll_interval: DEFAULT_POLL_INTERVAL,
            order_timeout: DEFAULT_ORDER_TIMEOUT,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_order_timeout(mut self, timeout: Duration) -> Self {
        self.order_timeout = timeout;
        self
    }

    /// Open the order, present every pending authorization, then drive the
    /// order to a chain
    async fn drive_order(
        &self,
        account: &AccountHandle,
        request: &ObtainRequest,
        presented: &PresentedChallenges,
        certificate_key: &KeyPair,
    ) -> Result<String, IssuanceError> {
        let acme = Account::from_credentials(credentials_for(account)?).await?;
        let identifiers: Vec<Identifier> = request
            .domains
            .iter()
            .map(|d| Identifier::Dns(d.clone()))
            .collect();

        info!(
            domains = %request.domains.join(", "),
            solver = %request.solver.name(),
            "Creating certificate order"
        );
        let mut order = acme
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await?;

        let authorizations = order.authorizations().await?;

        for authz in &authorizations {
            let Identifier::Dns(domain) = &authz.identifier;
            match authz.status {
                AuthorizationStatus::Pending => {}
                AuthorizationStatus::Valid => {
                    debug!(domain = %domain, "Authorization already valid");
                    continue;
                }
                status => {
                    return Err(IssuanceError::AuthorizationFailed {
                        domain: domain.clone(),
                        status: format!("{:?}", status).to_lowercase(),
                    })
                }
            }

            let challenge = authz
                .challenges
                .iter()
                .find(|c| c.r#type == ChallengeType::Dns01)
                .ok_or_else(|| IssuanceError::NoDns01Challenge(domain.clone()))?;

            let key_authorization = order.key_authorization(challenge).as_str().to_string();
            presented
                .present(
                    request.solver.as_ref(),
                    Presented {
                        domain: domain.clone(),
                        token: challenge.token.clone(),
                        key_authorization,
                        url: challenge.url.clone(),
                    },
                )
                .await?;
        }

        for (domain, url) in presented.urls() {
            debug!(domain = %domain, url = %url, "Setting challenge ready");
            order.set_challenge_ready(&url).await?;
        }

        let mut finalized = false;
        loop {
            order.refresh().await?;
            match order.state().status {
                OrderStatus::Pending | OrderStatus::Processing => {
                    debug!("Order not ready yet, waiting");
                    sleep(self.poll_interval).await;
                }
                OrderStatus::Ready if !finalized => {
                    debug!("Order ready, submitting CSR");
                    let csr = make_csr(&request.domains, certificate_key)?;
                    order.finalize(&csr).await?;
                    finalized = true;
                }
                OrderStatus::Ready => sleep(self.poll_interval).await,
                OrderStatus::Valid => break,
                OrderStatus::Invalid => return Err(IssuanceError::OrderInvalid),
            }
        }

        for attempt in 1..=CERTIFICATE_DOWNLOAD_ATTEMPTS {
            if let Some(chain) = order.certificate().await? {
                return Ok(chain);
            }
            debug!(attempt, "Certificate not available yet");
            sleep(Duration::from_secs(1)).await;
        }
        Err(IssuanceError::CertificateUnavailable)
    }
}

#[async_trait]
impl IssuanceClient for AcmeIssuer {
    async fn register_account(
        &self,
        request: &AccountRequest<'_>,
    ) -> Result<AccountHandle, IssuanceError> {
        let account_url =
            register_account(&self.http, request.directory_url, request.email, request.key)
                .await?;

        Ok(AccountHandle {
            account_url,
            directory_url: request.directory_url.to_string(),
            key: request.key.clone(),
        })
    }

    async fn obtain(
        &self,
        account: &AccountHandle,
        request: ObtainRequest,
    ) -> Result<IssuedCertificate, IssuanceError> {
        let primary = request
            .domains
            .first()
            .cloned()
            .ok_or(IssuanceError::NoDomains)?;

        let certificate_key = KeyPair::generate()?;
        let presented = PresentedChallenges::default();

        let chain = settle_challenges(
            request.solver.as_ref(),
            &presented,
            self.order_timeout,
            self.drive_order(account, &request, &presented, &certificate_key),
        )
        .await?;

        let certificate_chain = if request.bundle {
            chain
        } else {
            leaf_only(&chain)
        };

        info!(domain = %primary, "Certificate issued");
        Ok(IssuedCertificate {
            domain: primary,
            certificate_chain,
            private_key: certificate_key.serialize_pem(),
        })
    }
}

/// `instant-acme` credentials for an already registered account
fn credentials_for(account: &AccountHandle) -> Result<AccountCredentials, IssuanceError> {
    Ok(serde_json::from_value(json!({
        "id": account.account_url,
        "key_pkcs8": URL_SAFE_NO_PAD.encode(account.key.pkcs8_der()),
        "directory": account.directory_url,
    }))?)
}

/// DER CSR with every domain as a SAN and an empty subject
fn make_csr(domains: &[String], key: &KeyPair) -> Result<Vec<u8>, IssuanceError> {
    let mut params = CertificateParams::new(domains.to_vec())?;
    params.distinguished_name = DistinguishedName::new();
    let csr = params.serialize_request(key)?;
    Ok(csr.der().as_ref().to_vec())
}

/// First certificate of a PEM chain, re-encoded; unparsable input is
/// returned unchanged
fn leaf_only(chain: &str) -> String {
    let Some(Ok(leaf)) = Pem::iter_from_buffer(chain.as_bytes()).next() else {
        return chain.to_string();
    };

    let body = STANDARD.encode(&leaf.contents);
    let mut pem = format!("-----BEGIN {}-----\n", leaf.label);
    for line in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", leaf.label));
    pem
}
