//! DNS-01 challenge solving
//!
//! The issuance client hands each pending authorization to a
//! [`ChallengeSolver`]: `present` before the CA validates, `cleanup` after,
//! whatever the outcome. [`PendingChallenges`] remembers what was presented
//! so cleanup can find the provider-side record again.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::dns::DnsProviderError;

/// Challenge solving failures
#[derive(Debug, Error)]
pub enum SolverError {
    #[error(transparent)]
    Provider(#[from] DnsProviderError),

    #[error("TXT record '{record}' not visible after {timeout_secs}s")]
    PropagationTimeout { record: String, timeout_secs: u64 },

    #[error("DNS resolver error: {0}")]
    Resolver(String),
}

/// Answers DNS-01 challenges for a set of domains
#[async_trait]
pub trait ChallengeSolver: Send + Sync + Debug {
    /// Provider name, for logs
    fn name(&self) -> &str;

    /// Publish the challenge response and wait until it is visible
    async fn present(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<(), SolverError>;

    /// Remove what `present` published. Unknown tokens are ignored.
    async fn cleanup(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<(), SolverError>;
}

/// A record published for a challenge token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedRecord {
    pub domain: String,
    pub fqdn: String,
    pub value: String,
    pub record_id: String,
}

/// Records presented and not yet cleaned up, keyed by challenge token
#[derive(Debug, Default, Clone)]
pub struct PendingChallenges {
    records: Arc<DashMap<String, PresentedRecord>>,
}

impl PendingChallenges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: &str, record: PresentedRecord) {
        debug!(token = %token, record = %record.fqdn, "Tracking presented challenge");
        self.records.insert(token.to_string(), record);
    }

    /// Stop tracking a token, returning its record
    pub fn take(&self, token: &str) -> Option<PresentedRecord> {
        self.records.remove(token).map(|(_, record)| record)
    }

    pub fn get(&self, token: &str) -> Option<PresentedRecord> {
        self.records.get(token).map(|r| r.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.records.len()
    }
}
