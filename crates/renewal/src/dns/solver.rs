//! DNS-01 solver built from a provider and a propagation checker

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::propagation::PropagationChecker;
use super::provider::{challenge_record_fqdn, challenge_value, DnsProvider};
use crate::challenge::{ChallengeSolver, PendingChallenges, PresentedRecord, SolverError};

/// Publishes challenge records through a [`DnsProvider`]
#[derive(Debug)]
pub struct Dns01Solver {
    provider: Arc<dyn DnsProvider>,
    propagation: PropagationChecker,
    pending: PendingChallenges,
}

impl Dns01Solver {
    pub fn new(provider: Arc<dyn DnsProvider>, propagation: PropagationChecker) -> Self {
        Self {
            provider,
            propagation,
            pending: PendingChallenges::new(),
        }
    }

    /// Challenges presented and not yet cleaned up
    pub fn pending(&self) -> &PendingChallenges {
        &self.pending
    }
}

#[async_trait]
impl ChallengeSolver for Dns01Solver {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn present(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<(), SolverError> {
        let fqdn = challenge_record_fqdn(domain);
        let value = challenge_value(key_authorization);

        info!(
            domain = %domain,
            record = %fqdn,
            provider = %self.provider.name(),
            "Creating DNS-01 challenge record"
        );

        let record_id = self.provider.create_txt_record(&fqdn, &value).await?;
        self.pending.insert(
            token,
            PresentedRecord {
                domain: domain.to_string(),
                fqdn: fqdn.clone(),
                value: value.clone(),
                record_id,
            },
        );

        self.propagation.wait_for_txt(&fqdn, &value).await?;
        debug!(domain = %domain, record = %fqdn, "DNS-01 challenge record visible");
        Ok(())
    }

    async fn cleanup(
        &self,
        domain: &str,
        token: &str,
        _key_authorization: &str,
    ) -> Result<(), SolverError> {
        let Some(record) = self.pending.take(token) else {
            debug!(domain = %domain, "No presented record to clean up");
            return Ok(());
        };

        match self
            .provider
            .delete_txt_record(&record.fqdn, &record.record_id)
            .await
        {
            Ok(()) => {
                debug!(domain = %domain, record_id = %record.record_id, "Removed challenge record");
                Ok(())
            }
            Err(e) => {
                warn!(
                    domain = %domain,
                    record_id = %record.record_id,
                    error = %e,
                    "Failed to remove challenge record"
                );
                Err(e.into())
            }
        }
    }
}
