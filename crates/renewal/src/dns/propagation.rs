//! DNS propagation checking
//!
//! Confirms a challenge TXT record is visible from public resolvers before
//! the CA is asked to validate it.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::challenge::SolverError;

/// Propagation check settings
#[derive(Debug, Clone)]
pub struct PropagationConfig {
    /// Skip the check and trust the provider API
    pub enabled: bool,
    /// Delay before the first lookup
    pub initial_delay: Duration,
    pub check_interval: Duration,
    /// Give up after this long
    pub timeout: Duration,
    /// Resolvers to query; empty uses the system configuration
    pub nameservers: Vec<IpAddr>,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(5),
            check_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(certrenew_config::DEFAULT_PROPAGATION_TIMEOUT_SECS),
            nameservers: vec![
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
                IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            ],
        }
    }
}

impl PropagationConfig {
    /// Settings that never query DNS
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Polls resolvers until a TXT value appears
#[derive(Debug, Clone)]
pub struct PropagationChecker {
    config: PropagationConfig,
}

impl PropagationChecker {
    pub fn new(config: PropagationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    fn resolver(&self) -> Result<TokioAsyncResolver, SolverError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 2;
        // Every lookup must reach the resolvers
        opts.cache_size = 0;

        if self.config.nameservers.is_empty() {
            let (config, _) = hickory_resolver::system_conf::read_system_conf()
                .map_err(|e| SolverError::Resolver(e.to_string()))?;
            return Ok(TokioAsyncResolver::tokio(config, opts));
        }

        let group = NameServerConfigGroup::from_ips_clear(&self.config.nameservers, 53, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        Ok(TokioAsyncResolver::tokio(config, opts))
    }

    /// Wait until `fqdn` serves a TXT record equal to `expected`
    pub async fn wait_for_txt(&self, fqdn: &str, expected: &str) -> Result<(), SolverError> {
        if !self.config.enabled {
            trace!(record = %fqdn, "Propagation check disabled");
            return Ok(());
        }

        let resolver = self.resolver()?;
        let start = Instant::now();
        let deadline = start + self.config.timeout;

        debug!(
            record = %fqdn,
            timeout_secs = self.config.timeout.as_secs(),
            "Waiting for DNS propagation"
        );

        tokio::time::sleep(self.config.initial_delay).await;

        loop {
            match lookup_contains(&resolver, fqdn, expected).await {
                Ok(true) => {
                    debug!(
                        record = %fqdn,
                        elapsed_secs = start.elapsed().as_secs(),
                        "DNS propagation confirmed"
                    );
                    return Ok(());
                }
                Ok(false) => trace!(record = %fqdn, "Record not yet visible"),
                Err(e) => warn!(record = %fqdn, error = %e, "DNS lookup failed"),
            }

            if Instant::now() >= deadline {
                return Err(SolverError::PropagationTimeout {
                    record: fqdn.to_string(),
                    timeout_secs: self.config.timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.config.check_interval).await;
        }
    }
}

async fn lookup_contains(
    resolver: &TokioAsyncResolver,
    fqdn: &str,
    expected: &str,
) -> Result<bool, SolverError> {
    match resolver.txt_lookup(fqdn).await {
        Ok(records) => Ok(records.iter().any(|txt| {
            let value: String = txt
                .txt_data()
                .iter()
                .map(|data| String::from_utf8_lossy(data))
                .collect();
            value == expected
        })),
        Err(e) => match e.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => Ok(false),
            _ => Err(SolverError::Resolver(e.to_string())),
        },
    }
}
