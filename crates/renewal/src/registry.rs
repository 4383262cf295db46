//! Provider name -> challenge solver resolution
//!
//! The registry maps configured provider names to constructors. Adding a
//! provider means registering one more constructor; nothing else changes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use certrenew_config::{ProviderCredentials, RenewalConfig, DEFAULT_API_TIMEOUT_SECS};
use thiserror::Error;
use tracing::debug;

use crate::challenge::ChallengeSolver;
use crate::dns::providers::{CloudflareProvider, HetznerProvider};
use crate::dns::{Dns01Solver, DnsProviderError, PropagationChecker, PropagationConfig};

/// Settings handed to every provider constructor
#[derive(Debug, Clone)]
pub struct SolverSettings {
    /// Timeout for provider API calls
    pub api_timeout: Duration,
    pub propagation: PropagationConfig,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            propagation: PropagationConfig::default(),
        }
    }
}

impl SolverSettings {
    pub fn from_config(config: &RenewalConfig) -> Self {
        Self {
            api_timeout: config.api_timeout(),
            propagation: PropagationConfig::default().with_timeout(config.propagation_timeout()),
        }
    }
}

/// Provider resolution failures
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unsupported DNS provider '{name}' (available: {available})")]
    Unsupported { name: String, available: String },

    #[error("failed to construct DNS provider '{provider}': {source}")]
    Construction {
        provider: String,
        #[source]
        source: DnsProviderError,
    },
}

/// Builds a solver from credentials. Must not touch the network.
pub type SolverConstructor = Arc<
    dyn Fn(&ProviderCredentials, &SolverSettings) -> Result<Arc<dyn ChallengeSolver>, DnsProviderError>
        + Send
        + Sync,
>;

/// Registry of challenge solver constructors keyed by provider name
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    constructors: BTreeMap<String, SolverConstructor>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

impl ProviderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the shipped providers: `cloudflare` and `hetzner`
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register("cloudflare", |creds, settings| {
            let provider = CloudflareProvider::new(
                &creds.api_token,
                creds.zone_id.as_deref(),
                settings.api_timeout,
            )?;
            Ok(Arc::new(Dns01Solver::new(
                Arc::new(provider),
                PropagationChecker::new(settings.propagation.clone()),
            )) as Arc<dyn ChallengeSolver>)
        });

        registry.register("hetzner", |creds, settings| {
            let provider = HetznerProvider::new(
                &creds.api_token,
                creds.zone_id.as_deref(),
                settings.api_timeout,
            )?;
            Ok(Arc::new(Dns01Solver::new(
                Arc::new(provider),
                PropagationChecker::new(settings.propagation.clone()),
            )) as Arc<dyn ChallengeSolver>)
        });

        registry
    }

    /// Register (or replace) a constructor
    pub fn register<F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(&ProviderCredentials, &SolverSettings) -> Result<Arc<dyn ChallengeSolver>, DnsProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(name.to_string(), Arc::new(constructor));
        self
    }

    /// Registered provider names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Build the solver for a provider name
    pub fn resolve(
        &self,
        name: &str,
        credentials: &ProviderCredentials,
        settings: &SolverSettings,
    ) -> Result<Arc<dyn ChallengeSolver>, ProviderError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| ProviderError::Unsupported {
                name: name.to_string(),
                available: self.names().join(", "),
            })?;

        let solver = constructor(credentials, settings).map_err(|source| {
            ProviderError::Construction {
                provider: name.to_string(),
                source,
            }
        })?;

        debug!(provider = %name, "Resolved challenge solver");
        Ok(solver)
    }
}
