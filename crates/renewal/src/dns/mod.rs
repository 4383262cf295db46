//! DNS-01 challenge support
//!
//! - [`DnsProvider`] - TXT record management for one DNS hosting API
//! - [`PropagationChecker`] - waits for records to be publicly visible
//! - [`Dns01Solver`] - the [`ChallengeSolver`](crate::challenge::ChallengeSolver)
//!   combining the two
//! - [`providers`] - shipped provider plugins

mod propagation;
mod provider;
pub mod providers;
mod solver;

pub use propagation::{PropagationChecker, PropagationConfig};
pub use provider::{
    challenge_record_fqdn, challenge_value, relative_record_name, zone_candidates, DnsProvider,
    DnsProviderError, DnsResult, ACME_CHALLENGE_LABEL, CHALLENGE_TTL,
};
pub use solver::Dns01Solver;
