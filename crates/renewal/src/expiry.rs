//! Renewal due-date check

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::record::parse_leaf;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Whether the stored certificate chain should be renewed now
///
/// See [`needs_renewal_at`].
pub fn needs_renewal(existing_chain_pem: Option<&str>, threshold_days: u32) -> bool {
    needs_renewal_at(existing_chain_pem, threshold_days, Utc::now())
}

/// Whether the stored certificate chain should be renewed at `now`
///
/// Returns `true` if:
/// - No certificate is stored (first issuance)
/// - The stored chain cannot be decoded (logged, never an error)
/// - Fewer than `threshold_days` days are left before the leaf expires
pub fn needs_renewal_at(
    existing_chain_pem: Option<&str>,
    threshold_days: u32,
    now: DateTime<Utc>,
) -> bool {
    let chain = match existing_chain_pem {
        Some(chain) if !chain.trim().is_empty() => chain,
        _ => {
            debug!("No certificate stored, needs issuance");
            return true;
        }
    };

    let leaf = match parse_leaf(chain) {
        Ok(leaf) => leaf,
        Err(e) => {
            warn!(error = %e, "Stored certificate is unreadable, renewing");
            return true;
        }
    };

    let days_left = (leaf.not_after - now).num_seconds() as f64 / SECONDS_PER_DAY;
    let due = days_left < f64::from(threshold_days);

    if due {
        debug!(
            expires_at = %leaf.not_after,
            days_left = days_left,
            threshold_days = threshold_days,
            "Certificate needs renewal"
        );
    } else {
        trace!(
            expires_at = %leaf.not_after,
            days_left = days_left,
            "Certificate is still valid"
        );
    }

    due
}
