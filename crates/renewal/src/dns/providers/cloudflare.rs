//! Cloudflare DNS provider
//!
//! Uses the Cloudflare v4 API with a scoped API token (Zone:DNS:Edit).
//! API documentation: <https://developers.cloudflare.com/api/>

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::dns::provider::{check_token, zone_candidates, CHALLENGE_TTL};
use crate::dns::{DnsProvider, DnsProviderError, DnsResult};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Cloudflare DNS provider
#[derive(Debug)]
pub struct CloudflareProvider {
    client: Client,
    token: String,
    api_base: String,
    /// Zone id from configuration, skipping lookups
    zone_id: Option<String>,
    /// record fqdn -> zone id
    zone_cache: DashMap<String, String>,
}

impl CloudflareProvider {
    /// Create a provider. Fails on a malformed token, before any request.
    pub fn new(token: &str, zone_id: Option<&str>, timeout: Duration) -> DnsResult<Self> {
        check_token("cloudflare", token)?;

        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DnsProviderError::Configuration(format!("failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            token: token.to_string(),
            api_base: CLOUDFLARE_API_BASE.to_string(),
            zone_id: zone_id.map(str::to_string),
            zone_cache: DashMap::new(),
        })
    }

    /// Point the provider at another API endpoint
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn zone_id_for(&self, fqdn: &str) -> DnsResult<String> {
        if let Some(zone_id) = &self.zone_id {
            return Ok(zone_id.clone());
        }
        if let Some(zone_id) = self.zone_cache.get(fqdn) {
            trace!(record = %fqdn, zone_id = %zone_id.value(), "Zone id found in cache");
            return Ok(zone_id.clone());
        }

        for candidate in zone_candidates(fqdn) {
            let response = self
                .client
                .get(format!("{}/zones", self.api_base))
                .bearer_auth(&self.token)
                .query(&[("name", candidate)])
                .send()
                .await
                .map_err(|e| DnsProviderError::from_request("failed to list zones", e))?;

            let zones: Vec<Zone> = parse_envelope(response, "list zones").await?;
            if let Some(zone) = zones.into_iter().next() {
                debug!(record = %fqdn, zone_id = %zone.id, zone = %zone.name, "Found zone for record");
                self.zone_cache.insert(fqdn.to_string(), zone.id.clone());
                return Ok(zone.id);
            }
        }

        Err(DnsProviderError::ZoneNotFound {
            domain: fqdn.to_string(),
        })
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn create_txt_record(&self, fqdn: &str, value: &str) -> DnsResult<String> {
        let zone_id = self.zone_id_for(fqdn).await?;

        let request = CreateRecordRequest {
            record_type: "TXT",
            name: fqdn,
            content: value,
            ttl: CHALLENGE_TTL,
        };

        let response = self
            .client
            .post(format!("{}/zones/{}/dns_records", self.api_base, zone_id))
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| DnsProviderError::from_request("failed to create record", e))?;

        let record: Record = parse_envelope(response, "create record")
            .await
            .map_err(|e| match e {
                DnsProviderError::ApiRequest(message) => DnsProviderError::RecordCreation {
                    record_name: fqdn.to_string(),
                    message,
                },
                other => other,
            })?;

        debug!(record = %fqdn, record_id = %record.id, zone_id = %zone_id, "Created TXT record");
        Ok(record.id)
    }

    async fn delete_txt_record(&self, fqdn: &str, record_id: &str) -> DnsResult<()> {
        let zone_id = self.zone_id_for(fqdn).await?;

        let response = self
            .client
            .delete(format!(
                "{}/zones/{}/dns_records/{}",
                self.api_base, zone_id, record_id
            ))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| DnsProviderError::from_request("failed to delete record", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(record_id = %record_id, "TXT record already gone");
            return Ok(());
        }

        let _: Deleted = parse_envelope(response, "delete record")
            .await
            .map_err(|e| match e {
                DnsProviderError::ApiRequest(message) => DnsProviderError::RecordDeletion {
                    record_id: record_id.to_string(),
                    message,
                },
                other => other,
            })?;

        debug!(record_id = %record_id, "Deleted TXT record");
        Ok(())
    }
}

/// Decode the `{success, errors, result}` envelope of every Cloudflare response
async fn parse_envelope<T: DeserializeOwned>(response: Response, action: &str) -> DnsResult<T> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(DnsProviderError::Authentication(format!(
            "Cloudflare rejected the API token ({})",
            status
        )));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        return Err(DnsProviderError::RateLimited { retry_after_secs });
    }

    let body = response.text().await.map_err(|e| {
        DnsProviderError::ApiRequest(format!("failed to read {} response: {}", action, e))
    })?;

    let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
        DnsProviderError::ApiRequest(format!(
            "failed to {}: HTTP {} with unexpected body: {}",
            action, status, e
        ))
    })?;

    if !status.is_success() || !envelope.success {
        let messages: Vec<String> = envelope
            .errors
            .iter()
            .map(|e| format!("{} (code {})", e.message, e.code))
            .collect();
        return Err(DnsProviderError::ApiRequest(format!(
            "failed to {}: HTTP {}: {}",
            action,
            status,
            messages.join("; ")
        )));
    }

    envelope.result.ok_or_else(|| {
        DnsProviderError::ApiRequest(format!("failed to {}: response has no result", action))
    })
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Deleted {
    #[allow(dead_code)]
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
}
