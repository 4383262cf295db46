//! Hetzner DNS provider
//!
//! API documentation: <https://dns.hetzner.com/api-docs>

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::dns::provider::{check_token, relative_record_name, zone_candidates, CHALLENGE_TTL};
use crate::dns::{DnsProvider, DnsProviderError, DnsResult};

/// Hetzner DNS API base URL
pub const HETZNER_API_BASE: &str = "https://dns.hetzner.com/api/v1";

#[derive(Debug, Clone, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

/// Hetzner DNS provider
#[derive(Debug)]
pub struct HetznerProvider {
    client: Client,
    token: String,
    api_base: String,
    zone_id: Option<String>,
    /// record fqdn -> zone
    zone_cache: DashMap<String, (String, String)>,
}

impl HetznerProvider {
    pub fn new(token: &str, zone_id: Option<&str>, timeout: Duration) -> DnsResult<Self> {
        check_token("hetzner", token)?;

        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DnsProviderError::Configuration(format!("failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            token: token.to_string(),
            api_base: HETZNER_API_BASE.to_string(),
            zone_id: zone_id.map(str::to_string),
            zone_cache: DashMap::new(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Zone (id, name) owning a record
    async fn zone_for(&self, fqdn: &str) -> DnsResult<(String, String)> {
        if let Some(zone) = self.zone_cache.get(fqdn) {
            trace!(record = %fqdn, zone_id = %zone.0, "Zone found in cache");
            return Ok(zone.clone());
        }

        let zone = match &self.zone_id {
            Some(id) => {
                let response: ZoneResponse = self.get(&format!("zones/{}", id)).await?;
                response.zone
            }
            None => {
                let response: ZonesResponse = self.get("zones").await?;
                zone_candidates(fqdn)
                    .into_iter()
                    .find_map(|candidate| {
                        response.zones.iter().find(|z| z.name == candidate).cloned()
                    })
                    .ok_or_else(|| DnsProviderError::ZoneNotFound {
                        domain: fqdn.to_string(),
                    })?
            }
        };

        debug!(record = %fqdn, zone_id = %zone.id, zone = %zone.name, "Found zone for record");
        let entry = (zone.id, zone.name);
        self.zone_cache.insert(fqdn.to_string(), entry.clone());
        Ok(entry)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> DnsResult<T> {
        let response = self
            .client
            .get(format!("{}/{}", self.api_base, path))
            .header("Auth-API-Token", &self.token)
            .send()
            .await
            .map_err(|e| DnsProviderError::from_request("zone request failed", e))?;
        decode(response, path).await
    }
}

#[async_trait]
impl DnsProvider for HetznerProvider {
    fn name(&self) -> &'static str {
        "hetzner"
    }

    async fn create_txt_record(&self, fqdn: &str, value: &str) -> DnsResult<String> {
        let (zone_id, zone_name) = self.zone_for(fqdn).await?;
        let name = relative_record_name(fqdn, &zone_name);

        let request = CreateRecordRequest {
            zone_id: &zone_id,
            record_type: "TXT",
            name: &name,
            value,
            ttl: CHALLENGE_TTL,
        };

        let response = self
            .client
            .post(format!("{}/records", self.api_base))
            .header("Auth-API-Token", &self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| DnsProviderError::from_request("failed to create record", e))?;

        let created: RecordResponse = decode(response, "records").await.map_err(|e| match e {
            DnsProviderError::ApiRequest(message) => DnsProviderError::RecordCreation {
                record_name: fqdn.to_string(),
                message,
            },
            other => other,
        })?;

        debug!(record = %fqdn, record_id = %created.record.id, "Created TXT record");
        Ok(created.record.id)
    }

    async fn delete_txt_record(&self, _fqdn: &str, record_id: &str) -> DnsResult<()> {
        let response = self
            .client
            .delete(format!("{}/records/{}", self.api_base, record_id))
            .header("Auth-API-Token", &self.token)
            .send()
            .await
            .map_err(|e| DnsProviderError::from_request("failed to delete record", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(record_id = %record_id, "TXT record already gone");
            return Ok(());
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(DnsProviderError::Authentication(
                "Hetzner rejected the API token".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DnsProviderError::RecordDeletion {
                record_id: record_id.to_string(),
                message: format!("HTTP {} - {}", status, body),
            });
        }

        debug!(record_id = %record_id, "Deleted TXT record");
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> DnsResult<T> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(DnsProviderError::Authentication(
            "Hetzner rejected the API token".to_string(),
        ));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(DnsProviderError::RateLimited {
            retry_after_secs: 60,
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DnsProviderError::ApiRequest(format!(
            "{}: HTTP {} - {}",
            what, status, body
        )));
    }
    response
        .json()
        .await
        .map_err(|e| DnsProviderError::ApiRequest(format!("failed to parse {} response: {}", what, e)))
}

#[derive(Debug, Deserialize)]
struct ZonesResponse {
    zones: Vec<Zone>,
}

#[derive(Debug, Deserialize)]
struct ZoneResponse {
    zone: Zone,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    record: CreatedRecord,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    zone_id: &'a str,
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    value: &'a str,
    ttl: u32,
}
