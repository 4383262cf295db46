//! Integration tests for the DNS-01 provider plugins
//!
//! Tests the provider implementations using wiremock to mock their APIs.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use certrenew::dns::providers::{CloudflareProvider, HetznerProvider};
use certrenew::dns::{
    challenge_value, Dns01Solver, DnsProvider, DnsProviderError, PropagationChecker,
    PropagationConfig,
};
use certrenew::ChallengeSolver;

const TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Cloudflare Provider Tests
// ============================================================================

mod cloudflare_provider {
    use super::*;

    fn envelope(result: serde_json::Value) -> serde_json::Value {
        json!({ "success": true, "errors": [], "messages": [], "result": result })
    }

    async fn provider(server: &MockServer) -> CloudflareProvider {
        CloudflareProvider::new("cf-token", None, TIMEOUT)
            .unwrap()
            .with_api_base(format!("{}/client/v4", server.uri()))
    }

    #[tokio::test]
    async fn test_zone_lookup_walks_up_to_registered_zone() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/client/v4/zones"))
            .and(query_param("name", "www.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/client/v4/zones"))
            .and(query_param("name", "example.com"))
            .and(header("Authorization", "Bearer cf-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
                { "id": "zone-1", "name": "example.com" }
            ]))))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/client/v4/zones/zone-1/dns_records"))
            .and(body_partial_json(json!({
                "type": "TXT",
                "name": "_acme-challenge.www.example.com",
                "content": "digest",
                "ttl": 120
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(envelope(json!({ "id": "rec-1" }))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server).await;
        let record_id = provider
            .create_txt_record("_acme-challenge.www.example.com", "digest")
            .await
            .unwrap();
        assert_eq!(record_id, "rec-1");
    }

    #[tokio::test]
    async fn test_configured_zone_skips_lookup() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/client/v4/zones/fixed-zone/dns_records"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(envelope(json!({ "id": "rec-9" }))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new("cf-token", Some("fixed-zone"), TIMEOUT)
            .unwrap()
            .with_api_base(format!("{}/client/v4", server.uri()));

        let record_id = provider
            .create_txt_record("_acme-challenge.example.com", "digest")
            .await
            .unwrap();
        assert_eq!(record_id, "rec-9");
    }

    #[tokio::test]
    async fn test_unknown_zone() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/client/v4/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .create_txt_record("_acme-challenge.example.org", "digest")
            .await
            .unwrap_err();
        assert!(matches!(err, DnsProviderError::ZoneNotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/client/v4/zones"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "success": false,
                "errors": [{ "code": 9109, "message": "Invalid access token" }],
                "result": null
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .create_txt_record("_acme-challenge.example.com", "digest")
            .await
            .unwrap_err();
        assert!(matches!(err, DnsProviderError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_api_error_becomes_record_creation_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/client/v4/zones/zone-1/dns_records"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "errors": [{ "code": 81057, "message": "Record already exists." }],
                "result": null
            })))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new("cf-token", Some("zone-1"), TIMEOUT)
            .unwrap()
            .with_api_base(format!("{}/client/v4", server.uri()));

        let err = provider
            .create_txt_record("_acme-challenge.example.com", "digest")
            .await
            .unwrap_err();
        match err {
            DnsProviderError::RecordCreation { record_name, message } => {
                assert_eq!(record_name, "_acme-challenge.example.com");
                assert!(message.contains("81057"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_delete_not_found_is_ok() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/client/v4/zones/zone-1/dns_records/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new("cf-token", Some("zone-1"), TIMEOUT)
            .unwrap()
            .with_api_base(format!("{}/client/v4", server.uri()));

        assert!(provider
            .delete_txt_record("_acme-challenge.example.com", "gone")
            .await
            .is_ok());
    }
}

// ============================================================================
// Hetzner Provider Tests
// ============================================================================

mod hetzner_provider {
    use super::*;

    fn provider(server: &MockServer) -> HetznerProvider {
        HetznerProvider::new("hz-token", None, TIMEOUT)
            .unwrap()
            .with_api_base(format!("{}/api/v1", server.uri()))
    }

    #[tokio::test]
    async fn test_create_uses_relative_name() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/zones"))
            .and(header("Auth-API-Token", "hz-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "zones": [
                    { "id": "z-other", "name": "example.org" },
                    { "id": "z-1", "name": "example.com" }
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/v1/records"))
            .and(body_partial_json(json!({
                "zone_id": "z-1",
                "type": "TXT",
                "name": "_acme-challenge.www",
                "value": "digest",
                "ttl": 120
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "record": { "id": "hz-rec-1", "zone_id": "z-1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record_id = provider(&server)
            .create_txt_record("_acme-challenge.www.example.com", "digest")
            .await
            .unwrap();
        assert_eq!(record_id, "hz-rec-1");
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/zones"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = provider(&server)
            .create_txt_record("_acme-challenge.example.com", "digest")
            .await
            .unwrap_err();
        assert!(matches!(err, DnsProviderError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_delete_record() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/api/v1/records/hz-rec-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        assert!(provider(&server)
            .delete_txt_record("_acme-challenge.example.com", "hz-rec-1")
            .await
            .is_ok());
    }
}

// ============================================================================
// Solver Tests
// ============================================================================

mod solver {
    use super::*;

    #[tokio::test]
    async fn test_present_and_cleanup_through_cloudflare() {
        let server = MockServer::start().await;
        let key_authorization = "token-1.thumbprint";

        Mock::given(method("POST"))
            .and(path("/client/v4/zones/zone-1/dns_records"))
            .and(body_partial_json(json!({
                "name": "_acme-challenge.example.com",
                "content": challenge_value(key_authorization)
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "errors": [],
                "result": { "id": "rec-7" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/client/v4/zones/zone-1/dns_records/rec-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "errors": [],
                "result": { "id": "rec-7" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new("cf-token", Some("zone-1"), TIMEOUT)
            .unwrap()
            .with_api_base(format!("{}/client/v4", server.uri()));
        let solver = Dns01Solver::new(
            Arc::new(provider),
            PropagationChecker::new(PropagationConfig::disabled()),
        );

        solver
            .present("*.example.com", "token-1", key_authorization)
            .await
            .unwrap();
        assert_eq!(solver.pending().pending_count(), 1);

        solver
            .cleanup("*.example.com", "token-1", key_authorization)
            .await
            .unwrap();
        assert_eq!(solver.pending().pending_count(), 0);
    }
}
