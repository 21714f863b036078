//! HTTP registry client.
//!
//! Speaks the verification API every supported registry exposes:
//! `GET {base_url}/verify/{registry_id}` returning
//! `{verified, methodology, credits_available}`.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode, Url};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::traits::*;
use crate::registry::Registry;

/// HTTP client for registry verification endpoints.
pub struct HttpRegistryClient {
    client: Client,
    endpoints: BTreeMap<Registry, String>,
    api_key: Option<String>,
}

impl HttpRegistryClient {
    /// Create a client for the given registry base URLs.
    ///
    /// `request_timeout` bounds each HTTP request at the transport level.
    pub fn new(
        endpoints: BTreeMap<Registry, String>,
        request_timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .map_err(|e| RegistryError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoints,
            api_key: None,
        })
    }

    /// Set a bearer token sent with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Build the verification URL for an id.
    ///
    /// The id is appended as a single percent-encoded path segment.
    fn verify_url(&self, registry: Registry, registry_id: &str) -> Result<Url, RegistryError> {
        let base = self
            .endpoints
            .get(&registry)
            .ok_or_else(|| RegistryError::UnrecognizedRegistry(registry_id.to_string()))?;
        let invalid_base = || RegistryError::Client(format!("invalid {} endpoint: {}", registry, base));

        let mut url = Url::parse(base).map_err(|_| invalid_base())?;
        url.path_segments_mut()
            .map_err(|_| invalid_base())?
            .pop_if_empty()
            .push("verify")
            .push(registry_id);
        Ok(url)
    }

    /// Build authorization header if API key is set.
    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {}", k))
    }
}

fn retry_after_ms(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    fn id(&self) -> &str {
        "http"
    }

    async fn fetch(&self, registry: Registry, registry_id: &str) -> Result<RegistryRecord, RegistryError> {
        let url = self.verify_url(registry, registry_id)?;

        debug!(registry = %registry, registry_id = %registry_id, url = %url, "Calling registry");

        let mut request = self.client.get(url);
        if let Some(auth) = self.auth_header() {
            request = request.header(header::AUTHORIZATION, auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::Transient(e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(RegistryError::NotFound(registry_id.to_string()));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(RegistryError::RateLimited {
                    retry_after_ms: retry_after_ms(response.headers()),
                });
            }
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(RegistryError::Transient(format!("HTTP {}: {}", status, body)));
            }
            _ => {}
        }

        response
            .json::<RegistryRecord>()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_eq, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> HttpRegistryClient {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(Registry::Vcs, server.uri());
        HttpRegistryClient::new(endpoints, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_verified_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/verify/VCS-1001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "verified": true,
                "methodology": "VM0042",
                "credits_available": 40.0,
                "verifying_body": "SCS Global"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let record = client.fetch(Registry::Vcs, "VCS-1001").await.unwrap();
        assert!(record.verified);
        assert_eq!(record.methodology, "VM0042");
        assert_eq!(record.verifying_body.as_deref(), Some("SCS Global"));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(path("/verify/VCS-404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/verify/VCS-503"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;
        Mock::given(path("/verify/VCS-429"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
            .mount(&server)
            .await;
        Mock::given(path("/verify/VCS-bad"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;

        assert_eq!(
            client.fetch(Registry::Vcs, "VCS-404").await,
            Err(RegistryError::NotFound("VCS-404".to_string()))
        );
        assert!(matches!(
            client.fetch(Registry::Vcs, "VCS-503").await,
            Err(RegistryError::Transient(msg)) if msg.contains("maintenance")
        ));
        assert_eq!(
            client.fetch(Registry::Vcs, "VCS-429").await,
            Err(RegistryError::RateLimited { retry_after_ms: Some(3000) })
        );
        assert!(matches!(
            client.fetch(Registry::Vcs, "VCS-bad").await,
            Err(RegistryError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_registry() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        assert_eq!(
            client.fetch(Registry::Acr, "ACR-9").await,
            Err(RegistryError::UnrecognizedRegistry("ACR-9".to_string()))
        );
    }

    #[tokio::test]
    async fn test_bearer_token_sent() {
        let server = MockServer::start().await;
        Mock::given(path("/verify/VCS-7"))
            .and(header_eq("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "verified": true,
                "methodology": "VM0017",
                "credits_available": 1.0
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await.with_api_key("secret");
        assert!(client.fetch(Registry::Vcs, "VCS-7").await.is_ok());
    }

    #[tokio::test]
    async fn test_huge_retry_after_saturates() {
        let server = MockServer::start().await;
        Mock::given(path("/verify/VCS-429"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("Retry-After", "18446744073709551615"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(
            client.fetch(Registry::Vcs, "VCS-429").await,
            Err(RegistryError::RateLimited { retry_after_ms: Some(u64::MAX) })
        );
    }

    #[tokio::test]
    async fn test_id_stays_inside_verify_path() {
        let server = MockServer::start().await;
        Mock::given(path("/admin/export"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "verified": true,
                "methodology": "EXPORT",
                "credits_available": 1e9
            })))
            .mount(&server)
            .await;
        Mock::given(path_regex("^/verify/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server).await.with_api_key("secret");
        for id in ["VCS-1/../../admin/export", "VCS-1?next=/admin/export", "VCS-1#frag"] {
            assert_eq!(
                client.fetch(Registry::Vcs, id).await,
                Err(RegistryError::NotFound(id.to_string())),
                "id {}",
                id
            );
        }

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        for request in requests {
            assert!(request.url.path().starts_with("/verify/"), "{}", request.url);
            assert!(request.url.query().is_none());
        }
    }
}
