//! Cold-storage restore clients.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use url::Url;

use super::signer::{sign_request, Credentials};
use super::{ColdStorageError, ColdStorageResult};

/// Body of a restore request
pub fn restore_request_body(days: u32, tier: &str) -> String {
    format!(
        "<RestoreRequest><Days>{days}</Days><GlacierJobParameters><Tier>{tier}</Tier></GlacierJobParameters></RestoreRequest>"
    )
}

#[async_trait]
pub trait ColdStorageClient: Send + Sync + 'static {
    /// Ask the provider to restore the object at `url` into its hot bucket.
    /// Returns the raw HTTP status; see `FileRestoreState::from_status`.
    async fn request_restore(&self, url: &str) -> ColdStorageResult<u16>;

    fn provider_name(&self) -> &str;
}

/// Signed `POST <url>?restore=` over HTTP
#[derive(Debug, Clone)]
pub struct HttpColdStorageClient {
    http: reqwest::Client,
    provider: String,
    credentials: Credentials,
    region: String,
    days: u32,
    tier: String,
}

impl HttpColdStorageClient {
    pub fn new(
        provider: impl Into<String>,
        credentials: Credentials,
        region: impl Into<String>,
        days: u32,
        tier: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider: provider.into(),
            credentials,
            region: region.into(),
            days,
            tier: tier.into(),
        }
    }
}

#[async_trait]
impl ColdStorageClient for HttpColdStorageClient {
    async fn request_restore(&self, url: &str) -> ColdStorageResult<u16> {
        info!(provider = %self.provider, "🧊 Requesting restoration of {}", url);
        let post_url = Url::parse(&format!("{url}?restore="))
            .map_err(|e| ColdStorageError::transport(url, format!("invalid URL: {e}")))?;
        let body = restore_request_body(self.days, &self.tier);
        let signed = sign_request(
            "POST",
            &post_url,
            body.as_bytes(),
            &self.credentials,
            &self.region,
            "s3",
            Utc::now(),
        )?;

        let response = self
            .http
            .post(post_url)
            .header("X-Amz-Date", &signed.amz_date)
            .header("X-Amz-Content-Sha256", &signed.content_sha256)
            .header("Authorization", &signed.authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| ColdStorageError::transport(url, e.to_string()))?;

        let status = response.status().as_u16();
        match response.text().await {
            Ok(text) => debug!(
                provider = %self.provider,
                status = status,
                body = %text,
                "🧊 Restore response for {}", url
            ),
            Err(e) => warn!(provider = %self.provider, "Could not read restore response for {}: {}", url, e),
        }
        Ok(status)
    }

    fn provider_name(&self) -> &str {
        &self.provider
    }
}

/// Answers restore requests from a fixed table of URL to status. Unlisted URLs
/// answer 200.
#[derive(Debug, Default)]
pub struct InMemoryColdStorageClient {
    statuses: Mutex<HashMap<String, u16>>,
    requests: Mutex<Vec<String>>,
}

impl InMemoryColdStorageClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, url: impl Into<String>, status: u16) {
        self.statuses.lock().insert(url.into(), status);
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ColdStorageClient for InMemoryColdStorageClient {
    async fn request_restore(&self, url: &str) -> ColdStorageResult<u16> {
        self.requests.lock().push(url.to_string());
        Ok(self.statuses.lock().get(url).copied().unwrap_or(200))
    }

    fn provider_name(&self) -> &str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpColdStorageClient {
        HttpColdStorageClient::new(
            "AWS",
            Credentials {
                access_key_id: "AKIDEXAMPLE".to_string(),
                secret_access_key: "secret".to_string(),
            },
            "us-east-1",
            10,
            "Standard",
        )
    }

    #[test]
    fn test_request_body() {
        assert_eq!(
            restore_request_body(10, "Standard"),
            "<RestoreRequest><Days>10</Days><GlacierJobParameters><Tier>Standard</Tier></GlacierJobParameters></RestoreRequest>"
        );
    }

    #[tokio::test]
    async fn test_signed_restore_request() {
        let server = MockServer::start().await;
        let body = restore_request_body(10, "Standard");

        Mock::given(method("POST"))
            .and(path("/glacier.bucket/abc-123"))
            .and(query_param("restore", ""))
            .and(header("Content-Length", body.len().to_string().as_str()))
            .and(header_exists("X-Amz-Date"))
            .and(header_exists("X-Amz-Content-Sha256"))
            .and(header_exists("Authorization"))
            .and(body_string(body.clone()))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/glacier.bucket/abc-123", server.uri());
        let status = client().request_restore(&url).await.unwrap();
        assert_eq!(status, 202);
    }

    #[tokio::test]
    async fn test_status_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/glacier.bucket/missing", server.uri());
        assert_eq!(client().request_restore(&url).await.unwrap(), 404);
    }

    #[tokio::test]
    async fn test_transport_error() {
        let err = client()
            .request_restore("http://127.0.0.1:1/glacier.bucket/x")
            .await
            .unwrap_err();
        assert!(matches!(err, ColdStorageError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_in_memory_client() {
        let client = InMemoryColdStorageClient::new();
        client.set_status("https://x/b/1", 409);
        assert_eq!(client.request_restore("https://x/b/1").await.unwrap(), 409);
        assert_eq!(client.request_restore("https://x/b/2").await.unwrap(), 200);
        assert_eq!(client.requests().len(), 2);
    }
}
