//! Relay HTTP client
//!
//! Talks to the sync relay's REST API. The relay only ever sees base64
//! ciphertext, the plaintext digest and the format version:
//!
//! - `PUT /v1/users/{user}/devices/{device}/snapshot` stores a snapshot and
//!   returns `{ "lastModified": ... }`
//! - `GET /v1/users/{user}/snapshot/latest` returns the latest record, 404 when
//!   the user has none
//! - `PUT /v1/users/{user}/devices/{device}` updates device metadata

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{EncryptedPayload, RemoteRecord};
use crate::ports::RemoteStore;

/// Relay REST client
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreResponse {
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceMetadataRequest<'a> {
    device_name: &'a str,
    version: &'a str,
}

impl HttpRemoteStore {
    /// Create a client for the relay at `base_url`.
    ///
    /// `timeout` bounds every request at the transport level; the
    /// orchestrator applies its own deadline on top.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid relay URL '{}': {}", base_url, e)))?;

        if !matches!(base_url.scheme(), "https" | "http") {
            return Err(Error::Config("Relay URL must use HTTP(S)".into()));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("finsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config("Relay URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn snapshot_url(&self, user_id: &str, device_id: Uuid) -> Result<Url> {
        let device = device_id.to_string();
        self.endpoint(&["v1", "users", user_id, "devices", &device, "snapshot"])
    }

    fn latest_url(&self, user_id: &str) -> Result<Url> {
        self.endpoint(&["v1", "users", user_id, "snapshot", "latest"])
    }

    fn device_url(&self, user_id: &str, device_id: Uuid) -> Result<Url> {
        let device = device_id.to_string();
        self.endpoint(&["v1", "users", user_id, "devices", &device])
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.authorize(request)
            .send()
            .await
            .map_err(map_request_error)
    }
}

/// Map request errors to user-friendly messages
fn map_request_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::network("Relay request timed out")
    } else if error.is_connect() {
        Error::network("Unable to connect to the sync relay")
    } else {
        Error::network(format!("Relay request failed: {}", error))
    }
}

/// Check response status and return appropriate errors
fn check_response_status(response: &Response) -> Result<()> {
    match response.status() {
        status if status.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::network(
            "Relay rejected the credentials for this account",
        )),
        StatusCode::PAYLOAD_TOO_LARGE => Err(Error::network("Snapshot too large for the relay")),
        status => Err(Error::network(format!("Relay error: HTTP {}", status.as_u16()))),
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn store_snapshot(
        &self,
        user_id: &str,
        device_id: Uuid,
        payload: &EncryptedPayload,
    ) -> Result<DateTime<Utc>> {
        let url = self.snapshot_url(user_id, device_id)?;
        debug!(%url, bytes = payload.ciphertext.len(), "Uploading snapshot");

        let response = self.send(self.client.put(url).json(payload)).await?;
        check_response_status(&response)?;

        let body: StoreResponse = response
            .json()
            .await
            .map_err(|e| Error::network(format!("Invalid relay response: {}", e)))?;
        Ok(body.last_modified)
    }

    async fn fetch_latest_snapshot(&self, user_id: &str) -> Result<Option<RemoteRecord>> {
        let url = self.latest_url(user_id)?;
        debug!(%url, "Fetching latest snapshot");

        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_response_status(&response)?;

        let record = response
            .json::<RemoteRecord>()
            .await
            .map_err(|e| Error::network(format!("Invalid relay response: {}", e)))?;
        Ok(Some(record))
    }

    async fn update_device_metadata(
        &self,
        user_id: &str,
        device_id: Uuid,
        device_name: &str,
        version: &str,
    ) -> Result<()> {
        let url = self.device_url(user_id, device_id)?;
        let body = DeviceMetadataRequest {
            device_name,
            version,
        };

        let response = self.send(self.client.put(url).json(&body)).await?;
        check_response_status(&response)
    }
}

/// Stand-in used when no relay URL is configured. Every call fails with a
/// configuration error, so local-only commands keep working.
#[derive(Debug, Default)]
pub struct UnconfiguredRelay;

impl UnconfiguredRelay {
    fn error() -> Error {
        Error::Config("no relay configured (set sync.relayUrl or FINSYNC_RELAY_URL)".into())
    }
}

#[async_trait]
impl RemoteStore for UnconfiguredRelay {
    async fn store_snapshot(
        &self,
        _user_id: &str,
        _device_id: Uuid,
        _payload: &EncryptedPayload,
    ) -> Result<DateTime<Utc>> {
        Err(Self::error())
    }

    async fn fetch_latest_snapshot(&self, _user_id: &str) -> Result<Option<RemoteRecord>> {
        Err(Self::error())
    }

    async fn update_device_metadata(
        &self,
        _user_id: &str,
        _device_id: Uuid,
        _device_name: &str,
        _version: &str,
    ) -> Result<()> {
        Err(Self::error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(url: &str) -> HttpRemoteStore {
        HttpRemoteStore::new(url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_urls() {
        assert!(matches!(
            HttpRemoteStore::new("not a url", Duration::from_secs(1)),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            HttpRemoteStore::new("ftp://relay.example.com", Duration::from_secs(1)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_endpoints() {
        let relay = store("https://relay.example.com/api");
        let device = Uuid::nil();

        assert_eq!(
            relay.snapshot_url("user-1", device).unwrap().as_str(),
            "https://relay.example.com/api/v1/users/user-1/devices/00000000-0000-0000-0000-000000000000/snapshot"
        );
        assert_eq!(
            relay.latest_url("user-1").unwrap().as_str(),
            "https://relay.example.com/api/v1/users/user-1/snapshot/latest"
        );
        assert_eq!(
            relay.device_url("user-1", device).unwrap().as_str(),
            "https://relay.example.com/api/v1/users/user-1/devices/00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_user_id_is_percent_encoded() {
        let relay = store("https://relay.example.com/");
        let url = relay.latest_url("a/b c").unwrap();
        assert_eq!(
            url.as_str(),
            "https://relay.example.com/v1/users/a%2Fb%20c/snapshot/latest"
        );
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let relay = HttpRemoteStore::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = relay.fetch_latest_snapshot("user-1").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_relay_reports_config_error() {
        let relay = UnconfiguredRelay;
        assert!(matches!(
            relay.fetch_latest_snapshot("user-1").await,
            Err(Error::Config(_))
        ));
        assert!(matches!(
            relay.latest_modified("user-1").await,
            Err(Error::Config(_))
        ));
    }
}
