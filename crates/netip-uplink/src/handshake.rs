//! HTTP identity exchange with the control plane.

use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::config::UplinkConfig;
use crate::error::{Result, UplinkError};
use crate::protocol::{
    HANDSHAKE_ROUTE, HEADER_KEY, HEADER_VERSION, HEADER_VERSION_HASH, HandshakeResponse,
    HandshakeTicket, Identity, IdentityPayload,
};

/// One-shot request/response client that trades identity for a stream ticket
#[derive(Debug, Clone)]
pub struct HandshakeClient {
    http: reqwest::Client,
    url: String,
    connect_key: String,
    version: String,
    version_hash: String,
}

impl HandshakeClient {
    /// # Errors
    ///
    /// Returns `UplinkError::Http` if the TLS backend cannot be initialized.
    pub fn new(config: &UplinkConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect)
            .timeout(config.timeouts.request)
            .build()?;

        Ok(Self {
            http,
            url: handshake_url(&config.endpoint),
            connect_key: config.connect_key.clone(),
            version: config.version.clone(),
            version_hash: config.version_hash.clone(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Present the node's identity and receive where and how to open the stream.
    ///
    /// # Errors
    ///
    /// Hostname and payload failures are fatal. 5xx statuses, refusals and
    /// undecodable bodies are retryable; see [`UplinkError::class`].
    pub async fn dial(&self, identity: &Identity) -> Result<HandshakeTicket> {
        let payload = IdentityPayload {
            hostname: resolve_hostname()?,
            service: &identity.service,
            info: &identity.info,
        };
        let body = serde_json::to_vec(&payload).map_err(UplinkError::Identity)?;

        debug!("Handshake POST {} as {}", self.url, payload.hostname);

        let response = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(HEADER_KEY, &self.connect_key)
            .header(HEADER_VERSION, &self.version)
            .header(HEADER_VERSION_HASH, &self.version_hash)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(UplinkError::Status(status));
        }

        let bytes = response.bytes().await?;
        let parsed: HandshakeResponse =
            serde_json::from_slice(&bytes).map_err(UplinkError::Decode)?;

        if !parsed.ok {
            return Err(UplinkError::Rejected(parsed.message));
        }

        Ok(parsed.into_ticket())
    }
}

fn handshake_url(endpoint: &str) -> String {
    format!("{}{HANDSHAKE_ROUTE}", endpoint.trim_end_matches('/'))
}

fn resolve_hostname() -> Result<String> {
    let name = hostname::get().map_err(UplinkError::Hostname)?;
    name.into_string()
        .map_err(|_| UplinkError::Hostname(std::io::Error::other("hostname is not valid UTF-8")))
}
