//! ReqwestTransport - HTTP transport over a shared connection pool

use std::time::Duration;

use reqwest::{Client, Method};
use tracing::{debug, instrument};

use contracts::{ContractError, HttpReply, HttpTransport, SignableRequest};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport backed by a `reqwest::Client`.
///
/// Clones share the client's connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Wrap an existing client
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Build a client suitable for sharing across sinks
    pub fn shared_client() -> Result<Client, ContractError> {
        Client::builder()
            .build()
            .map_err(|e| ContractError::transport(format!("failed to build HTTP client: {e}")))
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl HttpTransport for ReqwestTransport {
    #[instrument(
        name = "reqwest_transport_send",
        skip(self, request),
        fields(url = %request.url(), bytes = request.payload.len())
    )]
    async fn send(&self, request: &SignableRequest) -> Result<HttpReply, ContractError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ContractError::transport(format!("invalid method: {e}")))?;

        let mut builder = self
            .client
            .request(method, request.url())
            .timeout(self.timeout)
            .body(request.payload.clone());
        if !request.query_params.is_empty() {
            builder = builder.query(&request.query_params);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ContractError::transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ContractError::transport(format!("failed to read body: {e}")))?;

        debug!(status, body_bytes = body.len(), "Response received");
        Ok(HttpReply::new(status, body))
    }
}
