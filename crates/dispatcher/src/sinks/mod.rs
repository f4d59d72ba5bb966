//! Sink adapters
//!
//! Contains StreamAdapter and BulkIndexAdapter, plus the signing/sending
//! client and parameter helpers they share.

mod bulk;
mod stream;

pub use self::bulk::{BulkIndexAdapter, BulkIndexSinkConfig, BulkResponse, IndexName, POSTPONED_ID};
pub use self::stream::{StreamAdapter, StreamSinkConfig};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tracing::debug;

use contracts::{
    ContractError, DeliveryError, HttpReply, HttpTransport, RequestSigner, SignableRequest,
};

use crate::transport::DEFAULT_REQUEST_TIMEOUT;

/// Signs and sends requests on behalf of an adapter
pub struct SinkClient<T> {
    transport: T,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl<T: HttpTransport + Sync> SinkClient<T> {
    /// Client without a signer
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            signer: None,
        }
    }

    /// Attach a signer
    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sign (if configured) and send. Both failure kinds surface as transport errors.
    pub async fn send(
        &self,
        sink: &str,
        request: &mut SignableRequest,
    ) -> Result<HttpReply, DeliveryError> {
        if let Some(signer) = &self.signer {
            signer
                .sign(request)
                .map_err(|e| DeliveryError::transport(sink, e.to_string()))?;
        }

        let reply = self
            .transport
            .send(request)
            .await
            .map_err(|e| DeliveryError::transport(sink, e.to_string()))?;
        debug!(sink, status = reply.status, "Sink replied");
        Ok(reply)
    }
}

/// Endpoint location parsed from the `url` parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Base URL without trailing slash
    pub base: String,
    /// Value for the `host` header
    pub host: String,
}

impl Endpoint {
    pub(crate) fn parse(raw: &str) -> Result<Self, ContractError> {
        let url = Url::parse(raw)
            .map_err(|e| ContractError::config_validation("url", format!("invalid url '{raw}': {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| ContractError::config_validation("url", format!("url '{raw}' has no host")))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            base: raw.trim_end_matches('/').to_string(),
            host,
        })
    }
}

pub(crate) fn required_param<'a>(
    params: &'a HashMap<String, String>,
    key: &str,
) -> Result<&'a str, ContractError> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            ContractError::config_validation(key, format!("missing required parameter '{key}'"))
        })
}

/// `timeout_secs` parameter, defaulting to 30 seconds
pub(crate) fn timeout_param(params: &HashMap<String, String>) -> Result<Duration, ContractError> {
    match params.get("timeout_secs") {
        None => Ok(DEFAULT_REQUEST_TIMEOUT),
        Some(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ContractError::config_validation(
                    "timeout_secs",
                    format!("invalid timeout '{raw}', expected a positive number of seconds"),
                )
            }),
    }
}
