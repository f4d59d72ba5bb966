//! Request/response envelopes shared by adapters, signers and transports.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;

use crate::ContractError;

/// An outgoing HTTP request that a signer may still mutate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignableRequest {
    /// HTTP method
    pub method: String,
    /// Base endpoint, e.g. `https://search.example.com`
    pub endpoint: String,
    /// Path below the endpoint, e.g. `/_bulk`
    pub uri: String,
    /// Request headers
    pub headers: BTreeMap<String, String>,
    /// Query parameters
    pub query_params: BTreeMap<String, String>,
    /// Body
    pub payload: Bytes,
}

impl SignableRequest {
    /// Create a POST request with the given body
    pub fn post(endpoint: impl Into<String>, uri: impl Into<String>, payload: Bytes) -> Self {
        Self {
            method: "POST".to_string(),
            endpoint: endpoint.into(),
            uri: uri.into(),
            headers: BTreeMap::new(),
            query_params: BTreeMap::new(),
            payload,
        }
    }

    /// Builder-style header insert
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Merge headers produced by a signer
    pub fn add_signed_headers(&mut self, headers: impl IntoIterator<Item = (String, String)>) {
        self.headers.extend(headers);
    }

    /// Full URL without query string
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.uri.trim_start_matches('/')
        )
    }

    /// First `limit` bytes of the payload as lossy UTF-8, for diagnostics
    pub fn payload_snippet(&self, limit: usize) -> String {
        let end = self.payload.len().min(limit);
        String::from_utf8_lossy(&self.payload[..end]).into_owned()
    }
}

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Bytes,
}

impl HttpReply {
    /// Create a reply
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Adds authentication to a built request.
///
/// Implementations may only touch headers.
pub trait RequestSigner: Send + Sync + fmt::Debug {
    /// Sign the request in place
    ///
    /// # Errors
    /// Returns `ContractError::Signing` when credentials are unavailable
    fn sign(&self, request: &mut SignableRequest) -> Result<(), ContractError>;
}

/// HTTP transport used by sink adapters.
///
/// Implementations are shared across every in-flight batch, so `send` takes
/// `&self` and must tolerate concurrent calls.
#[trait_variant::make(HttpTransport: Send)]
pub trait LocalHttpTransport {
    /// Send the request and return whatever status the server answered with
    ///
    /// # Errors
    /// Returns `ContractError::Transport` when no response was obtained
    async fn send(&self, request: &SignableRequest) -> Result<HttpReply, ContractError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let req = SignableRequest::post("http://localhost:9200/", "/_bulk", Bytes::new());
        assert_eq!(req.url(), "http://localhost:9200/_bulk");
        let req = SignableRequest::post("http://localhost:9200", "_bulk", Bytes::new());
        assert_eq!(req.url(), "http://localhost:9200/_bulk");
    }

    #[test]
    fn test_payload_snippet_is_bounded() {
        let req = SignableRequest::post("http://h", "/", Bytes::from(vec![b'a'; 5000]));
        assert_eq!(req.payload_snippet(3000).len(), 3000);
        let short = SignableRequest::post("http://h", "/", Bytes::from_static(b"abc"));
        assert_eq!(short.payload_snippet(3000), "abc");
    }

    #[test]
    fn test_signed_headers_merge() {
        let mut req = SignableRequest::post("http://h", "/", Bytes::new()).with_header("host", "h");
        req.add_signed_headers([("authorization".to_string(), "Basic x".to_string())]);
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.headers["authorization"], "Basic x");
    }

    #[test]
    fn test_reply_success_range() {
        assert!(HttpReply::new(200, "").is_success());
        assert!(HttpReply::new(204, "").is_success());
        assert!(!HttpReply::new(400, "").is_success());
        assert!(!HttpReply::new(503, "").is_success());
    }
}
