//! HeaderSigner - static header authentication

use std::collections::{BTreeMap, HashMap};

use contracts::{ContractError, RequestSigner, SignableRequest};

/// Sink parameter prefix for signer headers, e.g. `header.Authorization`
const HEADER_PARAM_PREFIX: &str = "header.";

/// Signer that adds a fixed set of headers (basic/bearer auth, API keys)
#[derive(Clone, Default)]
pub struct HeaderSigner {
    headers: BTreeMap<String, String>,
}

impl HeaderSigner {
    /// Create a signer from explicit headers
    pub fn new(headers: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            headers: headers.into_iter().collect(),
        }
    }

    /// Collect `header.<Name>` sink parameters.
    ///
    /// Returns `None` when no such parameter is configured.
    pub fn from_params(params: &HashMap<String, String>) -> Option<Self> {
        let headers: BTreeMap<String, String> = params
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(HEADER_PARAM_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect();

        (!headers.is_empty()).then_some(Self { headers })
    }

    /// Header names this signer sets
    pub fn header_names(&self) -> impl Iterator<Item = &str> {
        self.headers.keys().map(String::as_str)
    }
}

// header values are credentials; keep them out of logs
impl std::fmt::Debug for HeaderSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderSigner")
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RequestSigner for HeaderSigner {
    fn sign(&self, request: &mut SignableRequest) -> Result<(), ContractError> {
        if let Some(empty) = self.headers.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ContractError::Signing {
                message: format!("header '{}' has no value", empty.0),
            });
        }
        request.add_signed_headers(self.headers.clone());
        Ok(())
    }
}
