//! Layered error definitions
//!
//! `ContractError` covers configuration, event and template problems.
//! `DeliveryError` is the terminal failure taxonomy of a batch delivery.

use thiserror::Error;

use crate::EventId;

/// Unified error type for configuration and data-model failures
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Data Errors =====
    /// Event payload could not be interpreted
    #[error("invalid event: {message}")]
    InvalidEvent { message: String },

    /// Template could not be compiled
    #[error("invalid template '{template}': {message}")]
    Template { template: String, message: String },

    // ===== Transport Errors =====
    /// Request signing failed
    #[error("request signing failed: {message}")]
    Signing { message: String },

    /// No response could be obtained from the remote endpoint
    #[error("transport error: {message}")]
    Transport { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create invalid event error
    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            message: message.into(),
        }
    }

    /// Create transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Terminal failure of a batch delivery.
///
/// Cloneable so the same terminal value can be replayed to every subscriber
/// of a completion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// No response was obtained (connection, timeout, signing, unexpected status)
    #[error("sink '{sink}' transport error: {message}")]
    Transport { sink: String, message: String },

    /// The sink rejected the whole request as invalid
    #[error("sink '{sink}' rejected request with status {status}: {body}\nrequest: {request_snippet}")]
    FatalRequest {
        sink: String,
        status: u16,
        body: String,
        request_snippet: String,
    },

    /// Retryable failures remained after the last permitted attempt
    #[error("sink '{sink}' gave up after {attempts} attempts with {} unresolved events", unresolved.len())]
    RetryExhausted {
        sink: String,
        attempts: u32,
        unresolved: Vec<EventId>,
    },

    /// The request could not be built from the configured settings
    #[error("sink '{sink}' configuration error: {message}")]
    Configuration { sink: String, message: String },

    /// The delivery ended without producing a terminal value
    #[error("delivery abandoned before completion")]
    Abandoned,
}

impl DeliveryError {
    /// Create transport error
    pub fn transport(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Create configuration error
    pub fn configuration(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::FatalRequest { .. } => "fatal_request",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::Configuration { .. } => "configuration",
            Self::Abandoned => "abandoned",
        }
    }
}
