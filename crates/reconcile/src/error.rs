//! Error types for the reconciliation engine.
//!
//! Provider errors carry both a discriminant code (when the provider sent
//! one) and a structural category, so rule sets can match on either.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Structural category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Request rate limiting applied by the client or the service
    Throttling,
    /// The request never reached the service (connection, DNS, TLS)
    Transport,
    /// The request or its response timed out
    Timeout,
    /// The service answered with an error
    Service,
    /// Anything else
    Unknown,
}

impl ErrorCategory {
    /// Whether this category is typically transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttling | Self::Transport | Self::Timeout)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Throttling => "throttling",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Service => "service",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// An error raised by a provider API call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}", describe(.code, .category, .message))]
pub struct ProviderError {
    /// Provider-specific error code, e.g. "DBInstanceNotFound"
    pub code: Option<String>,
    /// Structural category
    pub category: ErrorCategory,
    /// Message as returned by the provider
    pub message: String,
}

impl ProviderError {
    /// A service error with a discriminant code.
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            category: ErrorCategory::Service,
            message: message.into(),
        }
    }

    /// An error known only by its category.
    pub fn categorized(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            code: None,
            category,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Whether the error carries the given code.
    pub fn has_code(&self, code: &str) -> bool {
        self.code() == Some(code)
    }
}

/// Code first when the provider sent one, the category otherwise
fn describe(code: &Option<String>, category: &ErrorCategory, message: &str) -> String {
    match code {
        Some(code) => format!("{code}: {message}"),
        None => format!("{category} error: {message}"),
    }
}

/// Engine errors unrelated to the provider.
#[derive(Debug, Error)]
pub enum Error {
    /// A sub-context could not be decoded into the requested type
    #[error("invalid sub-context '{name}': {source}")]
    SubContextDecode {
        name: String,
        source: serde_json::Error,
    },

    /// A sub-context could not be encoded
    #[error("could not store sub-context '{name}': {source}")]
    SubContextEncode {
        name: String,
        source: serde_json::Error,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
