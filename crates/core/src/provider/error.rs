//! Error types for provider calls.

use thiserror::Error;

use crate::credentials::CredentialError;
use crate::descriptor::DescriptorError;

/// Errors that can occur while calling a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection refused, reset or otherwise failed before a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request exceeded the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The provider answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A required response field was absent.
    #[error("Response is missing {key} (expected at {path})")]
    MissingField { key: String, path: String },

    /// The response body could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The endpoint descriptor is malformed.
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Reading a local file for upload failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The API key could not be decrypted.
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The provider has no endpoint for this operation.
    #[error("Operation not supported by provider {provider}: {operation}")]
    Unsupported { provider: String, operation: String },
}

impl ProviderError {
    /// Whether retrying the same call may succeed.
    ///
    /// Connection failures, timeouts, local I/O and server-side HTTP errors
    /// (5xx, 408, 429) qualify. Credential, descriptor and other client
    /// errors do not.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::Timeout | ProviderError::Io(_) => true,
            ProviderError::Http { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }

    /// Short label used in metrics and usage events.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Transport(_) => "transport",
            ProviderError::Timeout => "timeout",
            ProviderError::Http { .. } => "http",
            ProviderError::MissingField { .. } => "missing_field",
            ProviderError::InvalidResponse(_) => "invalid_response",
            ProviderError::Descriptor(_) => "descriptor",
            ProviderError::Io(_) => "io",
            ProviderError::Credential(_) => "credential",
            ProviderError::Unsupported { .. } => "unsupported",
        }
    }

    /// HTTP status when the provider answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialError;

    fn http(status: u16) -> ProviderError {
        ProviderError::Http {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Transport("reset".into()).is_transient());
        assert!(ProviderError::Timeout.is_transient());
        assert!(http(503).is_transient());
        assert!(http(429).is_transient());

        assert!(!http(401).is_transient());
        assert!(!http(404).is_transient());
        assert!(!ProviderError::Credential(CredentialError::MissingUserId).is_transient());
        assert!(!ProviderError::InvalidResponse("bad method".into()).is_transient());
    }
}
