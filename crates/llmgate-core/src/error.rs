//! Error types for llmgate

use std::time::Duration;

use thiserror::Error;

/// Result type alias using llmgate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for gateway operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, fatal at construction time
    #[error("Configuration error: {0}")]
    Config(String),

    /// The resolved provider failed
    #[error("Provider {provider} failed: {source}")]
    Provider {
        /// Identity of the provider that failed
        provider: String,
        /// Underlying provider error
        #[source]
        source: ProviderError,
    },

    /// The caller cancelled the request before an outcome was determined
    #[error("Request cancelled")]
    Cancelled,

    /// The caller-supplied deadline elapsed before an outcome was determined
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The agent exceeded its request rate
    #[error("Rate limit exceeded for agent {agent_id}")]
    RateLimited {
        /// Agent that was throttled
        agent_id: String,
        /// Time until the next request would be admitted
        retry_after: Duration,
    },

    /// Not found error
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity
        entity: String,
        /// Identifier that was looked up
        id: String,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Broad classification of an [`Error`] for callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Misconfiguration; should not occur after a successful startup
    Configuration,
    /// Provider-level failure; transient, the caller may retry
    Provider,
    /// Caller-initiated cancellation or deadline
    Cancellation,
    /// Malformed or unknown request
    Request,
    /// The caller is sending too fast; retry later
    RateLimit,
    /// Anything else
    Internal,
}

impl Error {
    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap a provider error with the identity of the provider that produced it
    pub fn provider(provider: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            provider: provider.into(),
            source,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration_error",
            Self::Provider { .. } => "provider_error",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Validation(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound { .. } => "not_found",
            Self::Internal(_) | Self::Io(_) => "internal_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// Which layer the failure belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Provider { .. } => ErrorCategory::Provider,
            Self::Cancelled | Self::DeadlineExceeded => ErrorCategory::Cancellation,
            Self::Validation(_) | Self::NotFound { .. } | Self::Serialization(_) => {
                ErrorCategory::Request
            }
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Internal(_) | Self::Io(_) => ErrorCategory::Internal,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Errors reported by provider clients
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The request never produced an HTTP response
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider API answered with an error status
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status returned by the provider
        status: u16,
        /// Provider error message
        message: String,
    },

    /// The provider rejected the request as invalid
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A stream broke before its terminal chunk
    #[error("stream error: {0}")]
    Stream(String),

    /// The provider's circuit breaker is open; the call was not attempted
    #[error("circuit breaker open")]
    CircuitOpen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_keeps_provider_context() {
        let err = Error::provider("openai", ProviderError::Transport("connection reset".into()));

        assert_eq!(err.code(), "provider_error");
        assert_eq!(err.category(), ErrorCategory::Provider);
        assert_eq!(
            err.to_string(),
            "Provider openai failed: transport error: connection reset"
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(Error::config("x").category(), ErrorCategory::Configuration);
        assert_eq!(Error::Cancelled.category(), ErrorCategory::Cancellation);
        assert_eq!(Error::DeadlineExceeded.code(), "deadline_exceeded");
        assert_eq!(Error::validation("x").category(), ErrorCategory::Request);

        let limited = Error::RateLimited {
            agent_id: "ada".to_string(),
            retry_after: Duration::from_millis(250),
        };
        assert_eq!(limited.code(), "rate_limited");
        assert_eq!(limited.category(), ErrorCategory::RateLimit);
        assert_eq!(limited.to_string(), "Rate limit exceeded for agent ada");
    }
}
