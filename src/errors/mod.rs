use std::fmt;
use thiserror::Error;

/// Upstream conditions that the conversation engine is allowed to retry.
///
/// Anything not listed here is surfaced to the caller instead of being
/// retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientFailure {
    /// HTTP 504 from a proxy sitting in front of the model server.
    GatewayTimeout,
    /// HTTP 524, the Cloudflare flavour of an origin timeout.
    OriginTimeout,
    /// The HTTP client gave up waiting for a response.
    RequestTimeout,
}

impl TransientFailure {
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            504 => Some(Self::GatewayTimeout),
            524 => Some(Self::OriginTimeout),
            _ => None,
        }
    }
}

impl fmt::Display for TransientFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GatewayTimeout => write!(f, "gateway timeout"),
            Self::OriginTimeout => write!(f, "origin timeout"),
            Self::RequestTimeout => write!(f, "request timeout"),
        }
    }
}

/// Typed error hierarchy for ollacord.
///
/// Use at module boundaries (provider calls, context persistence, config validation).
/// Internal/leaf functions can continue using `anyhow::Result`; the `Internal` variant
/// allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum OllacordError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Context error: {0}")]
    Context(String),

    #[error("Upstream {kind}: {message}")]
    Transient {
        kind: TransientFailure,
        message: String,
    },

    #[error("Provider error: {message}")]
    Provider {
        message: String,
        status: Option<u16>,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `OllacordError`.
pub type OllacordResult<T> = std::result::Result<T, OllacordError>;

impl OllacordError {
    /// Whether this error is transient and the model request should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Recover the typed error carried by an `anyhow::Error`, wrapping
    /// anything else as `Internal`.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<Self>() {
            Ok(typed) => typed,
            Err(other) => Self::Internal(other),
        }
    }
}
