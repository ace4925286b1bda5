//! Error types for pr-herd

use std::fmt;
use thiserror::Error;

/// Classification of a failed provider operation
///
/// Only [`ErrorKind::RateLimit`] and [`ErrorKind::Network`] are retried by the
/// behavior manager; every other kind is terminal for that operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or missing credentials
    Auth,
    /// Credentials valid but not allowed to perform the operation
    Permission,
    /// Repository, pull request or endpoint does not exist
    NotFound,
    /// State conflict (e.g. PR not mergeable, head changed)
    Conflict,
    /// Request rejected as invalid
    Validation,
    /// Upstream quota exhausted
    RateLimit,
    /// Transport failure or upstream 5xx
    Network,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    /// Whether an operation failing with this kind may succeed when retried
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Network)
    }

    /// Classify an HTTP status code
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Auth,
            403 => Self::Permission,
            404 => Self::NotFound,
            405 | 409 => Self::Conflict,
            422 => Self::Validation,
            429 => Self::RateLimit,
            500..=599 => Self::Network,
            _ => Self::Unknown,
        }
    }

    /// Classify an HTTP status code, looking at the response text for rate-limit hints
    ///
    /// GitHub answers exhausted primary and secondary quotas with 403.
    pub fn from_response(status: u16, body: &str) -> Self {
        let kind = Self::from_status(status);
        if kind == Self::Permission && body.to_ascii_lowercase().contains("rate limit") {
            Self::RateLimit
        } else {
            kind
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::RateLimit => "rate-limit",
            Self::Network => "network",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Errors that can occur in pr-herd
#[derive(Error, Debug)]
pub enum Error {
    /// A provider call failed
    #[error("{provider} ({kind}): {message}")]
    Provider {
        /// Provider name (or kind, when raised inside an adapter)
        provider: String,
        /// Failure classification
        kind: ErrorKind,
        /// Upstream message
        message: String,
    },

    /// A retryable operation kept failing
    #[error("{provider} {operation} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        /// Provider name
        provider: String,
        /// Operation name
        operation: String,
        /// Number of attempts made
        attempts: u32,
        /// The last error
        #[source]
        source: Box<Error>,
    },

    /// The run was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Nothing to do: no providers configured
    #[error("no providers configured")]
    NoProviders,

    /// Nothing to do: no repositories configured
    #[error("no repositories configured")]
    NoRepositories,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing or unusable credentials
    #[error("authentication error: {0}")]
    Auth(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (bug)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a provider error
    pub fn provider(provider: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    /// Classification of this error
    ///
    /// Wrapped errors report the kind of the error they wrap.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider { kind, .. } => *kind,
            Self::RetriesExhausted { source, .. } => source.kind(),
            Self::Auth(_) => ErrorKind::Auth,
            Self::Config(_) => ErrorKind::Validation,
            Self::Io(_) => ErrorKind::Network,
            Self::Cancelled | Self::NoProviders | Self::NoRepositories | Self::Internal(_) => {
                ErrorKind::Unknown
            }
        }
    }

    /// Whether this error is (or wraps) a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::RetriesExhausted { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<octocrab::Error> for Error {
    fn from(err: octocrab::Error) -> Self {
        let kind = match &err {
            octocrab::Error::GitHub { source, .. } => {
                ErrorKind::from_response(source.status_code.as_u16(), &source.message)
            }
            octocrab::Error::Hyper { .. } | octocrab::Error::Service { .. } => ErrorKind::Network,
            _ => ErrorKind::Unknown,
        };
        Self::provider("GitHub", kind, err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if let Some(status) = err.status() {
            ErrorKind::from_status(status.as_u16())
        } else if err.is_timeout() || err.is_connect() || err.is_request() {
            ErrorKind::Network
        } else if err.is_decode() {
            ErrorKind::Validation
        } else {
            ErrorKind::Unknown
        };
        Self::provider("http", kind, err.to_string())
    }
}

/// Result type alias for pr-herd operations
pub type Result<T> = std::result::Result<T, Error>;
