//! Error types for the maestro engine.
//!
//! [`Error`] covers every failure mode in the engine: provider transport
//! and HTTP status classes, cancellation and deadlines, model-output
//! parsing, tool dispatch, and catalog lookups. Retryable transport
//! failures are recovered inside the model client; everything else
//! surfaces to the caller.

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The engine-wide error type.
///
/// Each variant represents a distinct failure mode, enabling callers to
/// pattern-match on specific cases (e.g., retrying transient errors).
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Authentication failure (HTTP 401).
    #[error("Authentication failed: {message}")]
    Auth {
        /// Error description from the provider.
        message: String,
    },

    /// Authorization failure (HTTP 403).
    #[error("Permission denied: {message}")]
    Permission {
        /// Error description from the provider.
        message: String,
    },

    /// Unknown model or endpoint (HTTP 404).
    #[error("Not found: {message}")]
    NotFound {
        /// Error description from the provider.
        message: String,
    },

    /// The provider rejected the request shape (HTTP 422).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Error description from the provider.
        message: String,
    },

    /// Rate limit exceeded (HTTP 429). Retryable.
    #[error("Rate limit exceeded")]
    RateLimited {
        /// Seconds to wait, when the provider sent `Retry-After`.
        retry_after: Option<u64>,
    },

    /// Provider-side failure (HTTP 5xx). Retryable.
    #[error("Server error (HTTP {status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body or description.
        message: String,
    },

    /// Network or connection error. Retryable.
    #[error("HTTP error: {message}")]
    Http {
        /// The underlying error description.
        message: String,
    },

    /// The operation was cancelled via its cancellation handle.
    #[error("Operation cancelled")]
    Cancelled,

    /// A per-agent deadline expired.
    #[error("Agent timed out after {seconds}s")]
    Timeout {
        /// The deadline that expired, in seconds.
        seconds: u64,
    },

    /// Model output could not be parsed into the expected shape.
    #[error("Parse error: {message}")]
    Parse {
        /// What failed to parse.
        message: String,
    },

    /// Tool execution failed or the tool was rejected by validation.
    #[error("Tool error ({tool}): {message}")]
    Tool {
        /// Name of the failing tool.
        tool: String,
        /// The underlying error description.
        message: String,
    },

    /// No agent spec is registered for the requested domain.
    #[error("No agent available for domain '{domain}'")]
    AgentUnavailable {
        /// The domain that had no registered specialist.
        domain: String,
    },

    /// The ReAct loop exhausted its iteration budget.
    #[error("Reached maximum iterations ({max_iterations})")]
    MaxIterations {
        /// The exhausted budget.
        max_iterations: usize,
    },

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// The underlying error description.
        message: String,
    },
}

impl Error {
    /// Create an authentication error.
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a permission error.
    #[must_use]
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an invalid-request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a server error.
    #[must_use]
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Create a parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a tool error.
    #[must_use]
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create an agent-unavailable error.
    #[must_use]
    pub fn agent_unavailable(domain: impl Into<String>) -> Self {
        Self::AgentUnavailable {
            domain: domain.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify an HTTP status code into the matching error kind.
    #[must_use]
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => Self::Auth { message: body },
            403 => Self::Permission { message: body },
            404 => Self::NotFound { message: body },
            422 => Self::InvalidRequest { message: body },
            429 => Self::RateLimited { retry_after: None },
            s if s >= 500 => Self::Server {
                status: s,
                message: body,
            },
            s => Self::Http {
                message: format!("HTTP {s}: {body}"),
            },
        }
    }

    /// Check if this error is worth retrying at the transport level.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Server { .. } | Self::Http { .. })
    }

    /// Check if this error was caused by cancellation or a deadline.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout { .. })
    }

    /// Short kind label for one-line user-facing reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Permission { .. } => "permission",
            Self::NotFound { .. } => "not_found",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::Server { .. } => "server",
            Self::Http { .. } => "http",
            Self::Cancelled => "cancelled",
            Self::Timeout { .. } => "timeout",
            Self::Parse { .. } => "parse",
            Self::Tool { .. } => "tool",
            Self::AgentUnavailable { .. } => "agent_unavailable",
            Self::MaxIterations { .. } => "max_iterations",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Http {
                message: "Request timed out".to_owned(),
            }
        } else if err.is_connect() {
            Self::Http {
                message: format!("Connection failed: {err}"),
            }
        } else {
            Self::Http {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(Error::from_status(401, String::new()), Error::Auth { .. }));
        assert!(matches!(Error::from_status(403, String::new()), Error::Permission { .. }));
        assert!(matches!(Error::from_status(404, String::new()), Error::NotFound { .. }));
        assert!(matches!(Error::from_status(422, String::new()), Error::InvalidRequest { .. }));
        assert!(matches!(Error::from_status(429, String::new()), Error::RateLimited { .. }));
        assert!(matches!(Error::from_status(500, String::new()), Error::Server { status: 500, .. }));
        assert!(matches!(Error::from_status(503, String::new()), Error::Server { status: 503, .. }));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::RateLimited { retry_after: None }.is_retryable());
        assert!(Error::server(502, "bad gateway").is_retryable());
        assert!(!Error::auth("bad key").is_retryable());
        assert!(!Error::invalid_request("bad shape").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn test_display_is_single_line() {
        let err = Error::tool("write_file", "disk full");
        assert_eq!(err.to_string(), "Tool error (write_file): disk full");
        assert!(!err.to_string().contains('\n'));
    }
}
