//! Error types for the threat-sweep crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! Errors are grouped by [`ErrorCategory`]; the scan pipeline wraps fatal causes in
//! [`Error::Phase`] so the message always names the phase that failed.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while collecting indicators or talking to the mailbox.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration errors (fatal, before any network call)
    // ─────────────────────────────────────────────────────────────────────────
    /// The configuration file could not be read.
    #[error("failed to read config file {}", path.display())]
    ConfigRead {
        /// Path of the configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON of the expected shape.
    #[error("failed to parse config file {}", path.display())]
    ConfigParse {
        /// Path of the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Required configuration keys are absent or blank.
    #[error("missing required configuration keys: {}", keys.join(", "))]
    MissingConfigKeys {
        /// Every missing key, in declaration order.
        keys: Vec<&'static str>,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Scan parameter validation errors (fatal, before any network call)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid email address format.
    #[error("invalid {field} email format: {email}")]
    InvalidEmailFormat {
        /// Which parameter carried the address (`user`, `summary`).
        field: &'static str,
        /// The invalid email address.
        email: String,
    },

    /// Message count outside the accepted range.
    #[error("top must be between {min} and {max}, got {top}")]
    TopOutOfRange {
        /// The rejected value.
        top: i64,
        /// Smallest accepted value.
        min: u32,
        /// Largest accepted value.
        max: u32,
    },

    /// Category label is empty after trimming.
    #[error("category must not be empty")]
    EmptyCategory,

    // ─────────────────────────────────────────────────────────────────────────
    // Feed errors (scoped to one source, absorbed by the collector)
    // ─────────────────────────────────────────────────────────────────────────
    /// A feed request failed at the transport level.
    #[error("feed '{feed}' request failed")]
    FeedRequest {
        /// Feed source name.
        feed: String,
        /// The underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// A feed answered with a non-success status.
    #[error("feed '{feed}' returned HTTP {status}")]
    FeedStatus {
        /// Feed source name.
        feed: String,
        /// The HTTP status received.
        status: reqwest::StatusCode,
    },

    /// An HTTP client could not be constructed.
    #[error("failed to build HTTP client")]
    HttpClient {
        /// The underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Authentication errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Token endpoint unreachable.
    #[error("token request failed")]
    TokenRequest {
        /// The underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// Token endpoint answered with a body that is not a token response.
    #[error("token response could not be decoded")]
    TokenDecode {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Token endpoint rejected the client credentials.
    #[error("token endpoint returned HTTP {status}: {body}")]
    TokenRejected {
        /// The HTTP status received.
        status: reqwest::StatusCode,
        /// Response body, truncated.
        body: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Graph API errors
    // ─────────────────────────────────────────────────────────────────────────
    /// A Graph request failed at the transport level.
    #[error("graph {operation} request failed")]
    GraphRequest {
        /// The Graph operation (`list_messages`, `tag_message`, ...).
        operation: &'static str,
        /// The underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// A Graph request answered with a non-success status.
    #[error("graph {operation} returned HTTP {status}: {body}")]
    GraphStatus {
        /// The Graph operation.
        operation: &'static str,
        /// The HTTP status received.
        status: reqwest::StatusCode,
        /// Response body, truncated.
        body: String,
    },

    /// A Graph response body could not be decoded.
    #[error("graph {operation} response could not be decoded")]
    GraphDecode {
        /// The Graph operation.
        operation: &'static str,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Timeout waiting for a network operation.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline
    // ─────────────────────────────────────────────────────────────────────────
    /// Indicator collection failed as a whole.
    #[error("indicator collection failed: {message}")]
    Collection {
        /// Description of the failure.
        message: String,
    },

    /// A pipeline phase failed; wraps the underlying cause.
    ///
    /// The cause is reachable through `source()`; use [`Error::full_message`]
    /// to render the whole chain.
    #[error("{phase} phase failed")]
    Phase {
        /// The phase that failed.
        phase: Phase,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Renders this error followed by every underlying cause, separated by `": "`.
    ///
    /// Transport failures only carry their detail (connection refused, DNS,
    /// TLS) in the source chain, so this is what should reach the user.
    #[must_use]
    pub fn full_message(&self) -> String {
        let mut message = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            message.push_str(": ");
            message.push_str(&err.to_string());
            cause = err.source();
        }
        message
    }

    /// Wraps `self` as the cause of a failed pipeline phase.
    #[must_use]
    pub fn in_phase(self, phase: Phase) -> Self {
        Error::Phase {
            phase,
            source: Box::new(self),
        }
    }

    /// Returns the phase this error was raised in, if it has been wrapped.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Returns the error category for logging purposes.
    ///
    /// Phase-wrapped errors report the category of their cause.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ConfigRead { .. }
            | Error::ConfigParse { .. }
            | Error::MissingConfigKeys { .. }
            | Error::InvalidConfig { .. }
            | Error::HttpClient { .. } => ErrorCategory::Configuration,

            Error::InvalidEmailFormat { .. }
            | Error::TopOutOfRange { .. }
            | Error::EmptyCategory => ErrorCategory::Validation,

            Error::FeedRequest { source, .. }
            | Error::GraphRequest { source, .. } => {
                if source.is_timeout() {
                    ErrorCategory::Timeout
                } else {
                    ErrorCategory::Network
                }
            }

            Error::Timeout { .. } => ErrorCategory::Timeout,

            Error::TokenRequest { .. } | Error::TokenRejected { .. } => ErrorCategory::Auth,

            Error::TokenDecode { .. } => ErrorCategory::Parse,

            Error::FeedStatus { .. } | Error::GraphStatus { .. } | Error::Collection { .. } => {
                ErrorCategory::Protocol
            }

            Error::GraphDecode { .. } => ErrorCategory::Parse,

            Error::Phase { source, .. } => source.category(),
        }
    }
}

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Scan parameter validation.
    Validate,
    /// Indicator collection from feeds.
    Collect,
    /// Message listing from the mailbox.
    Fetch,
    /// Category creation and message tagging.
    Tag,
    /// Summary email delivery.
    Report,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Validate => write!(f, "validate"),
            Phase::Collect => write!(f, "collect"),
            Phase::Fetch => write!(f, "fetch"),
            Phase::Tag => write!(f, "tag"),
            Phase::Report => write!(f, "report"),
        }
    }
}

/// Error categories for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration file or client setup errors.
    Configuration,
    /// Scan parameter validation errors.
    Validation,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// Unexpected HTTP status or protocol-level failures.
    Protocol,
    /// Token acquisition errors.
    Auth,
    /// Response decoding errors.
    Parse,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Auth => write!(f, "auth"),
            ErrorCategory::Parse => write!(f, "parse"),
        }
    }
}

/// Truncates a response body for inclusion in an error message.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = Error::InvalidEmailFormat {
            field: "user",
            email: "bad".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Validation);

        let err = Error::MissingConfigKeys {
            keys: vec!["tenant_id"],
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = Error::Timeout {
            operation: "list_messages",
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }

    #[test]
    fn test_phase_wrapping_names_phase_and_cause() {
        let err = Error::Collection {
            message: "no feed sources configured".into(),
        }
        .in_phase(Phase::Collect);

        assert_eq!(err.phase(), Some(Phase::Collect));
        assert_eq!(err.category(), ErrorCategory::Protocol);

        assert_eq!(err.to_string(), "collect phase failed");
        assert_eq!(
            err.full_message(),
            "collect phase failed: indicator collection failed: no feed sources configured"
        );
    }

    #[test]
    fn test_full_message_prints_each_cause_once() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::ConfigRead {
            path: "missing.json".into(),
            source: io,
        }
        .in_phase(Phase::Validate);

        let msg = err.full_message();
        assert!(msg.starts_with("validate phase failed: "));
        assert_eq!(msg.matches("no such file").count(), 1);
        assert!(msg.ends_with("no such file"));
    }

    #[test]
    fn test_missing_keys_are_enumerated() {
        let err = Error::MissingConfigKeys {
            keys: vec!["tenant_id", "client_secret"],
        };
        assert_eq!(
            err.to_string(),
            "missing required configuration keys: tenant_id, client_secret"
        );
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short"), "short");
        let long = "é".repeat(400);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 303);
    }
}
