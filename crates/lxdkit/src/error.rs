//! Error types for LXD operations.
//!
//! Errors fall into two categories. Invocation errors mean the caller
//! handed in something unusable and are detected before any remote call
//! where possible. Execution errors come from the daemon or the transport
//! and carry the daemon's message verbatim. Nothing is retried.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for LXD operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid input from the caller.
    Invocation,
    /// Failure reported by the daemon or the transport.
    Execution,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Invocation => "Invalid invocation",
            Self::Execution => "Execution failed",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Invocation => "Check the arguments and the shape of config/devices input",
            Self::Execution => "Check the daemon message and connectivity to the endpoint",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during LXD operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller supplied a malformed or unsupported value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced resource, config key or device does not exist.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up, e.g. `container 'web'`.
        what: String,
    },

    /// Operation not allowed in the resource's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Entry that must not exist yet already exists.
    #[error("{what} already exists")]
    AlreadyExists {
        /// What collided.
        what: String,
    },

    /// Could not reach the endpoint.
    #[error("failed to connect to '{endpoint}': {message}")]
    ConnectionFailed {
        /// Endpoint address.
        endpoint: String,
        /// Transport message.
        message: String,
    },

    /// TLS handshake or certificate verification failed.
    #[error("failed to connect to '{endpoint}', looks like the SSL verification failed")]
    TlsVerificationFailed {
        /// Endpoint address.
        endpoint: String,
    },

    /// Daemon rejected the request.
    #[error("{message}")]
    RemoteRejected {
        /// Daemon error message, verbatim.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Daemon answered with something we could not interpret.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// Local daemon control command failed.
    #[error("command failed: {message}")]
    CommandFailed {
        /// What failed, or the detail after the error marker.
        message: String,
        /// Raw command output.
        output: String,
    },

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Create an invalid-argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a daemon rejection.
    pub fn rejected(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::RemoteRejected {
            message: message.into(),
            status,
        }
    }

    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidArgument(_)
            | Error::NotFound { .. }
            | Error::InvalidOperation(_)
            | Error::AlreadyExists { .. } => ErrorCategory::Invocation,
            Error::ConnectionFailed { .. }
            | Error::TlsVerificationFailed { .. }
            | Error::RemoteRejected { .. }
            | Error::InvalidResponse(_)
            | Error::CommandFailed { .. }
            | Error::Io { .. } => ErrorCategory::Execution,
        }
    }

    /// Whether the caller supplied bad input.
    #[must_use]
    pub fn is_invocation(&self) -> bool {
        self.category() == ErrorCategory::Invocation
    }

    /// Whether the daemon or transport failed.
    #[must_use]
    pub fn is_execution(&self) -> bool {
        self.category() == ErrorCategory::Execution
    }

    /// Whether the daemon reported the target as missing.
    #[must_use]
    pub fn is_remote_not_found(&self) -> bool {
        matches!(self, Error::RemoteRejected { status: Some(404), .. })
    }

    /// Always false: no operation is retried automatically.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Classify a transport error from the HTTP agent.
    pub(crate) fn from_transport(endpoint: &str, err: &ureq::Error) -> Self {
        let tls_failed = || Self::TlsVerificationFailed {
            endpoint: endpoint.to_string(),
        };

        match err {
            ureq::Error::StatusCode(code) => Self::rejected(format!("HTTP {code}"), Some(*code)),
            ureq::Error::Tls(_) | ureq::Error::Pem(_) | ureq::Error::Rustls(_) => tls_failed(),
            // rustls reports handshake failures through the stream's io::Error
            ureq::Error::Io(io) if mentions_tls(&io.to_string()) => tls_failed(),
            _ => Self::ConnectionFailed {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            },
        }
    }
}

fn mentions_tls(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["certificate", "tls", "handshake"]
        .iter()
        .any(|marker| lower.contains(marker))
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_category() {
        assert!(Error::invalid("x").is_invocation());
        assert!(Error::not_found("container 'a'").is_invocation());
        assert!(Error::InvalidOperation("x".into()).is_invocation());
        assert!(
            Error::AlreadyExists {
                what: "device 'a'".into()
            }
            .is_invocation()
        );
    }

    #[test]
    fn test_execution_category() {
        assert!(Error::rejected("boom", None).is_execution());
        assert!(
            Error::ConnectionFailed {
                endpoint: "https://h:8443".into(),
                message: "refused".into()
            }
            .is_execution()
        );
        assert!(
            Error::TlsVerificationFailed {
                endpoint: "https://h:8443".into()
            }
            .is_execution()
        );
        assert!(Error::InvalidResponse("x".into()).is_execution());
    }

    #[test]
    fn test_never_retryable() {
        assert!(!Error::rejected("busy", Some(503)).is_retryable());
        assert!(
            !Error::ConnectionFailed {
                endpoint: "e".into(),
                message: "m".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_rejected_message_is_verbatim() {
        let err = Error::rejected("Container is running", Some(400));
        assert_eq!(err.to_string(), "Container is running");
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("container 'web'");
        assert_eq!(err.to_string(), "container 'web' not found");
    }

    #[test]
    fn test_transport_status_is_rejection() {
        let err = Error::from_transport("unix:/s", &ureq::Error::StatusCode(404));
        assert!(err.is_remote_not_found());
    }

    #[test]
    fn test_transport_tls_failures() {
        let endpoint = "https://lab:8443";
        let direct = Error::from_transport(endpoint, &ureq::Error::Tls("unknown issuer"));
        assert!(matches!(
            direct,
            Error::TlsVerificationFailed { ref endpoint } if endpoint == "https://lab:8443"
        ));

        let wrapped = ureq::Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid peer certificate: UnknownIssuer",
        ));
        assert!(matches!(
            Error::from_transport(endpoint, &wrapped),
            Error::TlsVerificationFailed { .. }
        ));
    }

    #[test]
    fn test_transport_connection_failures() {
        let refused = ureq::Error::Io(io::Error::from(io::ErrorKind::ConnectionRefused));
        for err in [refused, ureq::Error::HostNotFound, ureq::Error::ConnectionFailed] {
            let mapped = Error::from_transport("https://lab:8443", &err);
            assert!(matches!(mapped, Error::ConnectionFailed { .. }), "{mapped:?}");
            assert!(mapped.is_execution());
        }
    }

    #[test]
    fn test_remote_not_found() {
        assert!(Error::rejected("not found", Some(404)).is_remote_not_found());
        assert!(!Error::rejected("nope", Some(500)).is_remote_not_found());
    }

    #[test]
    fn test_category_display_and_advice() {
        assert!(ErrorCategory::Invocation.to_string().contains("invocation"));
        assert!(!ErrorCategory::Execution.advice().is_empty());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }
}
