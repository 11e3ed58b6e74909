/// Unified error handling for the enlace router
///
/// Classification failures are raised before any backend is contacted,
/// backend failures are carried through unchanged, and configuration or
/// construction problems surface while the pool is being built.
use std::fmt;
use thiserror::Error;

/// Main error type for router operations
#[derive(Debug, Error)]
pub enum RouterError {
    /// The command cannot be distributed safely and was never sent
    #[error("Unsupported command: '{field}' {reason}")]
    Unsupported { field: String, reason: String },

    /// A backend failed to produce a reply; propagated verbatim
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Establishing a backend connection failed
    #[error("Failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    /// No connection with the requested identity exists in the pool
    #[error("Unknown backend: {identity}")]
    UnknownBackend { identity: String },

    /// Endpoint descriptor is not of the form host:port
    #[error("Invalid endpoint '{endpoint}': {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    /// The textual option string could not be parsed
    #[error("Invalid connection options: {message}")]
    InvalidOptions { message: String },

    /// The pool was constructed without any backend
    #[error("At least one backend is required")]
    NoBackends,

    /// Two backends share the same identity
    #[error("Duplicate backend: {identity}")]
    DuplicateBackend { identity: String },

    /// An operation needs more backends than the pool holds
    #[error("{operation} only works with multiple backends")]
    NotEnoughBackends { operation: String },
}

/// Transport-level failure reported by a backend connection.
///
/// Not-ok command replies are not errors; they come back as ordinary
/// reply documents.
#[derive(Debug, Clone, Error)]
#[error("Backend {backend} failed: {message}")]
pub struct BackendError {
    pub backend: String,
    pub message: String,
}

impl BackendError {
    pub fn new<B: Into<String>, M: Into<String>>(backend: B, message: M) -> Self {
        BackendError {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Result type alias for router operations
pub type RouterResult<T> = Result<T, RouterError>;

impl RouterError {
    /// Create an unsupported-command error
    pub fn unsupported<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        RouterError::Unsupported {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn connect<E: Into<String>, M: Into<String>>(endpoint: E, message: M) -> Self {
        RouterError::Connect {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn invalid_endpoint<E: Into<String>, M: Into<String>>(endpoint: E, message: M) -> Self {
        RouterError::InvalidEndpoint {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn invalid_options<M: Into<String>>(message: M) -> Self {
        RouterError::InvalidOptions {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (the caller may retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RouterError::Backend(_) | RouterError::Connect { .. })
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RouterError::Config(_) => ErrorSeverity::Critical,
            RouterError::NoBackends => ErrorSeverity::Critical,
            RouterError::DuplicateBackend { .. } => ErrorSeverity::Critical,
            RouterError::Backend(_) => ErrorSeverity::Warning,
            RouterError::Connect { .. } => ErrorSeverity::Warning,
            RouterError::Unsupported { .. } => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that prevent the router from being built
    Critical,
    /// Errors that affect a single operation
    Error,
    /// Warnings about potential issues
    Warning,
    /// Informational messages about rejected input
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}
