//! Error types for Courier.
//!
//! Library crates use [`CourierError`] via `thiserror`.
//! The app crate (cli) wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Courier operations.
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Upstream API failure (contact source, messaging gateway, or CRM).
    ///
    /// Carries the numeric HTTP status and/or a short error code when the
    /// upstream provided one; the transient-error classifier reads both.
    #[error("api error: {message}")]
    Api {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// Data validation error (missing required fields, malformed payload).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Result-sink write or serialization error.
    #[error("sink error: {0}")]
    Sink(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CourierError>;

impl CourierError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an API error with a numeric status attached.
    pub fn api_status(status: u16, msg: impl Into<String>) -> Self {
        Self::Api {
            status: Some(status),
            code: None,
            message: msg.into(),
        }
    }

    /// Create an API error with no status (connection-level failure).
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api {
            status: None,
            code: None,
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Short upstream error code carried by this error, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Prefix an action name onto the message for log attribution,
    /// preserving status and code.
    pub fn with_action(self, action: &str) -> Self {
        match self {
            Self::Api {
                status,
                code,
                message,
            } => Self::Api {
                status,
                code,
                message: format!("[{action}] {message}"),
            },
            Self::Validation { message } => Self::Validation {
                message: format!("[{action}] {message}"),
            },
            Self::Config { message } => Self::Config {
                message: format!("[{action}] {message}"),
            },
            other => other,
        }
    }
}

impl From<reqwest::Error> for CourierError {
    fn from(e: reqwest::Error) -> Self {
        let code = if e.is_timeout() {
            Some("timeout".to_string())
        } else if e.is_connect() {
            Some("connect".to_string())
        } else {
            None
        };

        Self::Api {
            status: e.status().map(|s| s.as_u16()),
            code,
            message: e.to_string(),
        }
    }
}
