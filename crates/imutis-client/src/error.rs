//! # Client Error Types
//!
//! Two families of errors live here:
//!
//! - [`GatewayError`]: the closed set every backend call resolves to.
//!   Callers only ever see these four shapes, each carrying a display-ready
//!   message.
//! - [`ClientError`]: setup-time failures (configuration, storage, input
//!   validation) that never cross the gateway boundary.
//!
//! ## Gateway Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Gateway Failure Categories                          │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  AuthExpired    │  │  ServerError    │  │  ConnectivityError      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  first 401 of   │  │  non-2xx status │  │  timeout, refused,      │ │
//! │  │  a request      │  │  body.message   │  │  DNS, reset             │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  LocalError: request could not be built or body not decoded     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use imutis_core::messages;

// =============================================================================
// Gateway Errors
// =============================================================================

/// Result type alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Every way a gateway call can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The session token was rejected. The token store has been cleared.
    #[error("Session expired. Please login again.")]
    AuthExpired,

    /// The backend answered with a non-success status.
    #[error("{message}")]
    ServerError { status: u16, message: String },

    /// No response arrived (timeout, refused connection, DNS failure).
    #[error("Network connection error. Please check your internet.")]
    ConnectivityError,

    /// The request never left the client or its response couldn't be read.
    #[error("{message}")]
    LocalError { message: String },
}

impl GatewayError {
    /// Creates a ServerError, falling back to the generic server message
    /// when the backend supplied none.
    pub fn server(status: u16, message: Option<String>) -> Self {
        GatewayError::ServerError {
            status,
            message: message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| messages::SERVER_ERROR.to_string()),
        }
    }

    pub fn local(message: impl Into<String>) -> Self {
        GatewayError::LocalError {
            message: message.into(),
        }
    }

    /// The string broadcast on the error topic for this failure.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::AuthExpired => messages::SESSION_EXPIRED.to_string(),
            GatewayError::ServerError { message, .. } => message.clone(),
            GatewayError::ConnectivityError => messages::NETWORK_ERROR.to_string(),
            GatewayError::LocalError { message } => message.clone(),
        }
    }

    /// Returns true if repeating the same call could plausibly succeed.
    ///
    /// ## Retryable
    /// - Connectivity failures
    /// - 5xx, 408 and 429 responses
    ///
    /// ## Never Retryable
    /// - Session expiry (needs a new login)
    /// - Other 4xx responses
    /// - Local failures
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::ConnectivityError => true,
            GatewayError::ServerError { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            GatewayError::AuthExpired | GatewayError::LocalError { .. } => false,
        }
    }

    /// HTTP status, when the backend answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::AuthExpired => Some(401),
            GatewayError::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// =============================================================================
// Client Errors
// =============================================================================

/// Result type alias for client setup operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Failures outside the gateway call path.
#[derive(Debug, Error)]
pub enum ClientError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid client configuration.
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    /// Invalid backend URL.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// Durable storage could not be opened.
    #[error("Storage error: {0}")]
    Storage(#[from] imutis_store::StoreError),

    /// Caller-supplied input was rejected.
    #[error(transparent)]
    Validation(#[from] imutis_core::ValidationError),

    /// The host platform could not describe the device or its network.
    #[error("Platform query failed: {0}")]
    Platform(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client setup failed: {0}")]
    HttpSetup(String),

    /// Tracing subscriber could not be installed.
    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),

    /// JSON (de)serialization failed.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ClientError {
    fn from(err: toml::ser::Error) -> Self {
        ClientError::ConfigSaveFailed(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::HttpSetup(err.to_string())
    }
}

impl ClientError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidConfig(_)
                | ClientError::InvalidUrl(_)
                | ClientError::ConfigLoadFailed(_)
                | ClientError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert_eq!(
            GatewayError::AuthExpired.user_message(),
            "Session expired. Please login again."
        );
        assert_eq!(
            GatewayError::ConnectivityError.user_message(),
            "Network connection error. Please check your internet."
        );
        assert_eq!(
            GatewayError::server(422, Some("Seat already booked".into())).user_message(),
            "Seat already booked"
        );
        assert_eq!(
            GatewayError::local("bad body").user_message(),
            "bad body"
        );
    }

    #[test]
    fn test_server_error_falls_back_to_generic_message() {
        assert_eq!(
            GatewayError::server(500, None).user_message(),
            "Server error occurred"
        );
        assert_eq!(
            GatewayError::server(500, Some("   ".into())).user_message(),
            "Server error occurred"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GatewayError::ConnectivityError.is_retryable());
        assert!(GatewayError::server(503, None).is_retryable());
        assert!(GatewayError::server(429, None).is_retryable());

        assert!(!GatewayError::AuthExpired.is_retryable());
        assert!(!GatewayError::server(404, None).is_retryable());
        assert!(!GatewayError::local("x").is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(ClientError::InvalidUrl("ftp://x".into()).is_config_error());
        assert!(!ClientError::HttpSetup("tls".into()).is_config_error());
    }
}
