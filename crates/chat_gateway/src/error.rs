//! Error types for the gateway.
//!
//! [`GatewayError`] covers failures of the gateway itself (binding, storage,
//! transport). [`AccountError`] and [`AuthError`] are the outcomes of account
//! operations and are turned into `ERROR||...` reply lines by the router,
//! never propagated past the connection that caused them.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised by gateway infrastructure.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

/// Reasons a signup can be refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("Username and password required")]
    MissingCredentials,
    #[error("Username already taken")]
    DuplicateUsername,
}

/// Reasons a login can be refused.
///
/// Both variants render the same text so a client cannot tell an unknown
/// username from a wrong password.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid username or password")]
    NotFound,
    #[error("Invalid username or password")]
    BadCredentials,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_share_one_message() {
        assert_eq!(AuthError::NotFound.to_string(), AuthError::BadCredentials.to_string());
    }

    #[test]
    fn io_errors_convert() {
        let err: GatewayError = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, GatewayError::Io(_)));
        assert_eq!(err.to_string(), "I/O error: boom");
    }
}
