//! Error types for the Khedma client

use thiserror::Error;

/// Errors that can occur when using the Khedma client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection to the push gateway failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// No valid credentials are available
    #[error("Not authenticated")]
    Unauthenticated,

    /// The server rejected the supplied credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Not currently connected to the gateway
    #[error("Not connected")]
    NotConnected,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// HTTP API call failed
    #[error("API error: {0}")]
    Api(String),

    /// Server returned an error
    #[error("Server error: {0}")]
    Server(String),

    /// Failed to serialize/deserialize a message
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WebSocket transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Permission denied for the requested operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The client has been shut down
    #[error("Client shut down")]
    Shutdown,
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ClientError::Connection("refused".to_string()).to_string(),
            "Connection error: refused"
        );
        assert_eq!(ClientError::Unauthenticated.to_string(), "Not authenticated");
        assert_eq!(ClientError::NotConnected.to_string(), "Not connected");
        assert_eq!(ClientError::Timeout.to_string(), "Operation timed out");
        assert_eq!(
            ClientError::PermissionDenied("read only".to_string()).to_string(),
            "Permission denied: read only"
        );
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<String>("not valid json").unwrap_err();
        let err: ClientError = json_err.into();
        assert!(matches!(err, ClientError::Serialization(_)));
    }
}
