// Error handling module
// Defines the error taxonomy surfaced by every client operation

use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while authenticating or calling the platform
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or I/O failure, including HTTP client initialization
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Token endpoint returned an error payload (or an unusable one)
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// HTTP status above 299, or a success status whose body carries `errors`
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: Value },

    /// Request could not be built from the given parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Reading an attachment or certificate file failed
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// HTTP status carried by an API error
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the failure came from the token endpoint
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth(_))
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
