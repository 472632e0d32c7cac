//! Error types for hello-core

use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for hello-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the hello server
#[derive(Debug, Error)]
pub enum Error {
    /// Server configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when binding failed because another process holds the port
    pub fn is_addr_in_use(&self) -> bool {
        match self {
            Error::Bind { source, .. } | Error::Io(source) => {
                source.kind() == std::io::ErrorKind::AddrInUse
            }
            _ => false,
        }
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
