//! Client error taxonomy.

use std::time::Duration;

use geo_common::{DecodeError, ID_NOT_FOUND};
use thiserror::Error;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The handle was never connected, or was closed.
    #[error("database not initialized")]
    Uninitialized,

    /// A command was issued without the arguments it requires.
    #[error("invalid arguments")]
    InvalidArguments,

    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// RESP framing error.
    #[error("protocol error")]
    Protocol,

    /// The server closed the connection at a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// Opening or handshaking a pooled connection failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: Box<ClientError>,
    },

    /// The reply could not be decoded.
    #[error("{command}: {source}")]
    Decode {
        command: String,
        #[source]
        source: DecodeError,
    },

    /// The server rejected the command, either with `ok:false` or with a
    /// RESP error frame.
    #[error("{command}: received error: {message}")]
    Server { command: String, message: String },

    /// Reply frame type did not carry a JSON payload.
    #[error("unexpected response")]
    UnexpectedResponse,

    /// No pooled connection became free within the configured wait.
    #[error("timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    /// Address could not be parsed into a socket address.
    #[error("invalid address")]
    InvalidAddress,
}

impl ClientError {
    /// Server-supplied message, when this is a server rejection.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::Server { message, .. } => Some(message),
            _ => None,
        }
    }

    /// True when the server reported the requested entity missing.
    pub fn is_not_found(&self) -> bool {
        self.server_message() == Some(ID_NOT_FOUND)
    }

    /// True when the connection that produced this error must not be reused.
    pub(crate) fn breaks_connection(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Protocol | ClientError::ConnectionClosed
        )
    }
}
