//! Error types for the record server.

use recsync_protocol::CodecError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the record server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request content.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Push carried more items than allowed.
    #[error("push batch too large: {size} > {max}")]
    BatchTooLarge {
        /// Items in the request.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Cursor not issued by this server.
    #[error("invalid cursor: {0:?}")]
    InvalidCursor(String),

    /// No handler for the path.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// Request or response body could not be (de)serialized.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::BatchTooLarge { .. }
                | ServerError::InvalidCursor(_)
                | ServerError::UnknownEndpoint(_)
                | ServerError::Codec(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }

    /// Returns the HTTP status code for the error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::UnknownEndpoint(_) => 404,
            ServerError::BatchTooLarge { .. } => 413,
            ServerError::Internal(_) => 500,
            _ => 400,
        }
    }
}
