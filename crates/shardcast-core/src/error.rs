//! Error types for core operations

use crate::vterrors::{HasErrorCode, VtError};
use shardcast_protocol::{ErrorCode, ProtocolError};
use thiserror::Error;

/// Core errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// Coded RPC-level error
    #[error("{0}")]
    Vt(#[from] VtError),

    /// Wire encoding error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Downstream sink refused a transaction
    #[error("Sink error: {0}")]
    Sink(String),

    /// Receiving side of a stream went away
    #[error("Stream closed")]
    StreamClosed,

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Create a sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// The RPC code this error surfaces as
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Vt(e) => e.code(),
            Self::Protocol(_) => ErrorCode::BadInput,
            Self::StreamClosed => ErrorCode::Cancelled,
            Self::Io(_) => ErrorCode::TransientError,
            Self::Sink(_) => ErrorCode::UnknownError,
        }
    }

    /// Check if this error is retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::TransientError | ErrorCode::QueryNotServed
        )
    }
}

impl HasErrorCode for CoreError {
    fn code(&self) -> ErrorCode {
        CoreError::code(self)
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
