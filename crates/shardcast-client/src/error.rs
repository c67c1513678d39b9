use shardcast_core::{CoreError, HasErrorCode, VtError};
use shardcast_protocol::{ErrorCode, ProtocolError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    ProtocolError(#[from] ProtocolError),

    /// Error reported by the remote end
    #[error("{0}")]
    Rpc(#[from] VtError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Response too large: {0} bytes (max: {1})")]
    ResponseTooLarge(usize, usize),

    #[error("No client protocol registered under name {0:?}")]
    UnknownProtocol(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// The RPC code this error surfaces as
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Rpc(e) => e.code(),
            Self::ConnectionError(_) | Self::IoError(_) | Self::NotConnected => {
                ErrorCode::TransientError
            }
            Self::Timeout(_) => ErrorCode::DeadlineExceeded,
            Self::ProtocolError(_) | Self::ResponseTooLarge(..) | Self::Config(_) => {
                ErrorCode::BadInput
            }
            Self::InvalidResponse(_) | Self::UnknownProtocol(_) | Self::Other(_) => {
                ErrorCode::UnknownError
            }
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

impl HasErrorCode for Error {
    fn code(&self) -> ErrorCode {
        Error::code(self)
    }
}

impl From<CoreError> for Error {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Vt(vt) => Self::Rpc(vt),
            CoreError::Protocol(p) => Self::ProtocolError(p),
            CoreError::Io(io) => Self::IoError(io),
            other => Self::Other(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
