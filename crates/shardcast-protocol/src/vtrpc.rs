//! RPC error codes shared by every shardcast service

use serde::{Deserialize, Serialize};

/// Error code carried by every RPC error
///
/// WARNING: Variant order is the wire numbering and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorCode {
    #[default]
    Success,
    Cancelled,
    UnknownError,
    BadInput,
    DeadlineExceeded,
    IntegrityError,
    PermissionDenied,
    ResourceExhausted,
    QueryNotServed,
    NotInTx,
    InternalError,
    TransientError,
    Unauthenticated,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 13] = [
        ErrorCode::Success,
        ErrorCode::Cancelled,
        ErrorCode::UnknownError,
        ErrorCode::BadInput,
        ErrorCode::DeadlineExceeded,
        ErrorCode::IntegrityError,
        ErrorCode::PermissionDenied,
        ErrorCode::ResourceExhausted,
        ErrorCode::QueryNotServed,
        ErrorCode::NotInTx,
        ErrorCode::InternalError,
        ErrorCode::TransientError,
        ErrorCode::Unauthenticated,
    ];

    /// Wire numbering of the code
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        usize::try_from(v).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Success => "SUCCESS",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
            ErrorCode::BadInput => "BAD_INPUT",
            ErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorCode::IntegrityError => "INTEGRITY_ERROR",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorCode::QueryNotServed => "QUERY_NOT_SERVED",
            ErrorCode::NotInTx => "NOT_IN_TX",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::TransientError => "TRANSIENT_ERROR",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error as transmitted on the wire
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// End user a gateway request is made on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallerId {
    pub principal: String,
    pub component: String,
    pub subcomponent: String,
}

impl CallerId {
    pub fn new(
        principal: impl Into<String>,
        component: impl Into<String>,
        subcomponent: impl Into<String>,
    ) -> Self {
        Self {
            principal: principal.into(),
            component: component.into(),
            subcomponent: subcomponent.into(),
        }
    }
}
