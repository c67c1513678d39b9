//! Coded errors and scatter error aggregation
//!
//! A scatter query fans out to many shards and may collect several failures.
//! [`aggregate_errors`] reduces them to a single [`VtError`]: the code is the
//! one users most need to act on, and the message keeps every shard's detail.
//!
//! Priority order, low to high:
//!
//! ```text
//! SUCCESS < TRANSIENT_ERROR < QUERY_NOT_SERVED < DEADLINE_EXCEEDED < CANCELLED
//!   < INTEGRITY_ERROR < NOT_IN_TX < UNKNOWN_ERROR < INTERNAL_ERROR
//!   < RESOURCE_EXHAUSTED < UNAUTHENTICATED < PERMISSION_DENIED < BAD_INPUT
//! ```
//!
//! This ranking decides which error message users see. Changing it is a
//! compatibility break.

use crate::error::CoreError;
use shardcast_protocol::{ErrorCode, RpcError};
use std::error::Error as StdError;
use thiserror::Error;

/// Errors that know the RPC code they surface as
pub trait HasErrorCode {
    fn code(&self) -> ErrorCode;
}

/// An error carrying an RPC [`ErrorCode`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct VtError {
    code: ErrorCode,
    message: String,
}

impl VtError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Decode the error field of a reply; `None` means success
    pub fn from_rpc_error(err: Option<RpcError>) -> Option<Self> {
        err.map(|e| Self::new(e.code, e.message))
    }

    pub fn to_rpc_error(&self) -> RpcError {
        RpcError::new(self.code, self.message.clone())
    }
}

impl HasErrorCode for VtError {
    fn code(&self) -> ErrorCode {
        self.code
    }
}

impl From<RpcError> for VtError {
    fn from(e: RpcError) -> Self {
        Self::new(e.code, e.message)
    }
}

/// Aggregation rank of a code; higher wins.
pub fn priority(code: ErrorCode) -> u8 {
    match code {
        ErrorCode::Success => 0,
        ErrorCode::TransientError => 1,
        ErrorCode::QueryNotServed => 2,
        ErrorCode::DeadlineExceeded => 3,
        ErrorCode::Cancelled => 4,
        ErrorCode::IntegrityError => 5,
        ErrorCode::NotInTx => 6,
        ErrorCode::UnknownError => 7,
        ErrorCode::InternalError => 8,
        ErrorCode::ResourceExhausted => 9,
        ErrorCode::Unauthenticated => 10,
        ErrorCode::PermissionDenied => 11,
        ErrorCode::BadInput => 12,
    }
}

/// Recover the code of an arbitrary error.
///
/// Walks the source chain looking for a [`VtError`] or a [`CoreError`];
/// errors without one are `UNKNOWN_ERROR`. Error types from other crates
/// should implement [`HasErrorCode`] and go through [`aggregate_errors`].
pub fn recover_code(err: &(dyn StdError + 'static)) -> ErrorCode {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(vt) = e.downcast_ref::<VtError>() {
            return vt.code();
        }
        if let Some(core) = e.downcast_ref::<CoreError>() {
            return core.code();
        }
        current = e.source();
    }
    ErrorCode::UnknownError
}

/// Highest-priority code in `codes`. Ties keep the first one seen.
pub fn aggregate_codes<I>(codes: I) -> ErrorCode
where
    I: IntoIterator<Item = ErrorCode>,
{
    let mut high = ErrorCode::Success;
    for code in codes {
        if priority(code) > priority(high) {
            high = code;
        }
    }
    high
}

/// Join error messages with newlines, in input order.
pub fn concatenate_errors<'a, I, E>(errors: I) -> String
where
    I: IntoIterator<Item = &'a E>,
    E: StdError + ?Sized + 'a,
{
    errors
        .into_iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse per-shard errors into one error; `None` if there are none.
pub fn aggregate_errors<E>(errors: &[E]) -> Option<VtError>
where
    E: StdError + HasErrorCode,
{
    if errors.is_empty() {
        return None;
    }
    Some(VtError::new(
        aggregate_codes(errors.iter().map(|e| e.code())),
        concatenate_errors(errors),
    ))
}

/// [`aggregate_errors`] for heterogeneous, boxed errors; codes come from
/// [`recover_code`].
pub fn aggregate_boxed_errors(errors: &[Box<dyn StdError + Send + Sync>]) -> Option<VtError> {
    if errors.is_empty() {
        return None;
    }
    let errors: Vec<&(dyn StdError + 'static)> = errors
        .iter()
        .map(|e| e.as_ref() as &(dyn StdError + 'static))
        .collect();
    Some(VtError::new(
        aggregate_codes(errors.iter().map(|e| recover_code(*e))),
        concatenate_errors(errors.iter().copied()),
    ))
}
