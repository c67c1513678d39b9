//! Fault barrier for stream-serving boundaries
//!
//! A bug in one stream handler must not take the server down. Handlers run
//! inside [`catch_fault`], which turns a panic into an `INTERNAL_ERROR`
//! that is reported to the caller like any other failure.

use crate::error::{CoreError, Result};
use crate::vterrors::VtError;
use shardcast_protocol::ErrorCode;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Prefix of the message produced for a caught panic
pub const PANIC_PREFIX: &str = "Caught panic: ";

/// Run `f`, converting a panic into a coded error.
pub fn catch_fault<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!("Uncaught panic in stream handler: {}", msg);
            Err(CoreError::Vt(VtError::new(
                ErrorCode::InternalError,
                format!("{PANIC_PREFIX}{msg}"),
            )))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_passes_through() {
        assert_eq!(catch_fault(|| Ok(42)).unwrap(), 42);
    }

    #[test]
    fn test_error_passes_through() {
        let err = catch_fault::<(), _>(|| Err(CoreError::sink("nope"))).unwrap_err();
        assert!(matches!(err, CoreError::Sink(_)));
    }

    #[test]
    fn test_static_str_panic() {
        let err = catch_fault::<(), _>(|| panic!("test-triggered panic")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(err.to_string(), "Caught panic: test-triggered panic");
    }

    #[test]
    fn test_formatted_panic() {
        let n = 7;
        let err = catch_fault::<(), _>(|| panic!("shard {} exploded", n)).unwrap_err();
        assert_eq!(err.to_string(), "Caught panic: shard 7 exploded");
    }

    #[test]
    fn test_opaque_payload() {
        let err =
            catch_fault::<(), _>(|| std::panic::panic_any(17u32)).unwrap_err();
        assert_eq!(err.to_string(), "Caught panic: unknown panic");
    }
}
