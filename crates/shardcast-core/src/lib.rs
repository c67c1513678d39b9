//! # shardcast-core
//!
//! The correctness-critical pieces of shardcast:
//!
//! - [`binlog`] - the [`TransactionSink`] capability and the tables filter
//!   that narrows a replication feed to a consumer's table set
//! - [`vterrors`] - coded errors and the scatter error aggregator
//! - [`stats`] - the dropped-statement counter injected into filters
//! - [`fault`] - the fault barrier used at stream-serving boundaries
//!
//! ```text
//! replication source ──▶ TablesFilter ──▶ TransactionSink ──▶ stream server
//!
//! shard errors ──▶ aggregate_errors ──▶ one VtError (highest-priority code)
//! ```

pub mod binlog;
mod error;
pub mod fault;
pub mod stats;
pub mod vterrors;

pub use binlog::{tables_filter, TablesFilter, TransactionSink};
pub use error::{CoreError, Result};
pub use fault::catch_fault;
pub use stats::{AtomicStreamErrors, MetricsStreamErrors, StreamErrorCounter};
pub use vterrors::{aggregate_errors, recover_code, HasErrorCode, VtError};
