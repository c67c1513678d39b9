//! Binlog transaction delivery and filtering

mod filter;
mod sink;

pub use filter::{extract_table_name, tables_filter, TablesFilter, STREAM_COMMENT, TABLES_STREAM_LABEL};
pub use sink::{CollectSink, TransactionSink};
