//! Update-stream service
//!
//! [`UpdateStream`] is the service a stream server exposes. Each operation
//! runs synchronously on a blocking thread and pushes replies through the
//! `send` callback until the stream is exhausted or `send` fails (the client
//! went away).
//!
//! [`FilteredUpdateStream`] implements the service on top of a raw
//! [`BinlogSource`], narrowing `stream_tables` with a [`TablesFilter`].

use shardcast_core::{
    MetricsStreamErrors, Result, StreamErrorCounter, TablesFilter, TransactionSink,
};
use shardcast_protocol::{BinlogTransaction, Charset, KeyRange, KeyspaceIdType, StreamEvent};
use std::sync::Arc;
use tracing::debug;

/// Reply callback for update events
pub type SendEvent<'a> = &'a mut dyn FnMut(StreamEvent) -> Result<()>;

/// Reply callback for binlog transactions
pub type SendTransaction<'a> = &'a mut dyn FnMut(BinlogTransaction) -> Result<()>;

pub trait UpdateStream: Send + Sync + 'static {
    fn serve_update_stream(&self, position: &str, send: SendEvent<'_>) -> Result<()>;

    fn stream_key_range(
        &self,
        position: &str,
        keyspace_id_type: KeyspaceIdType,
        key_range: &KeyRange,
        charset: Option<Charset>,
        send: SendTransaction<'_>,
    ) -> Result<()>;

    fn stream_tables(
        &self,
        position: &str,
        tables: &[String],
        charset: Option<Charset>,
        send: SendTransaction<'_>,
    ) -> Result<()>;
}

/// Unfiltered replication feed of one tablet
pub trait BinlogSource: Send + Sync + 'static {
    fn stream_events(&self, position: &str, send: SendEvent<'_>) -> Result<()>;

    /// Every transaction from `position` on
    fn stream_transactions(
        &self,
        position: &str,
        charset: Option<Charset>,
        sink: &mut dyn TransactionSink,
    ) -> Result<()>;

    /// Transactions whose keyspace ids fall in `key_range`
    fn stream_key_range(
        &self,
        position: &str,
        keyspace_id_type: KeyspaceIdType,
        key_range: &KeyRange,
        charset: Option<Charset>,
        sink: &mut dyn TransactionSink,
    ) -> Result<()>;
}

/// [`UpdateStream`] serving table-filtered transactions from a [`BinlogSource`]
pub struct FilteredUpdateStream<S> {
    source: S,
    errors: Arc<dyn StreamErrorCounter>,
}

impl<S: BinlogSource> FilteredUpdateStream<S> {
    pub fn new(source: S) -> Self {
        Self::with_counter(source, Arc::new(MetricsStreamErrors))
    }

    pub fn with_counter(source: S, errors: Arc<dyn StreamErrorCounter>) -> Self {
        Self { source, errors }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: BinlogSource> UpdateStream for FilteredUpdateStream<S> {
    fn serve_update_stream(&self, position: &str, send: SendEvent<'_>) -> Result<()> {
        self.source.stream_events(position, send)
    }

    fn stream_key_range(
        &self,
        position: &str,
        keyspace_id_type: KeyspaceIdType,
        key_range: &KeyRange,
        charset: Option<Charset>,
        mut send: SendTransaction<'_>,
    ) -> Result<()> {
        self.source.stream_key_range(
            position,
            keyspace_id_type,
            key_range,
            charset,
            &mut send,
        )
    }

    fn stream_tables(
        &self,
        position: &str,
        tables: &[String],
        charset: Option<Charset>,
        send: SendTransaction<'_>,
    ) -> Result<()> {
        debug!("Streaming tables {:?} from {}", tables, position);
        let mut filter = TablesFilter::new(tables.iter().cloned(), send, self.errors.clone());
        self.source.stream_transactions(position, charset, &mut filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardcast_core::{AtomicStreamErrors, CoreError};
    use shardcast_protocol::{Category, Statement};

    struct VecSource(Vec<BinlogTransaction>);

    impl BinlogSource for VecSource {
        fn stream_events(&self, _position: &str, _send: SendEvent<'_>) -> Result<()> {
            Ok(())
        }

        fn stream_transactions(
            &self,
            _position: &str,
            _charset: Option<Charset>,
            sink: &mut dyn TransactionSink,
        ) -> Result<()> {
            for tx in &self.0 {
                sink.send(tx.clone())?;
            }
            Ok(())
        }

        fn stream_key_range(
            &self,
            _position: &str,
            _keyspace_id_type: KeyspaceIdType,
            _key_range: &KeyRange,
            _charset: Option<Charset>,
            sink: &mut dyn TransactionSink,
        ) -> Result<()> {
            self.stream_transactions("", None, sink)
        }
    }

    fn feed() -> Vec<BinlogTransaction> {
        vec![
            BinlogTransaction::new(1, "a")
                .with_statement(Statement::new(Category::Set, "SET TIMESTAMP=1"))
                .with_statement(Statement::new(Category::Dml, "x /* _stream t1 (id ) (1 ); */")),
            BinlogTransaction::new(2, "b")
                .with_statement(Statement::new(Category::Dml, "y /* _stream t2 (id ) (2 ); */")),
            BinlogTransaction::new(3, "c")
                .with_statement(Statement::new(Category::Dml, "unmarked insert")),
        ]
    }

    #[test]
    fn test_stream_tables_filters_each_transaction() {
        let counter = Arc::new(AtomicStreamErrors::new());
        let service = FilteredUpdateStream::with_counter(VecSource(feed()), counter.clone());
        let mut got = Vec::new();
        service
            .stream_tables("pos", &["t1".to_string()], None, &mut |tx| {
                got.push(tx);
                Ok(())
            })
            .unwrap();

        assert_eq!(got.len(), 3);
        assert_eq!(got[0].statements.len(), 2);
        assert!(got[1].statements.is_empty());
        assert!(got[2].statements.is_empty());
        assert_eq!(counter.get(shardcast_core::binlog::TABLES_STREAM_LABEL), 1);
    }

    #[test]
    fn test_key_range_is_not_table_filtered() {
        let service = FilteredUpdateStream::new(VecSource(feed()));
        let mut got = Vec::new();
        service
            .stream_key_range(
                "pos",
                KeyspaceIdType::Uint64,
                &KeyRange::default(),
                None,
                &mut |tx| {
                    got.push(tx);
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(got, feed());
    }

    #[test]
    fn test_client_disconnect_stops_source() {
        let service = FilteredUpdateStream::new(VecSource(feed()));
        let mut sent = 0;
        let err = service
            .stream_tables("pos", &["t1".to_string()], None, &mut |_tx| {
                sent += 1;
                Err(CoreError::StreamClosed)
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::StreamClosed));
        assert_eq!(sent, 1);
    }
}
