//! Player client against a live stream server, normal and panicking.

use bytes::Bytes;
use parking_lot::Mutex;
use shardcast_client::{BinlogPlayerClient, TcpPlayerClient};
use shardcast_core::{CoreError, Result, TransactionSink, VtError};
use shardcast_protocol::{
    BinlogTransaction, Category, Charset, ErrorCode, Field, KeyRange, KeyspaceIdType, Statement,
    StreamEvent,
};
use shardcast_server::{
    BinlogSource, FilteredUpdateStream, SendEvent, SendTransaction, ServerConfig, StreamServer,
    UpdateStream,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const UPDATE_STREAM_POSITION: &str = "UpdateStream starting position";
const KEY_RANGE_POSITION: &str = "KeyRange starting position";
const TABLES_POSITION: &str = "Tables starting position";

fn test_charset() -> Charset {
    Charset::new(12, 13, 14)
}

fn test_key_range() -> KeyRange {
    KeyRange::from_u64(0x7000000000000000, 0x9000000000000000)
}

fn test_tables() -> Vec<String> {
    vec!["table1".to_string(), "table2".to_string()]
}

fn test_stream_event() -> StreamEvent {
    StreamEvent {
        category: "DML".to_string(),
        table_name: "table1".to_string(),
        primary_key_fields: vec![Field {
            name: "id".to_string(),
            r#type: 254,
            flags: 128,
        }],
        primary_key_values: vec![vec![Bytes::from_static(b"123")]],
        sql: "test sql".to_string(),
        timestamp: 372,
        transaction_id: "StreamEvent returned transaction id".to_string(),
    }
}

fn test_binlog_transaction() -> BinlogTransaction {
    BinlogTransaction::new(78, "BinlogTransaction returned transaction id").with_statement(
        Statement::new(Category::Rollback, "my statement")
            .with_charset(Charset::new(120, 130, 140)),
    )
}

fn wrong_parameter(what: &str) -> CoreError {
    CoreError::Vt(VtError::new(
        ErrorCode::BadInput,
        format!("wrong {} parameter", what),
    ))
}

/// Streamer that checks its parameters and answers with one fixed reply
#[derive(Default)]
struct FakeBinlogStreamer {
    panics: AtomicBool,
}

impl FakeBinlogStreamer {
    fn check_panic(&self) {
        if self.panics.load(Ordering::SeqCst) {
            panic!("test-triggered panic");
        }
    }
}

impl UpdateStream for FakeBinlogStreamer {
    fn serve_update_stream(&self, position: &str, send: SendEvent<'_>) -> Result<()> {
        self.check_panic();
        if position != UPDATE_STREAM_POSITION {
            return Err(wrong_parameter("ServeUpdateStream"));
        }
        send(test_stream_event())
    }

    fn stream_key_range(
        &self,
        position: &str,
        keyspace_id_type: KeyspaceIdType,
        key_range: &KeyRange,
        charset: Option<Charset>,
        send: SendTransaction<'_>,
    ) -> Result<()> {
        self.check_panic();
        if position != KEY_RANGE_POSITION
            || keyspace_id_type != KeyspaceIdType::Uint64
            || *key_range != test_key_range()
            || charset != Some(test_charset())
        {
            return Err(wrong_parameter("StreamKeyRange"));
        }
        send(test_binlog_transaction())
    }

    fn stream_tables(
        &self,
        position: &str,
        tables: &[String],
        charset: Option<Charset>,
        send: SendTransaction<'_>,
    ) -> Result<()> {
        self.check_panic();
        if position != TABLES_POSITION || tables != test_tables() || charset != Some(test_charset())
        {
            return Err(wrong_parameter("StreamTables"));
        }
        send(test_binlog_transaction())
    }
}

async fn start_server(service: Arc<dyn UpdateStream>) -> String {
    let config = ServerConfig::new().with_bind_address("127.0.0.1:0");
    let server = StreamServer::bind(config, service).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());
    addr
}

async fn test_serve_update_stream(client: &mut dyn BinlogPlayerClient) {
    let (mut events, errs) = client
        .serve_update_stream(UPDATE_STREAM_POSITION)
        .await
        .unwrap();
    assert_eq!(events.recv().await, Some(test_stream_event()));
    assert_eq!(events.recv().await, None);
    assert!(errs.err().is_none(), "unexpected error: {:?}", errs.err());
}

async fn test_stream_key_range(client: &mut dyn BinlogPlayerClient) {
    let (mut events, errs) = client
        .stream_key_range(
            KEY_RANGE_POSITION,
            KeyspaceIdType::Uint64,
            &test_key_range(),
            Some(test_charset()),
        )
        .await
        .unwrap();
    assert_eq!(events.recv().await, Some(test_binlog_transaction()));
    assert_eq!(events.recv().await, None);
    assert!(errs.err().is_none(), "unexpected error: {:?}", errs.err());
}

async fn test_stream_tables(client: &mut dyn BinlogPlayerClient) {
    let (mut events, errs) = client
        .stream_tables(TABLES_POSITION, &test_tables(), Some(test_charset()))
        .await
        .unwrap();
    assert_eq!(events.recv().await, Some(test_binlog_transaction()));
    assert_eq!(events.recv().await, None);
    assert!(errs.err().is_none(), "unexpected error: {:?}", errs.err());
}

fn assert_panic_error(errs: &shardcast_client::ErrFunc) {
    let err = errs.err().expect("stream should have failed");
    assert!(
        err.to_string().contains("test-triggered panic"),
        "wrong error from panic: {}",
        err
    );
    assert_eq!(err.code(), ErrorCode::InternalError);
}

async fn test_serve_update_stream_panics(client: &mut dyn BinlogPlayerClient) {
    let (mut events, errs) = client
        .serve_update_stream(UPDATE_STREAM_POSITION)
        .await
        .unwrap();
    assert_eq!(events.recv().await, None);
    assert_panic_error(&errs);
}

async fn test_stream_key_range_panics(client: &mut dyn BinlogPlayerClient) {
    let (mut events, errs) = client
        .stream_key_range(
            KEY_RANGE_POSITION,
            KeyspaceIdType::Uint64,
            &test_key_range(),
            Some(test_charset()),
        )
        .await
        .unwrap();
    assert_eq!(events.recv().await, None);
    assert_panic_error(&errs);
}

async fn test_stream_tables_panics(client: &mut dyn BinlogPlayerClient) {
    let (mut events, errs) = client
        .stream_tables(TABLES_POSITION, &test_tables(), Some(test_charset()))
        .await
        .unwrap();
    assert_eq!(events.recv().await, None);
    assert_panic_error(&errs);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_player_suite() {
    let fake = Arc::new(FakeBinlogStreamer::default());
    let addr = start_server(fake.clone()).await;

    let mut client = TcpPlayerClient::default();
    client.dial(&addr, Duration::from_secs(30)).await.unwrap();

    test_serve_update_stream(&mut client).await;
    test_stream_key_range(&mut client).await;
    test_stream_tables(&mut client).await;

    fake.panics.store(true, Ordering::SeqCst);
    test_serve_update_stream_panics(&mut client).await;
    test_stream_key_range_panics(&mut client).await;
    test_stream_tables_panics(&mut client).await;

    // the server outlives the panics
    fake.panics.store(false, Ordering::SeqCst);
    test_serve_update_stream(&mut client).await;

    client.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_player_suite_through_registry() {
    let fake = Arc::new(FakeBinlogStreamer::default());
    let addr = start_server(fake).await;

    let mut client = shardcast_client::new_client("tcp").unwrap();
    client.dial(&addr, Duration::from_secs(30)).await.unwrap();
    test_serve_update_stream(client.as_mut()).await;
    test_stream_key_range(client.as_mut()).await;
    test_stream_tables(client.as_mut()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wrong_parameters_surface_as_stream_error() {
    let addr = start_server(Arc::new(FakeBinlogStreamer::default())).await;
    let mut client = TcpPlayerClient::default();
    client.dial(&addr, Duration::from_secs(30)).await.unwrap();

    let (events, errs) = client.serve_update_stream("elsewhere").await.unwrap();
    assert!(events.collect().await.is_empty());
    let err = errs.err().unwrap();
    assert_eq!(err.code(), ErrorCode::BadInput);
    assert_eq!(err.to_string(), "wrong ServeUpdateStream parameter");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_reply_buffer_still_streams() {
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        reply_buffer_size: 0,
        ..Default::default()
    };
    let server = StreamServer::bind(config, Arc::new(FakeBinlogStreamer::default()))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());

    let mut client = TcpPlayerClient::default();
    client.dial(&addr, Duration::from_secs(30)).await.unwrap();
    test_serve_update_stream(&mut client).await;
    test_stream_tables(&mut client).await;
}

/// In-memory replication feed
struct MemorySource {
    transactions: Vec<BinlogTransaction>,
    seen_positions: Mutex<Vec<String>>,
}

impl BinlogSource for MemorySource {
    fn stream_events(&self, position: &str, _send: SendEvent<'_>) -> Result<()> {
        self.seen_positions.lock().push(position.to_string());
        Ok(())
    }

    fn stream_transactions(
        &self,
        position: &str,
        _charset: Option<Charset>,
        sink: &mut dyn TransactionSink,
    ) -> Result<()> {
        self.seen_positions.lock().push(position.to_string());
        for tx in &self.transactions {
            sink.send(tx.clone())?;
        }
        Ok(())
    }

    fn stream_key_range(
        &self,
        position: &str,
        _keyspace_id_type: KeyspaceIdType,
        _key_range: &KeyRange,
        charset: Option<Charset>,
        sink: &mut dyn TransactionSink,
    ) -> Result<()> {
        self.stream_transactions(position, charset, sink)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_filtered_tables_stream_end_to_end() {
    let source = MemorySource {
        transactions: vec![
            BinlogTransaction::new(1, "tx1")
                .with_statement(Statement::new(Category::Set, "SET TIMESTAMP=1"))
                .with_statement(Statement::new(
                    Category::Dml,
                    "insert into orders(id) values (1) /* _stream orders (id ) (1 ); */",
                ))
                .with_statement(Statement::new(
                    Category::Dml,
                    "insert into users(id) values (1) /* _stream users (id ) (1 ); */",
                )),
            BinlogTransaction::new(2, "tx2")
                .with_statement(Statement::new(Category::Ddl, "alter table orders add c int")),
        ],
        seen_positions: Mutex::new(Vec::new()),
    };
    let service = Arc::new(FilteredUpdateStream::new(source));
    let addr = start_server(service.clone()).await;

    let mut client = TcpPlayerClient::default();
    client.dial(&addr, Duration::from_secs(30)).await.unwrap();
    let (events, errs) = client
        .stream_tables("start", &["orders".to_string()], None)
        .await
        .unwrap();
    let got = events.collect().await;
    assert!(errs.err().is_none());

    assert_eq!(got.len(), 2);
    let sqls: Vec<&str> = got[0].statements.iter().map(|s| s.sql.as_str()).collect();
    assert_eq!(
        sqls,
        vec![
            "SET TIMESTAMP=1",
            "insert into orders(id) values (1) /* _stream orders (id ) (1 ); */"
        ]
    );
    assert!(got[1].statements.is_empty());
    assert_eq!(got[1].transaction_id, "tx2");
    assert_eq!(
        *service.source().seen_positions.lock(),
        vec!["start".to_string()]
    );
}
