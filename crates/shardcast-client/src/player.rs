//! Binlog player client
//!
//! A player connects to a tablet's update-stream service and consumes one
//! of three streams: raw update events, transactions for a key range, or
//! transactions touching a table set.
//!
//! The TCP implementation speaks the framed protocol: each stream request is
//! answered by a sequence of replies terminated by `StreamEnd` (clean) or
//! `StreamError` (failure).

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::framing;
use crate::stream::{open_stream, ErrFunc, EventStream, FramedReplies};
use async_trait::async_trait;
use shardcast_protocol::{
    BinlogTransaction, Charset, KeyRange, KeyspaceIdType, Request, Response, StreamEvent,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Stream of raw update events
pub type UpdateEvents = (EventStream<StreamEvent>, ErrFunc);

/// Stream of binlog transactions
pub type Transactions = (EventStream<BinlogTransaction>, ErrFunc);

/// Client side of the update-stream service.
///
/// Every stream method either fails immediately (nothing was started) or
/// returns an open stream whose termination cause is reported by its
/// [`ErrFunc`].
#[async_trait]
pub trait BinlogPlayerClient: Send {
    async fn dial(&mut self, endpoint: &str, timeout: Duration) -> Result<()>;

    async fn close(&mut self);

    async fn serve_update_stream(&mut self, position: &str) -> Result<UpdateEvents>;

    async fn stream_key_range(
        &mut self,
        position: &str,
        keyspace_id_type: KeyspaceIdType,
        key_range: &KeyRange,
        charset: Option<Charset>,
    ) -> Result<Transactions>;

    async fn stream_tables(
        &mut self,
        position: &str,
        tables: &[String],
        charset: Option<Charset>,
    ) -> Result<Transactions>;
}

fn to_event(response: Response) -> Result<StreamEvent> {
    match response {
        Response::StreamEvent(event) => Ok(event),
        other => Err(Error::invalid_response(format!(
            "expected stream event, got {:?}",
            other
        ))),
    }
}

fn to_transaction(response: Response) -> Result<BinlogTransaction> {
    match response {
        Response::BinlogTransaction(tx) => Ok(tx),
        other => Err(Error::invalid_response(format!(
            "expected binlog transaction, got {:?}",
            other
        ))),
    }
}

/// [`BinlogPlayerClient`] over the framed TCP protocol.
///
/// `dial` establishes a connection that the next stream uses; later streams
/// open fresh connections to the same endpoint.
#[derive(Debug)]
pub struct TcpPlayerClient {
    config: ClientConfig,
    endpoint: Option<String>,
    timeout: Duration,
    idle: Option<TcpStream>,
    next_correlation_id: u32,
}

impl Default for TcpPlayerClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl TcpPlayerClient {
    pub fn new(config: ClientConfig) -> Self {
        let timeout = config.connect_timeout();
        Self {
            config,
            endpoint: None,
            timeout,
            idle: None,
            next_correlation_id: 0,
        }
    }

    async fn start(&mut self, request: Request) -> Result<FramedReplies> {
        let mut stream = match self.idle.take() {
            Some(stream) => stream,
            None => {
                let endpoint = self.endpoint.as_deref().ok_or(Error::NotConnected)?;
                framing::connect(endpoint, self.timeout).await?
            }
        };
        self.next_correlation_id = self.next_correlation_id.wrapping_add(1);
        let correlation_id = self.next_correlation_id;
        framing::write_request(&mut stream, &request, correlation_id).await?;
        debug!("Started stream {} with {:?}", correlation_id, request);
        Ok(FramedReplies::new(
            stream,
            correlation_id,
            self.config.max_message_size,
        ))
    }
}

#[async_trait]
impl BinlogPlayerClient for TcpPlayerClient {
    async fn dial(&mut self, endpoint: &str, timeout: Duration) -> Result<()> {
        let stream = framing::connect(endpoint, timeout).await?;
        info!("Binlog player connected to {}", endpoint);
        self.endpoint = Some(endpoint.to_string());
        self.timeout = timeout;
        self.idle = Some(stream);
        Ok(())
    }

    async fn close(&mut self) {
        self.idle = None;
        self.endpoint = None;
    }

    async fn serve_update_stream(&mut self, position: &str) -> Result<UpdateEvents> {
        let replies = self
            .start(Request::StreamUpdate {
                position: position.to_string(),
            })
            .await?;
        Ok(open_stream(replies, to_event))
    }

    async fn stream_key_range(
        &mut self,
        position: &str,
        keyspace_id_type: KeyspaceIdType,
        key_range: &KeyRange,
        charset: Option<Charset>,
    ) -> Result<Transactions> {
        let replies = self
            .start(Request::StreamKeyRange {
                position: position.to_string(),
                keyspace_id_type,
                key_range: key_range.clone(),
                charset,
            })
            .await?;
        Ok(open_stream(replies, to_transaction))
    }

    async fn stream_tables(
        &mut self,
        position: &str,
        tables: &[String],
        charset: Option<Charset>,
    ) -> Result<Transactions> {
        let replies = self
            .start(Request::StreamTables {
                position: position.to_string(),
                tables: tables.to_vec(),
                charset,
            })
            .await?;
        Ok(open_stream(replies, to_transaction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardcast_protocol::{Category, ErrorCode, RpcError, Statement, MAX_MESSAGE_SIZE};
    use tokio::net::TcpListener;

    /// Answers the first request on one connection with `replies`
    async fn one_shot_server(replies: Vec<Response>) -> (String, tokio::task::JoinHandle<Request>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let (request, id) = framing::read_request(&mut socket, MAX_MESSAGE_SIZE)
                .await
                .unwrap()
                .unwrap();
            for reply in replies {
                framing::write_response(&mut socket, &reply, id).await.unwrap();
            }
            request
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_stream_tables_until_end() {
        let tx = BinlogTransaction::new(1, "t1")
            .with_statement(Statement::new(Category::Dml, "dml /* _stream a (id ) */"));
        let (addr, server) = one_shot_server(vec![
            Response::BinlogTransaction(tx.clone()),
            Response::StreamEnd,
        ])
        .await;

        let mut client = TcpPlayerClient::default();
        client.dial(&addr, Duration::from_secs(5)).await.unwrap();
        let (events, errs) = client
            .stream_tables("pos", &["a".to_string()], None)
            .await
            .unwrap();
        assert_eq!(events.collect().await, vec![tx]);
        assert!(errs.err().is_none());

        match server.await.unwrap() {
            Request::StreamTables { tables, .. } => assert_eq!(tables, vec!["a".to_string()]),
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_error_reaches_err_func() {
        let (addr, _server) = one_shot_server(vec![Response::StreamError(RpcError::new(
            ErrorCode::InternalError,
            "Caught panic: test-triggered panic",
        ))])
        .await;

        let mut client = TcpPlayerClient::default();
        client.dial(&addr, Duration::from_secs(5)).await.unwrap();
        let (events, errs) = client.serve_update_stream("pos").await.unwrap();
        assert!(events.collect().await.is_empty());
        let err = errs.err().unwrap();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert!(err.to_string().contains("test-triggered panic"));
    }

    #[tokio::test]
    async fn test_connection_drop_without_end_is_error() {
        let (addr, _server) = one_shot_server(vec![]).await;
        let mut client = TcpPlayerClient::default();
        client.dial(&addr, Duration::from_secs(5)).await.unwrap();
        let (events, errs) = client.serve_update_stream("pos").await.unwrap();
        assert!(events.collect().await.is_empty());
        assert!(matches!(errs.err(), Some(Error::ConnectionError(_))));
    }

    #[tokio::test]
    async fn test_wrong_reply_type_is_error() {
        let (addr, _server) = one_shot_server(vec![
            Response::StreamEvent(StreamEvent::default()),
            Response::StreamEnd,
        ])
        .await;
        let mut client = TcpPlayerClient::default();
        client.dial(&addr, Duration::from_secs(5)).await.unwrap();
        let (events, errs) = client
            .stream_key_range("pos", KeyspaceIdType::Uint64, &KeyRange::default(), None)
            .await
            .unwrap();
        assert!(events.collect().await.is_empty());
        assert!(matches!(errs.err(), Some(Error::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_stream_without_dial_fails_immediately() {
        let mut client = TcpPlayerClient::default();
        let err = client.serve_update_stream("pos").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let mut client = TcpPlayerClient::default();
        let err = client.dial(&addr, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_retriable());
    }
}
