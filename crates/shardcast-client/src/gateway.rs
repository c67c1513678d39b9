//! Gateway connection
//!
//! Executes queries through a query gateway that fans them out to shards.
//! Multi-shard transactions are tracked in a [`Session`] the caller threads
//! through every call. Sessions are marshalled on each call:
//! [`session_to_wire`] outbound and [`session_from_wire`] inbound.
//!
//! Query calls return the error together with the session to keep using.
//! When the request never got an answer the caller's session comes back
//! unchanged; otherwise it is the session the gateway replied with.
//!
//! Streaming queries run outside any transaction, each on its own connection.
//! The gateway reports an application failure in-band as a result chunk
//! carrying an error; such chunks never reach the consumer. When the stream
//! ends, its [`ErrFunc`] reports the transport failure if there was one,
//! otherwise the most recent in-band error.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::framing;
use crate::stream::{open_stream, ErrFunc, EventStream, FramedReplies, RecvStream};
use async_trait::async_trait;
use bytes::Bytes;
use shardcast_core::VtError;
use shardcast_protocol::session::{session_from_wire, session_to_wire};
use shardcast_protocol::{
    BoundKeyspaceIdQuery, BoundShardQuery, CallerId, EntityId, KeyRange, QueryResult, Request,
    Response, Session, TabletType, WireFormat,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Result of a query call plus the session to continue with
pub type QueryReply<T> = (Result<T>, Option<Session>);

/// Rows of a streaming query
pub type QueryResults = (EventStream<QueryResult>, ErrFunc);

#[async_trait]
pub trait GatewayConn: Send {
    async fn execute(
        &mut self,
        sql: &str,
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    ) -> QueryReply<QueryResult>;

    async fn execute_shards(
        &mut self,
        sql: &str,
        keyspace: &str,
        shards: &[String],
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    ) -> QueryReply<QueryResult>;

    async fn execute_keyspace_ids(
        &mut self,
        sql: &str,
        keyspace: &str,
        keyspace_ids: &[Bytes],
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    ) -> QueryReply<QueryResult>;

    async fn execute_key_ranges(
        &mut self,
        sql: &str,
        keyspace: &str,
        key_ranges: &[KeyRange],
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    ) -> QueryReply<QueryResult>;

    #[allow(clippy::too_many_arguments)]
    async fn execute_entity_ids(
        &mut self,
        sql: &str,
        keyspace: &str,
        entity_column_name: &str,
        entity_keyspace_ids: Vec<EntityId>,
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    ) -> QueryReply<QueryResult>;

    async fn execute_batch_shards(
        &mut self,
        queries: Vec<BoundShardQuery>,
        tablet_type: TabletType,
        as_transaction: bool,
        session: Option<Session>,
    ) -> QueryReply<Vec<QueryResult>>;

    async fn execute_batch_keyspace_ids(
        &mut self,
        queries: Vec<BoundKeyspaceIdQuery>,
        tablet_type: TabletType,
        as_transaction: bool,
        session: Option<Session>,
    ) -> QueryReply<Vec<QueryResult>>;

    async fn stream_execute(&mut self, sql: &str, tablet_type: TabletType)
        -> Result<QueryResults>;

    async fn stream_execute_shards(
        &mut self,
        sql: &str,
        keyspace: &str,
        shards: &[String],
        tablet_type: TabletType,
    ) -> Result<QueryResults>;

    async fn stream_execute_key_ranges(
        &mut self,
        sql: &str,
        keyspace: &str,
        key_ranges: &[KeyRange],
        tablet_type: TabletType,
    ) -> Result<QueryResults>;

    async fn stream_execute_keyspace_ids(
        &mut self,
        sql: &str,
        keyspace: &str,
        keyspace_ids: &[Bytes],
        tablet_type: TabletType,
    ) -> Result<QueryResults>;

    /// Open a transaction; the returned session must be passed to later calls
    async fn begin(&mut self) -> Result<Option<Session>>;

    async fn commit(&mut self, session: Option<Session>) -> Result<()>;

    async fn rollback(&mut self, session: Option<Session>) -> Result<()>;

    async fn close(&mut self);
}

/// [`GatewayConn`] over one framed TCP connection.
///
/// A transport failure mid-call leaves the connection unusable; later calls
/// fail with [`Error::NotConnected`] until the caller dials again.
#[derive(Debug)]
pub struct TcpGatewayConn {
    stream: Option<TcpStream>,
    address: String,
    connect_timeout: Duration,
    next_correlation_id: u32,
    max_message_size: usize,
    caller_id: Option<CallerId>,
}

impl TcpGatewayConn {
    pub async fn dial(address: &str, timeout: Duration) -> Result<Self> {
        Self::dial_with_config(address, &ClientConfig::default().with_connect_timeout(timeout))
            .await
    }

    pub async fn dial_with_config(address: &str, config: &ClientConfig) -> Result<Self> {
        let stream = framing::connect(address, config.connect_timeout()).await?;
        info!("Connected to gateway at {}", address);
        Ok(Self {
            stream: Some(stream),
            address: address.to_string(),
            connect_timeout: config.connect_timeout(),
            next_correlation_id: 0,
            max_message_size: config.max_message_size,
            caller_id: None,
        })
    }

    /// Send `caller_id` as the effective caller of every later request
    pub fn with_caller_id(mut self, caller_id: CallerId) -> Self {
        self.caller_id = Some(caller_id);
        self
    }

    pub fn set_caller_id(&mut self, caller_id: Option<CallerId>) {
        self.caller_id = caller_id;
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn next_id(&mut self) -> u32 {
        self.next_correlation_id = self.next_correlation_id.wrapping_add(1);
        self.next_correlation_id
    }

    async fn call(&mut self, request: Request) -> Result<Response> {
        let correlation_id = self.next_id();
        let frame = request.to_wire(WireFormat::Postcard, correlation_id)?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::NotConnected);
        };

        match exchange(stream, &frame, correlation_id, self.max_message_size).await {
            Ok(Response::Error(e)) => Err(VtError::from(e).into()),
            Ok(response) => Ok(response),
            Err(e) => {
                // the stream may be positioned inside a frame
                warn!("Dropping gateway connection to {}: {}", self.address, e);
                self.stream = None;
                Err(e)
            }
        }
    }

    async fn query(&mut self, request: Request, session: Option<Session>) -> QueryReply<QueryResult> {
        match self.call(request).await {
            Err(e) => (Err(e), session),
            Ok(Response::QueryResult {
                result,
                session: reply,
                error,
            }) => {
                let session = session_from_wire(reply);
                match VtError::from_rpc_error(error) {
                    Some(e) => (Err(e.into()), session),
                    None => (Ok(result.unwrap_or_default()), session),
                }
            }
            Ok(other) => (Err(unexpected("query result", &other)), session),
        }
    }

    async fn batch(
        &mut self,
        request: Request,
        session: Option<Session>,
    ) -> QueryReply<Vec<QueryResult>> {
        match self.call(request).await {
            Err(e) => (Err(e), session),
            Ok(Response::BatchResult {
                results,
                session: reply,
                error,
            }) => {
                let session = session_from_wire(reply);
                match VtError::from_rpc_error(error) {
                    Some(e) => (Err(e.into()), session),
                    None => (Ok(results), session),
                }
            }
            Ok(other) => (Err(unexpected("batch result", &other)), session),
        }
    }

    async fn start_stream(&mut self, request: Request) -> Result<QueryResults> {
        if self.stream.is_none() {
            return Err(Error::NotConnected);
        }
        let mut stream = framing::connect(&self.address, self.connect_timeout).await?;
        let correlation_id = self.next_id();
        framing::write_request(&mut stream, &request, correlation_id).await?;
        debug!("Started query stream {} to {}", correlation_id, self.address);
        let replies = QueryStreamReplies {
            replies: FramedReplies::new(stream, correlation_id, self.max_message_size),
            app_error: None,
        };
        Ok(open_stream(replies, Ok))
    }
}

async fn exchange(
    stream: &mut TcpStream,
    frame: &[u8],
    correlation_id: u32,
    max_message_size: usize,
) -> Result<Response> {
    framing::write_frame(stream, frame).await?;
    let (response, got) = framing::read_response(stream, max_message_size)
        .await?
        .ok_or_else(|| Error::connection("gateway closed the connection"))?;
    if got != correlation_id {
        return Err(Error::invalid_response(format!(
            "correlation id mismatch: expected {}, got {}",
            correlation_id, got
        )));
    }
    Ok(response)
}

fn unexpected(expected: &str, got: &Response) -> Error {
    Error::invalid_response(format!("expected {}, got {:?}", expected, got))
}

/// Result chunks of a streaming query with in-band errors held back
struct QueryStreamReplies {
    replies: FramedReplies,
    app_error: Option<VtError>,
}

#[async_trait]
impl RecvStream<QueryResult> for QueryStreamReplies {
    async fn recv(&mut self) -> Result<Option<QueryResult>> {
        loop {
            match self.replies.recv().await? {
                None => {
                    return match self.app_error.take() {
                        Some(e) => Err(e.into()),
                        None => Ok(None),
                    }
                }
                Some(Response::StreamQueryResult {
                    error: Some(e),
                    ..
                }) => {
                    debug!("Query stream reported {}: {}", e.code, e.message);
                    self.app_error = Some(VtError::from(e));
                }
                Some(Response::StreamQueryResult {
                    result,
                    error: None,
                }) => return Ok(Some(result.unwrap_or_default())),
                Some(other) => return Err(unexpected("stream query result", &other)),
            }
        }
    }
}

#[async_trait]
impl GatewayConn for TcpGatewayConn {
    async fn execute(
        &mut self,
        sql: &str,
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    ) -> QueryReply<QueryResult> {
        let request = Request::Execute {
            caller_id: self.caller_id.clone(),
            sql: sql.to_string(),
            tablet_type,
            session: session_to_wire(session.as_ref()),
            not_in_transaction,
        };
        self.query(request, session).await
    }

    async fn execute_shards(
        &mut self,
        sql: &str,
        keyspace: &str,
        shards: &[String],
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    ) -> QueryReply<QueryResult> {
        let request = Request::ExecuteShards {
            caller_id: self.caller_id.clone(),
            sql: sql.to_string(),
            keyspace: keyspace.to_string(),
            shards: shards.to_vec(),
            tablet_type,
            session: session_to_wire(session.as_ref()),
            not_in_transaction,
        };
        self.query(request, session).await
    }

    async fn execute_keyspace_ids(
        &mut self,
        sql: &str,
        keyspace: &str,
        keyspace_ids: &[Bytes],
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    ) -> QueryReply<QueryResult> {
        let request = Request::ExecuteKeyspaceIds {
            caller_id: self.caller_id.clone(),
            sql: sql.to_string(),
            keyspace: keyspace.to_string(),
            keyspace_ids: keyspace_ids.to_vec(),
            tablet_type,
            session: session_to_wire(session.as_ref()),
            not_in_transaction,
        };
        self.query(request, session).await
    }

    async fn execute_key_ranges(
        &mut self,
        sql: &str,
        keyspace: &str,
        key_ranges: &[KeyRange],
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    ) -> QueryReply<QueryResult> {
        let request = Request::ExecuteKeyRanges {
            caller_id: self.caller_id.clone(),
            sql: sql.to_string(),
            keyspace: keyspace.to_string(),
            key_ranges: key_ranges.to_vec(),
            tablet_type,
            session: session_to_wire(session.as_ref()),
            not_in_transaction,
        };
        self.query(request, session).await
    }

    async fn execute_entity_ids(
        &mut self,
        sql: &str,
        keyspace: &str,
        entity_column_name: &str,
        entity_keyspace_ids: Vec<EntityId>,
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    ) -> QueryReply<QueryResult> {
        let request = Request::ExecuteEntityIds {
            caller_id: self.caller_id.clone(),
            sql: sql.to_string(),
            keyspace: keyspace.to_string(),
            entity_column_name: entity_column_name.to_string(),
            entity_keyspace_ids,
            tablet_type,
            session: session_to_wire(session.as_ref()),
            not_in_transaction,
        };
        self.query(request, session).await
    }

    async fn execute_batch_shards(
        &mut self,
        queries: Vec<BoundShardQuery>,
        tablet_type: TabletType,
        as_transaction: bool,
        session: Option<Session>,
    ) -> QueryReply<Vec<QueryResult>> {
        let request = Request::ExecuteBatchShards {
            caller_id: self.caller_id.clone(),
            queries,
            tablet_type,
            as_transaction,
            session: session_to_wire(session.as_ref()),
        };
        self.batch(request, session).await
    }

    async fn execute_batch_keyspace_ids(
        &mut self,
        queries: Vec<BoundKeyspaceIdQuery>,
        tablet_type: TabletType,
        as_transaction: bool,
        session: Option<Session>,
    ) -> QueryReply<Vec<QueryResult>> {
        let request = Request::ExecuteBatchKeyspaceIds {
            caller_id: self.caller_id.clone(),
            queries,
            tablet_type,
            as_transaction,
            session: session_to_wire(session.as_ref()),
        };
        self.batch(request, session).await
    }

    async fn stream_execute(
        &mut self,
        sql: &str,
        tablet_type: TabletType,
    ) -> Result<QueryResults> {
        let request = Request::StreamExecute {
            caller_id: self.caller_id.clone(),
            sql: sql.to_string(),
            tablet_type,
        };
        self.start_stream(request).await
    }

    async fn stream_execute_shards(
        &mut self,
        sql: &str,
        keyspace: &str,
        shards: &[String],
        tablet_type: TabletType,
    ) -> Result<QueryResults> {
        let request = Request::StreamExecuteShards {
            caller_id: self.caller_id.clone(),
            sql: sql.to_string(),
            keyspace: keyspace.to_string(),
            shards: shards.to_vec(),
            tablet_type,
        };
        self.start_stream(request).await
    }

    async fn stream_execute_key_ranges(
        &mut self,
        sql: &str,
        keyspace: &str,
        key_ranges: &[KeyRange],
        tablet_type: TabletType,
    ) -> Result<QueryResults> {
        let request = Request::StreamExecuteKeyRanges {
            caller_id: self.caller_id.clone(),
            sql: sql.to_string(),
            keyspace: keyspace.to_string(),
            key_ranges: key_ranges.to_vec(),
            tablet_type,
        };
        self.start_stream(request).await
    }

    async fn stream_execute_keyspace_ids(
        &mut self,
        sql: &str,
        keyspace: &str,
        keyspace_ids: &[Bytes],
        tablet_type: TabletType,
    ) -> Result<QueryResults> {
        let request = Request::StreamExecuteKeyspaceIds {
            caller_id: self.caller_id.clone(),
            sql: sql.to_string(),
            keyspace: keyspace.to_string(),
            keyspace_ids: keyspace_ids.to_vec(),
            tablet_type,
        };
        self.start_stream(request).await
    }

    async fn begin(&mut self) -> Result<Option<Session>> {
        match self.call(Request::Begin).await? {
            Response::Session { session, error } => match VtError::from_rpc_error(error) {
                Some(e) => Err(e.into()),
                None => Ok(session_from_wire(session)),
            },
            other => Err(unexpected("session", &other)),
        }
    }

    async fn commit(&mut self, session: Option<Session>) -> Result<()> {
        let request = Request::Commit {
            session: session_to_wire(session.as_ref()),
        };
        done(self.call(request).await?)
    }

    async fn rollback(&mut self, session: Option<Session>) -> Result<()> {
        let request = Request::Rollback {
            session: session_to_wire(session.as_ref()),
        };
        done(self.call(request).await?)
    }

    async fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("Closed gateway connection to {}", self.address);
        }
    }
}

fn done(response: Response) -> Result<()> {
    match response {
        Response::Done { error } => match VtError::from_rpc_error(error) {
            Some(e) => Err(e.into()),
            None => Ok(()),
        },
        other => Err(unexpected("done", &other)),
    }
}
