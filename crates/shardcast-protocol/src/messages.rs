//! Protocol message types

use crate::binlog::{BinlogTransaction, Charset, KeyRange, KeyspaceIdType};
use crate::error::{ProtocolError, Result};
use crate::event::StreamEvent;
use crate::session::{Session, TabletType};
use crate::vtrpc::{CallerId, RpcError};
use crate::{WireFormat, MAX_MESSAGE_SIZE, WIRE_HEADER_SIZE};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One query of a batch, bound to a list of shards
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundShardQuery {
    pub sql: String,
    pub keyspace: String,
    pub shards: Vec<String>,
}

/// One query of a batch, bound to a list of keyspace ids
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundKeyspaceIdQuery {
    pub sql: String,
    pub keyspace: String,
    #[serde(with = "crate::serde_utils::bytes_list_serde")]
    pub keyspace_ids: Vec<Bytes>,
}

/// External id of an entity row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityValue {
    Int(i64),
    Uint(u64),
    Bytes(#[serde(with = "crate::serde_utils::bytes_serde")] Bytes),
}

/// Maps an entity's external id to the keyspace id that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityId {
    pub external_id: EntityValue,
    #[serde(with = "crate::serde_utils::bytes_serde")]
    pub keyspace_id: Bytes,
}

/// Result rows of a gateway query
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows_affected: u64,
    pub insert_id: u64,
    pub rows: Vec<Vec<String>>,
}

/// Protocol request messages
///
/// # Stability
///
/// **WARNING**: Variant order must remain stable for postcard serialization compatibility.
/// Adding new variants should only be done at the end of the enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Stream update events starting at a replication position
    StreamUpdate { position: String },

    /// Stream transactions whose keyspace ids fall in a key range
    StreamKeyRange {
        position: String,
        keyspace_id_type: KeyspaceIdType,
        key_range: KeyRange,
        charset: Option<Charset>,
    },

    /// Stream transactions touching any of the given tables
    StreamTables {
        position: String,
        tables: Vec<String>,
        charset: Option<Charset>,
    },

    /// Execute a keyspace-agnostic query through the gateway
    Execute {
        caller_id: Option<CallerId>,
        sql: String,
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    },

    /// Execute a query against an explicit shard list
    ExecuteShards {
        caller_id: Option<CallerId>,
        sql: String,
        keyspace: String,
        shards: Vec<String>,
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    },

    /// Open a gateway transaction
    Begin,

    /// Commit a gateway transaction
    Commit { session: Option<Session> },

    /// Roll back a gateway transaction
    Rollback { session: Option<Session> },

    /// Execute a batch of shard-bound queries
    ExecuteBatchShards {
        caller_id: Option<CallerId>,
        queries: Vec<BoundShardQuery>,
        tablet_type: TabletType,
        as_transaction: bool,
        session: Option<Session>,
    },

    /// Execute a query on the shards owning the given keyspace ids
    ExecuteKeyspaceIds {
        caller_id: Option<CallerId>,
        sql: String,
        keyspace: String,
        #[serde(with = "crate::serde_utils::bytes_list_serde")]
        keyspace_ids: Vec<Bytes>,
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    },

    /// Execute a query on the shards covering the given key ranges
    ExecuteKeyRanges {
        caller_id: Option<CallerId>,
        sql: String,
        keyspace: String,
        key_ranges: Vec<KeyRange>,
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    },

    /// Execute a query once per shard, restricted to the entities it owns
    ExecuteEntityIds {
        caller_id: Option<CallerId>,
        sql: String,
        keyspace: String,
        entity_column_name: String,
        entity_keyspace_ids: Vec<EntityId>,
        tablet_type: TabletType,
        session: Option<Session>,
        not_in_transaction: bool,
    },

    /// Execute a batch of keyspace-id-bound queries
    ExecuteBatchKeyspaceIds {
        caller_id: Option<CallerId>,
        queries: Vec<BoundKeyspaceIdQuery>,
        tablet_type: TabletType,
        as_transaction: bool,
        session: Option<Session>,
    },

    /// Stream the rows of a keyspace-agnostic query
    StreamExecute {
        caller_id: Option<CallerId>,
        sql: String,
        tablet_type: TabletType,
    },

    /// Stream the rows of a query against an explicit shard list
    StreamExecuteShards {
        caller_id: Option<CallerId>,
        sql: String,
        keyspace: String,
        shards: Vec<String>,
        tablet_type: TabletType,
    },

    /// Stream the rows of a query over key ranges
    StreamExecuteKeyRanges {
        caller_id: Option<CallerId>,
        sql: String,
        keyspace: String,
        key_ranges: Vec<KeyRange>,
        tablet_type: TabletType,
    },

    /// Stream the rows of a query over keyspace ids
    StreamExecuteKeyspaceIds {
        caller_id: Option<CallerId>,
        sql: String,
        keyspace: String,
        #[serde(with = "crate::serde_utils::bytes_list_serde")]
        keyspace_ids: Vec<Bytes>,
        tablet_type: TabletType,
    },
}

impl Request {
    /// Whether this is one of the update-stream requests
    pub fn is_stream(&self) -> bool {
        matches!(
            self,
            Request::StreamUpdate { .. }
                | Request::StreamKeyRange { .. }
                | Request::StreamTables { .. }
        )
    }

    /// Whether this is a streaming gateway query
    pub fn is_query_stream(&self) -> bool {
        matches!(
            self,
            Request::StreamExecute { .. }
                | Request::StreamExecuteShards { .. }
                | Request::StreamExecuteKeyRanges { .. }
                | Request::StreamExecuteKeyspaceIds { .. }
        )
    }
}

/// Protocol response messages
///
/// **WARNING**: Variant order must remain stable for postcard serialization compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// One update-stream event
    StreamEvent(StreamEvent),

    /// One (possibly filtered) binlog transaction
    BinlogTransaction(BinlogTransaction),

    /// Clean end of a stream
    StreamEnd,

    /// Terminal stream failure
    StreamError(RpcError),

    /// Gateway query reply
    QueryResult {
        result: Option<QueryResult>,
        session: Option<Session>,
        error: Option<RpcError>,
    },

    /// Reply to `Begin`
    Session {
        session: Option<Session>,
        error: Option<RpcError>,
    },

    /// Reply to `Commit` / `Rollback`
    Done { error: Option<RpcError> },

    /// Request-level error (malformed frame, unsupported request)
    Error(RpcError),

    /// Reply to a batch execute, one result per query
    BatchResult {
        results: Vec<QueryResult>,
        session: Option<Session>,
        error: Option<RpcError>,
    },

    /// One chunk of a streaming query. A chunk carrying an error reports an
    /// application failure and has no rows.
    StreamQueryResult {
        result: Option<QueryResult>,
        error: Option<RpcError>,
    },
}

macro_rules! wire_codec {
    ($ty:ty) => {
        impl $ty {
            /// Serialize to bytes (postcard format, no format prefix)
            #[inline]
            pub fn to_bytes(&self) -> Result<Vec<u8>> {
                Ok(postcard::to_allocvec(self)?)
            }

            /// Deserialize from bytes (postcard format)
            #[inline]
            pub fn from_bytes(data: &[u8]) -> Result<Self> {
                postcard::from_bytes(data).map_err(|e| ProtocolError::Deserialization(e.to_string()))
            }

            /// Serialize with wire format prefix
            ///
            /// Wire format: `[format_byte][correlation_id (4 bytes BE)][payload]`.
            /// The length prefix is added by the transport layer.
            ///
            /// # Errors
            ///
            /// Returns [`ProtocolError::MessageTooLarge`] if the serialized
            /// message exceeds [`MAX_MESSAGE_SIZE`].
            pub fn to_wire(&self, format: WireFormat, correlation_id: u32) -> Result<Vec<u8>> {
                let result = match format {
                    WireFormat::Postcard => {
                        let mut result = Vec::with_capacity(WIRE_HEADER_SIZE + 128);
                        result.push(format.as_byte());
                        result.extend_from_slice(&correlation_id.to_be_bytes());
                        postcard::to_extend(self, result)?
                    }
                };

                if result.len() > MAX_MESSAGE_SIZE {
                    return Err(ProtocolError::MessageTooLarge(result.len(), MAX_MESSAGE_SIZE));
                }

                Ok(result)
            }

            /// Deserialize with format detection.
            ///
            /// Returns the message, the detected format and the correlation id.
            pub fn from_wire(data: &[u8]) -> Result<(Self, WireFormat, u32)> {
                if data.len() < WIRE_HEADER_SIZE {
                    return Err(ProtocolError::InvalidFormat(
                        "Wire data too short (need format byte + correlation_id)".into(),
                    ));
                }

                let format = WireFormat::from_byte(data[0]).ok_or_else(|| {
                    ProtocolError::InvalidFormat(format!("Unknown wire format: 0x{:02x}", data[0]))
                })?;
                let correlation_id = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
                let message = Self::from_bytes(&data[WIRE_HEADER_SIZE..])?;
                Ok((message, format, correlation_id))
            }
        }
    };
}

wire_codec!(Request);
wire_codec!(Response);
