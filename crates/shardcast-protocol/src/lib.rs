//! shardcast wire protocol
//!
//! This crate defines the wire types shared between `shardcast-client` and
//! `shardcast-server`: binlog transactions, update-stream events, gateway
//! sessions and RPC errors, plus the framed request/response envelope.
//!
//! # Protocol Stability
//!
//! The enum variant order is significant for postcard serialization. Changes to variant
//! order will break wire compatibility with existing clients/servers.
//!
//! # Example
//!
//! ```rust
//! use shardcast_protocol::{Request, WireFormat};
//!
//! let request = Request::StreamUpdate { position: "MariaDB/0-1-42".into() };
//! let bytes = request.to_wire(WireFormat::Postcard, 7).unwrap();
//! let (decoded, _, correlation_id) = Request::from_wire(&bytes).unwrap();
//! assert_eq!(correlation_id, 7);
//! assert!(matches!(decoded, Request::StreamUpdate { .. }));
//! ```

mod binlog;
mod error;
mod event;
mod messages;
pub mod serde_utils;
pub mod session;
pub mod sqltypes;
mod vtrpc;

pub use binlog::{BinlogTransaction, Category, Charset, KeyRange, KeyspaceIdType, Statement};
pub use error::{ProtocolError, Result};
pub use event::{Field, StreamEvent};
pub use messages::{
    BoundKeyspaceIdQuery, BoundShardQuery, EntityId, EntityValue, QueryResult, Request, Response,
};
pub use session::{Session, ShardSession, TabletType};
pub use vtrpc::{CallerId, ErrorCode, RpcError};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum message size (64 MiB)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Size of the wire header: format byte + 4-byte correlation id
pub const WIRE_HEADER_SIZE: usize = 5;

/// Payload encoding announced by the first byte of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WireFormat {
    /// postcard (compact serde binary)
    #[default]
    Postcard,
}

impl WireFormat {
    pub fn as_byte(self) -> u8 {
        match self {
            WireFormat::Postcard => 0x00,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(WireFormat::Postcard),
            _ => None,
        }
    }
}
