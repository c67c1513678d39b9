//! # shardcast-client
//!
//! Clients for the shardcast services:
//!
//! - [`BinlogPlayerClient`] consumes update streams from a tablet; every
//!   stream is an [`EventStream`] plus an [`ErrFunc`] reporting why it ended
//! - [`GatewayConn`] runs queries, streaming queries and multi-shard
//!   transactions through a query gateway
//!
//! Implementations are looked up by protocol name through the
//! [`registry`]; the built-in transport is `"tcp"`.
//!
//! ```no_run
//! # async fn demo() -> shardcast_client::Result<()> {
//! use std::time::Duration;
//!
//! let mut client = shardcast_client::new_client("tcp")?;
//! client.dial("127.0.0.1:15991", Duration::from_secs(5)).await?;
//! let (mut events, errs) = client
//!     .stream_tables("MariaDB/0-1-42", &["orders".to_string()], None)
//!     .await?;
//! while let Some(tx) = events.recv().await {
//!     println!("{} statements at {}", tx.statements.len(), tx.timestamp);
//! }
//! if let Some(err) = errs.err() {
//!     eprintln!("stream failed: {}", err);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod framing;
pub mod gateway;
pub mod player;
pub mod registry;
pub mod stream;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use gateway::{GatewayConn, QueryResults, TcpGatewayConn};
pub use player::{BinlogPlayerClient, TcpPlayerClient};
pub use registry::{
    dial, new_client, new_client_from_config, register_client_factory, register_dialer,
};
pub use stream::{
    open_stream, ErrFunc, EventStream, FramedReplies, RecvStream, STREAM_BUFFER_SIZE,
};
