//! # shardcast-server
//!
//! Serves update streams to binlog players.
//!
//! ```text
//! client ──request──▶ StreamServer ──spawn_blocking──▶ catch_fault(UpdateStream::…)
//!    ▲                     │                                   │ send(reply)
//!    └── replies, then ────┘◀──────── mpsc(reply_buffer) ◀─────┘
//!        StreamEnd | StreamError
//! ```
//!
//! A panicking handler is reported to its client as an `INTERNAL_ERROR`
//! stream error; the server keeps accepting connections.

pub mod config;
pub mod server;
pub mod service;

pub use config::ServerConfig;
pub use server::{ShutdownHandle, StreamServer};
pub use service::{BinlogSource, FilteredUpdateStream, SendEvent, SendTransaction, UpdateStream};
