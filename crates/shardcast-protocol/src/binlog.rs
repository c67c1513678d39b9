//! Binlog replication records
//!
//! A [`BinlogTransaction`] is one committed unit of change replayed to
//! downstream consumers. Statement order reflects the original commit order.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Character-set ids in effect when a statement was logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Charset {
    /// `character_set_client`
    pub client: i32,
    /// `collation_connection`
    pub conn: i32,
    /// `collation_server`
    pub server: i32,
}

impl Charset {
    pub fn new(client: i32, conn: i32, server: i32) -> Self {
        Self {
            client,
            conn,
            server,
        }
    }
}

/// Statement category as classified by the binlog streamer
///
/// WARNING: Variant order is part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Unrecognized,
    Error,
    Begin,
    Commit,
    Rollback,
    Dml,
    Ddl,
    Set,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Unrecognized => "BL_UNRECOGNIZED",
            Category::Error => "BL_ERROR",
            Category::Begin => "BL_BEGIN",
            Category::Commit => "BL_COMMIT",
            Category::Rollback => "BL_ROLLBACK",
            Category::Dml => "BL_DML",
            Category::Ddl => "BL_DDL",
            Category::Set => "BL_SET",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One statement of a replication transaction
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Statement {
    pub category: Category,
    pub charset: Option<Charset>,
    pub sql: String,
}

impl Statement {
    pub fn new(category: Category, sql: impl Into<String>) -> Self {
        Self {
            category,
            charset: None,
            sql: sql.into(),
        }
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = Some(charset);
        self
    }
}

/// A committed replication transaction
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BinlogTransaction {
    pub statements: Vec<Statement>,
    /// Commit timestamp (seconds since epoch)
    pub timestamp: i64,
    pub transaction_id: String,
}

impl BinlogTransaction {
    pub fn new(timestamp: i64, transaction_id: impl Into<String>) -> Self {
        Self {
            statements: Vec::new(),
            timestamp,
            transaction_id: transaction_id.into(),
        }
    }

    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// How keyspace ids are encoded for a keyspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyspaceIdType {
    #[default]
    Unset,
    Uint64,
    Bytes,
}

/// Half-open keyspace-id range `[start, end)`; empty bounds are unbounded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct KeyRange {
    #[serde(with = "crate::serde_utils::bytes_serde")]
    pub start: Bytes,
    #[serde(with = "crate::serde_utils::bytes_serde")]
    pub end: Bytes,
}

impl KeyRange {
    pub fn new(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Range bounded by two uint64 keyspace ids (big-endian encoded)
    pub fn from_u64(start: u64, end: u64) -> Self {
        Self::new(
            Bytes::copy_from_slice(&start.to_be_bytes()),
            Bytes::copy_from_slice(&end.to_be_bytes()),
        )
    }

    pub fn contains(&self, keyspace_id: &[u8]) -> bool {
        (self.start.is_empty() || keyspace_id >= &self.start[..])
            && (self.end.is_empty() || keyspace_id < &self.end[..])
    }
}
