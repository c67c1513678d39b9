//! Gateway sessions and their wire marshalling
//!
//! A [`Session`] tracks the per-shard transactions opened by one fanned-out
//! client transaction. On the wire, a session whose sub-session list is
//! absent is distinct from one carrying an explicit empty list. The two
//! marshalling helpers collapse these cases asymmetrically:
//!
//! - [`session_to_wire`] always sends an explicit list (absent → empty)
//! - [`session_from_wire`] normalizes an empty list back to absent
//!
//! So `session_to_wire(session_from_wire(w))` is not the identity for a
//! wire session whose list is absent, and an in-memory empty list reads back
//! as absent. Both directions are stable after one pass.

use serde::{Deserialize, Serialize};

/// Tablet role a query is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TabletType {
    #[default]
    Unknown,
    Master,
    Replica,
    Rdonly,
}

/// One shard's open transaction inside a session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShardSession {
    pub keyspace: String,
    pub shard: String,
    pub tablet_type: TabletType,
    pub transaction_id: i64,
}

/// Multi-shard transaction state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Session {
    pub in_transaction: bool,
    /// `None` is the in-memory form of "no sub-sessions"
    pub shard_sessions: Option<Vec<ShardSession>>,
}

impl Session {
    /// A fresh transaction with no shard participants yet
    pub fn begin() -> Self {
        Self {
            in_transaction: true,
            shard_sessions: None,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shard_sessions.as_ref().map_or(0, Vec::len)
    }
}

/// Prepare a session for sending.
///
/// A session with absent sub-sessions is rewritten to carry an explicit empty
/// list; everything else is passed through.
pub fn session_to_wire(session: Option<&Session>) -> Option<Session> {
    let session = session?;
    if session.shard_sessions.is_none() {
        return Some(Session {
            in_transaction: session.in_transaction,
            shard_sessions: Some(Vec::new()),
        });
    }
    Some(session.clone())
}

/// Normalize a received session: an empty sub-session list becomes absent.
pub fn session_from_wire(session: Option<Session>) -> Option<Session> {
    let mut session = session?;
    if session.shard_sessions.as_ref().is_some_and(Vec::is_empty) {
        session.shard_sessions = None;
    }
    Some(session)
}
