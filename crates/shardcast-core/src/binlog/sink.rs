//! The `TransactionSink` capability
//!
//! A sink receives transactions one at a time, synchronously, in commit
//! order. An error stops delivery: the producer must not send further
//! transactions after a sink failed. Filters wrap a sink and are sinks
//! themselves, so they stack by decoration.

use crate::error::Result;
use shardcast_protocol::BinlogTransaction;

/// Receiver of replication transactions
pub trait TransactionSink {
    fn send(&mut self, transaction: BinlogTransaction) -> Result<()>;
}

impl<F> TransactionSink for F
where
    F: FnMut(BinlogTransaction) -> Result<()>,
{
    fn send(&mut self, transaction: BinlogTransaction) -> Result<()> {
        self(transaction)
    }
}

/// Sink that keeps everything it receives
#[derive(Debug, Default)]
pub struct CollectSink {
    pub transactions: Vec<BinlogTransaction>,
}

impl TransactionSink for CollectSink {
    fn send(&mut self, transaction: BinlogTransaction) -> Result<()> {
        self.transactions.push(transaction);
        Ok(())
    }
}
