//! Dropped-statement counters
//!
//! Filters report unparseable statements to an injected
//! [`StreamErrorCounter`] rather than a process-wide global, so independent
//! filters (and tests) never share counts unless they share a counter.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic, labelled error counter
pub trait StreamErrorCounter: Send + Sync {
    fn add(&self, label: &'static str, delta: u64);
}

impl<C: StreamErrorCounter + ?Sized> StreamErrorCounter for Arc<C> {
    fn add(&self, label: &'static str, delta: u64) {
        (**self).add(label, delta)
    }
}

/// In-process counters, readable with [`AtomicStreamErrors::get`]
#[derive(Debug, Default)]
pub struct AtomicStreamErrors {
    counts: RwLock<HashMap<&'static str, AtomicU64>>,
}

impl AtomicStreamErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, label: &str) -> u64 {
        self.counts
            .read()
            .get(label)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl StreamErrorCounter for AtomicStreamErrors {
    fn add(&self, label: &'static str, delta: u64) {
        if let Some(c) = self.counts.read().get(label) {
            c.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.counts
            .write()
            .entry(label)
            .or_default()
            .fetch_add(delta, Ordering::Relaxed);
    }
}

/// Counter exported through the `metrics` facade as
/// `shardcast_update_stream_errors_total{label=...}`
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsStreamErrors;

impl StreamErrorCounter for MetricsStreamErrors {
    fn add(&self, label: &'static str, delta: u64) {
        metrics::counter!("shardcast_update_stream_errors_total", "label" => label).increment(delta);
    }
}
