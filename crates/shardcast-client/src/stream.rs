//! Streaming client adapter
//!
//! Turns a pull-based transport stream into a bounded channel of domain
//! events plus a deferred error accessor:
//!
//! ```text
//! RecvStream ──recv──▶ producer task ──translate──▶ mpsc(10) ──▶ EventStream
//!                           │
//!                           └── transport error ──▶ ErrFunc
//! ```
//!
//! The channel closing is the only termination signal. Consumers drain the
//! [`EventStream`] until it yields `None`, then ask the [`ErrFunc`] whether
//! the stream ended cleanly.

use crate::error::{Error, Result};
use crate::framing;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use shardcast_core::{catch_fault, VtError};
use shardcast_protocol::Response;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the event channel between producer and consumer
pub const STREAM_BUFFER_SIZE: usize = 10;

/// A transport that yields messages until a clean end or a failure.
#[async_trait]
pub trait RecvStream<M>: Send + 'static {
    /// Next message; `Ok(None)` is a clean end of stream
    async fn recv(&mut self) -> Result<Option<M>>;
}

/// Replies to one stream request on a framed connection.
///
/// `StreamEnd` is the clean end; `StreamError` and `Error` replies become
/// [`Error::Rpc`]; a connection closed before `StreamEnd` is a failure.
pub struct FramedReplies {
    stream: TcpStream,
    correlation_id: u32,
    max_message_size: usize,
}

impl FramedReplies {
    pub fn new(stream: TcpStream, correlation_id: u32, max_message_size: usize) -> Self {
        Self {
            stream,
            correlation_id,
            max_message_size,
        }
    }
}

#[async_trait]
impl RecvStream<Response> for FramedReplies {
    async fn recv(&mut self) -> Result<Option<Response>> {
        let Some((response, correlation_id)) =
            framing::read_response(&mut self.stream, self.max_message_size).await?
        else {
            return Err(Error::connection("connection closed before end of stream"));
        };
        if correlation_id != self.correlation_id {
            return Err(Error::invalid_response(format!(
                "correlation id mismatch: expected {}, got {}",
                self.correlation_id, correlation_id
            )));
        }
        match response {
            Response::StreamEnd => Ok(None),
            Response::StreamError(e) | Response::Error(e) => Err(VtError::from(e).into()),
            other => Ok(Some(other)),
        }
    }
}

/// Deferred error accessor of an open stream.
///
/// The producer writes the slot at most once, before it drops the channel
/// sender, so reading it after the consumer has seen `None` observes the
/// final state.
#[derive(Debug, Clone, Default)]
pub struct ErrFunc {
    slot: Arc<OnceCell<Error>>,
}

impl ErrFunc {
    /// Error that terminated the stream, or `None` for a clean end
    pub fn err(&self) -> Option<&Error> {
        self.slot.get()
    }

    fn record(&self, err: Error) {
        if let Err(err) = self.slot.set(err) {
            debug!("Dropping secondary stream error: {}", err);
        }
    }
}

/// Consumer side of an open stream
#[derive(Debug)]
pub struct EventStream<E> {
    rx: mpsc::Receiver<E>,
}

impl<E> EventStream<E> {
    /// Next event; `None` once the producer has stopped
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Drain every remaining event
    pub async fn collect(mut self) -> Vec<E> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

/// Spawn a producer that pumps `stream` through `translate` into a bounded
/// channel.
pub fn open_stream<M, E, S, F>(stream: S, translate: F) -> (EventStream<E>, ErrFunc)
where
    M: Send + 'static,
    E: Send + 'static,
    S: RecvStream<M>,
    F: FnMut(M) -> Result<E> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER_SIZE);
    let errs = ErrFunc::default();
    let slot = errs.clone();

    tokio::spawn(async move {
        let mut stream = stream;
        let mut translate = translate;
        loop {
            let msg = match stream.recv().await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(e) => {
                    slot.record(e);
                    break;
                }
            };
            let event = match catch_fault(|| Ok(translate(msg))) {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    slot.record(e);
                    break;
                }
                Err(fault) => {
                    slot.record(fault.into());
                    break;
                }
            };
            if tx.send(event).await.is_err() {
                debug!("Stream consumer went away, stopping producer");
                break;
            }
        }
        // tx drops here, after any error has been recorded
    });

    (EventStream { rx }, errs)
}
