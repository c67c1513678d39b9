use crate::config::ServerConfig;
use crate::service::UpdateStream;
use shardcast_client::framing;
use shardcast_core::{catch_fault, CoreError, VtError};
use shardcast_protocol::{ErrorCode, Request, Response, RpcError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Serves an [`UpdateStream`] over framed TCP.
///
/// Each connection carries a sequence of stream requests. A stream is
/// answered by its replies followed by `StreamEnd`, or by `StreamError`
/// after which the connection is closed.
pub struct StreamServer {
    config: ServerConfig,
    service: Arc<dyn UpdateStream>,
    listener: Option<TcpListener>,
    shutdown: broadcast::Sender<()>,
}

/// Stops a running [`StreamServer`]
#[derive(Clone)]
pub struct ShutdownHandle(broadcast::Sender<()>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.0.send(());
    }
}

impl StreamServer {
    /// Bind the listener; the server starts accepting on [`StreamServer::run`].
    pub async fn bind(config: ServerConfig, service: Arc<dyn UpdateStream>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.bind_address).await?;
        let (shutdown, _) = broadcast::channel(1);
        Ok(Self {
            config,
            service,
            listener: Some(listener),
            shutdown,
        })
    }

    /// Address the server is bound to (useful with port 0)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener
            .as_ref()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotConnected, "Server not bound")
            })
            .and_then(|l| l.local_addr())
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Accept connections until shut down
    pub async fn run(mut self) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("Server already started"))?;
        let mut shutdown_rx = self.shutdown.subscribe();
        info!("Update stream server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("New connection from {}", addr);
                        let service = self.service.clone();
                        let config = self.config.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, service, config).await {
                                warn!("Error handling connection from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Error accepting connection: {}", e),
                },
                _ = shutdown_rx.recv() => {
                    info!("Update stream server shutting down");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    service: Arc<dyn UpdateStream>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    loop {
        let (request, correlation_id) =
            match framing::read_request(&mut stream, config.max_message_size).await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("Client disconnected");
                    return Ok(());
                }
                Err(e) => {
                    // framing is lost after a bad frame
                    let reply = Response::Error(RpcError::new(ErrorCode::BadInput, e.to_string()));
                    let _ = framing::write_response(&mut stream, &reply, 0).await;
                    return Err(e.into());
                }
            };

        if !request.is_stream() {
            let reply = Response::Error(RpcError::new(
                ErrorCode::BadInput,
                "update stream server only serves stream requests",
            ));
            framing::write_response(&mut stream, &reply, correlation_id).await?;
            continue;
        }

        if !serve_stream(&mut stream, &service, request, correlation_id, &config).await? {
            return Ok(());
        }
    }
}

/// Serve one stream request. Returns whether the connection is still usable.
async fn serve_stream(
    stream: &mut TcpStream,
    service: &Arc<dyn UpdateStream>,
    request: Request,
    correlation_id: u32,
    config: &ServerConfig,
) -> anyhow::Result<bool> {
    let kind = stream_kind(&request);
    metrics::counter!("shardcast_streams_started_total", "stream" => kind).increment(1);

    let (tx, mut rx) = mpsc::channel(config.reply_buffer());
    let service = service.clone();
    let handler = tokio::task::spawn_blocking(move || {
        catch_fault(|| dispatch(service.as_ref(), request, &tx))
    });

    while let Some(reply) = rx.recv().await {
        // on failure rx drops, and the handler's next send fails
        framing::write_response(stream, &reply, correlation_id).await?;
    }

    let result = match handler.await {
        Ok(result) => result,
        Err(e) => Err(CoreError::Vt(VtError::new(
            ErrorCode::InternalError,
            format!("stream handler aborted: {}", e),
        ))),
    };

    match result {
        Ok(()) => {
            framing::write_response(stream, &Response::StreamEnd, correlation_id).await?;
            Ok(true)
        }
        Err(e) => {
            warn!("{} stream failed: {}", kind, e);
            metrics::counter!("shardcast_streams_failed_total", "stream" => kind).increment(1);
            let reply = Response::StreamError(RpcError::new(e.code(), e.to_string()));
            framing::write_response(stream, &reply, correlation_id).await?;
            Ok(false)
        }
    }
}

fn stream_kind(request: &Request) -> &'static str {
    match request {
        Request::StreamUpdate { .. } => "update",
        Request::StreamKeyRange { .. } => "key_range",
        Request::StreamTables { .. } => "tables",
        _ => "other",
    }
}

fn dispatch(
    service: &dyn UpdateStream,
    request: Request,
    tx: &mpsc::Sender<Response>,
) -> shardcast_core::Result<()> {
    let reply = |response: Response| {
        tx.blocking_send(response)
            .map_err(|_| CoreError::StreamClosed)
    };
    match request {
        Request::StreamUpdate { position } => service
            .serve_update_stream(&position, &mut |event| reply(Response::StreamEvent(event))),
        Request::StreamKeyRange {
            position,
            keyspace_id_type,
            key_range,
            charset,
        } => service.stream_key_range(
            &position,
            keyspace_id_type,
            &key_range,
            charset,
            &mut |transaction| reply(Response::BinlogTransaction(transaction)),
        ),
        Request::StreamTables {
            position,
            tables,
            charset,
        } => service.stream_tables(&position, &tables, charset, &mut |transaction| {
            reply(Response::BinlogTransaction(transaction))
        }),
        other => Err(CoreError::Vt(VtError::new(
            ErrorCode::BadInput,
            format!("not a stream request: {:?}", other),
        ))),
    }
}
