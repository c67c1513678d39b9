//! Protocol-name registries
//!
//! Player clients and gateway dialers are looked up by protocol name, so
//! alternative transports can be plugged in without touching call sites.
//! The TCP implementations are registered as `"tcp"`. Registering a name
//! twice keeps the first registration.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::gateway::{GatewayConn, TcpGatewayConn};
use crate::player::{BinlogPlayerClient, TcpPlayerClient};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Protocol registered for the built-in TCP transport
pub const DEFAULT_PROTOCOL: &str = "tcp";

/// Creates an unconnected player client
pub type ClientFactory = Arc<dyn Fn() -> Box<dyn BinlogPlayerClient> + Send + Sync>;

pub type DialFuture = Pin<Box<dyn Future<Output = Result<Box<dyn GatewayConn>>> + Send>>;

/// Opens a gateway connection to `address` within `timeout`
pub type Dialer = Arc<dyn Fn(String, Duration) -> DialFuture + Send + Sync>;

static CLIENT_FACTORIES: Lazy<RwLock<HashMap<String, ClientFactory>>> = Lazy::new(|| {
    let mut factories: HashMap<String, ClientFactory> = HashMap::new();
    factories.insert(
        DEFAULT_PROTOCOL.to_string(),
        Arc::new(|| Box::new(TcpPlayerClient::default()) as Box<dyn BinlogPlayerClient>),
    );
    RwLock::new(factories)
});

static DIALERS: Lazy<RwLock<HashMap<String, Dialer>>> = Lazy::new(|| {
    let mut dialers: HashMap<String, Dialer> = HashMap::new();
    dialers.insert(
        DEFAULT_PROTOCOL.to_string(),
        Arc::new(|address: String, timeout: Duration| -> DialFuture {
            Box::pin(async move {
                let conn = TcpGatewayConn::dial(&address, timeout).await?;
                Ok(Box::new(conn) as Box<dyn GatewayConn>)
            })
        }),
    );
    RwLock::new(dialers)
});

/// Register a player client implementation. Returns `false` if `name` is taken.
pub fn register_client_factory(name: &str, factory: ClientFactory) -> bool {
    let mut factories = CLIENT_FACTORIES.write();
    if factories.contains_key(name) {
        error!("BinlogPlayerClientFactory {} already exists", name);
        return false;
    }
    factories.insert(name.to_string(), factory);
    true
}

/// Create an unconnected player client for `protocol`
pub fn new_client(protocol: &str) -> Result<Box<dyn BinlogPlayerClient>> {
    let factory = CLIENT_FACTORIES
        .read()
        .get(protocol)
        .cloned()
        .ok_or_else(|| Error::UnknownProtocol(protocol.to_string()))?;
    Ok(factory())
}

/// Create a player client for the protocol named in `config`
pub fn new_client_from_config(config: &ClientConfig) -> Result<Box<dyn BinlogPlayerClient>> {
    if config.protocol == DEFAULT_PROTOCOL {
        return Ok(Box::new(TcpPlayerClient::new(config.clone())));
    }
    new_client(&config.protocol)
}

/// Register a gateway dialer. Returns `false` if `name` is taken.
pub fn register_dialer(name: &str, dialer: Dialer) -> bool {
    let mut dialers = DIALERS.write();
    if dialers.contains_key(name) {
        error!("Dialer {} already exists", name);
        return false;
    }
    dialers.insert(name.to_string(), dialer);
    true
}

/// Connect to a gateway with the dialer registered under `protocol`
pub async fn dial(protocol: &str, address: &str, timeout: Duration) -> Result<Box<dyn GatewayConn>> {
    let dialer = DIALERS
        .read()
        .get(protocol)
        .cloned()
        .ok_or_else(|| Error::UnknownProtocol(protocol.to_string()))?;
    dialer(address.to_string(), timeout).await
}
