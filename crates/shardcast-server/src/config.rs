use serde::{Deserialize, Serialize};

/// Update-stream server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `host:port`
    pub bind_address: String,

    /// Largest request frame accepted from a client
    pub max_message_size: usize,

    /// Replies buffered between a stream handler and the connection writer
    pub reply_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:15991".to_string(),
            max_message_size: 1024 * 1024,
            reply_buffer_size: shardcast_client::STREAM_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        anyhow::ensure!(
            config.reply_buffer_size > 0,
            "reply_buffer_size must be at least 1"
        );
        Ok(config)
    }

    /// Reply channel capacity, never zero
    pub fn reply_buffer(&self) -> usize {
        self.reply_buffer_size.max(1)
    }

    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_reply_buffer_size(mut self, size: usize) -> Self {
        self.reply_buffer_size = size.max(1);
        self
    }
}
