//! shardcast CLI - tail update streams from a tablet
//!
//! Usage:
//!   shardcast --server 127.0.0.1:15991 update-stream <position>
//!   shardcast stream-tables <position> orders users
//!   shardcast stream-key-range <position> --start 70 --end 90 --keyspace-id-type uint64
//!   shardcast mysql-type 3 --unsigned
//!
//! Every received event is printed as one JSON line on stdout.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use shardcast_client::{BinlogPlayerClient, ClientConfig, ErrFunc, EventStream};
use shardcast_protocol::sqltypes;
use shardcast_protocol::{Charset, KeyRange, KeyspaceIdType};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shardcast")]
#[command(about = "shardcast - tail table-filtered binlog streams")]
#[command(version)]
struct Cli {
    /// Update stream server address
    #[arg(short, long, default_value = "127.0.0.1:15991", env = "SHARDCAST_SERVER")]
    server: String,

    /// Client protocol name
    #[arg(long, env = "SHARDCAST_PROTOCOL")]
    protocol: Option<String>,

    /// Connect timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Client configuration file (JSON)
    #[arg(short, long, env = "SHARDCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream raw update events
    UpdateStream {
        /// Replication position to start from
        position: String,
    },

    /// Stream transactions for a keyspace-id range
    StreamKeyRange {
        /// Replication position to start from
        position: String,

        /// Inclusive range start, hex encoded (empty = unbounded)
        #[arg(long, default_value = "")]
        start: String,

        /// Exclusive range end, hex encoded (empty = unbounded)
        #[arg(long, default_value = "")]
        end: String,

        #[arg(long, value_enum, default_value = "uint64")]
        keyspace_id_type: IdType,

        /// Charset as client,conn,server
        #[arg(long)]
        charset: Option<String>,
    },

    /// Stream transactions touching the given tables
    StreamTables {
        /// Replication position to start from
        position: String,

        /// Tables to stream
        #[arg(required = true)]
        tables: Vec<String>,

        /// Charset as client,conn,server
        #[arg(long)]
        charset: Option<String>,
    },

    /// Map a MySQL (type code, flags) pair to its column type
    MysqlType {
        code: i64,

        #[arg(long)]
        unsigned: bool,

        #[arg(long)]
        binary: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum IdType {
    Uint64,
    Bytes,
}

impl From<IdType> for KeyspaceIdType {
    fn from(t: IdType) -> Self {
        match t {
            IdType::Uint64 => KeyspaceIdType::Uint64,
            IdType::Bytes => KeyspaceIdType::Bytes,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Commands::MysqlType {
        code,
        unsigned,
        binary,
    } = cli.command
    {
        return print_mysql_type(code, unsigned, binary);
    }

    let config = load_config(&cli)?;
    let mut client: Box<dyn BinlogPlayerClient> =
        shardcast_client::new_client_from_config(&config)?;
    client
        .dial(&cli.server, config.connect_timeout())
        .await
        .with_context(|| format!("Failed to connect to {}", cli.server))?;
    info!("Connected to {}", cli.server);

    let result = match cli.command {
        Commands::UpdateStream { position } => {
            let (events, errs) = client.serve_update_stream(&position).await?;
            drain(events, errs).await
        }
        Commands::StreamKeyRange {
            position,
            start,
            end,
            keyspace_id_type,
            charset,
        } => {
            let key_range = KeyRange::new(decode_hex(&start)?, decode_hex(&end)?);
            let charset = charset.as_deref().map(parse_charset).transpose()?;
            let (events, errs) = client
                .stream_key_range(&position, keyspace_id_type.into(), &key_range, charset)
                .await?;
            drain(events, errs).await
        }
        Commands::StreamTables {
            position,
            tables,
            charset,
        } => {
            let charset = charset.as_deref().map(parse_charset).transpose()?;
            let (events, errs) = client.stream_tables(&position, &tables, charset).await?;
            drain(events, errs).await
        }
        Commands::MysqlType { .. } => Ok(0),
    };

    client.close().await;
    let count = result?;
    debug!("Stream ended after {} events", count);
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            ClientConfig::from_json(&json)?
        }
        None => ClientConfig::default(),
    };
    if let Some(protocol) = &cli.protocol {
        config = config.with_protocol(protocol.clone());
    }
    if let Some(secs) = cli.timeout {
        config = config.with_connect_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

/// Print every event as a JSON line, then report how the stream ended.
async fn drain<E: Serialize>(mut events: EventStream<E>, errs: ErrFunc) -> anyhow::Result<u64> {
    let mut count = 0;
    while let Some(event) = events.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        count += 1;
    }
    if let Some(err) = errs.err() {
        bail!("Stream failed after {} events: {}", count, err);
    }
    Ok(count)
}

#[derive(Serialize)]
struct MysqlTypeInfo {
    code: i64,
    flags: i64,
    r#type: i32,
    classification: sqltypes::Classification,
}

fn print_mysql_type(code: i64, unsigned: bool, binary: bool) -> anyhow::Result<()> {
    let mut flags = 0;
    if unsigned {
        flags |= sqltypes::mysql_flag::UNSIGNED;
    }
    if binary {
        flags |= sqltypes::mysql_flag::BINARY;
    }
    let typ = sqltypes::try_mysql_to_type(code, flags)?;
    let info = MysqlTypeInfo {
        code,
        flags,
        r#type: typ.raw(),
        classification: typ.classify(),
    };
    println!("{}", serde_json::to_string(&info)?);
    Ok(())
}

fn parse_charset(s: &str) -> anyhow::Result<Charset> {
    let parts: Vec<i32> = s
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("Invalid charset {:?}", s))?;
    match parts.as_slice() {
        [client, conn, server] => Ok(Charset::new(*client, *conn, *server)),
        _ => bail!("Charset must be client,conn,server, got {:?}", s),
    }
}

fn decode_hex(s: &str) -> anyhow::Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        bail!("Odd-length hex string {:?}", s);
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .and_then(|byte| u8::from_str_radix(byte, 16).ok())
                .with_context(|| format!("Invalid hex string {:?}", s))
        })
        .collect()
}
