use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use sqlproxy::codec::DEFAULT_MAX_FRAME_SIZE;
use sqlproxy::config::{self, Config, DEFAULT_HOST};
use sqlproxy::store::DEFAULT_DATABASE;
use sqlproxy::{server, Error};

#[derive(Parser, Debug)]
struct Args {
    /// The port to listen on, falls back to 7778 when missing or invalid
    #[arg(allow_hyphen_values = true)]
    port: Option<String>,

    /// Anything after the port is ignored
    #[arg(hide = true)]
    _extra: Vec<String>,

    /// The address to bind to
    #[arg(long, env = "SQLPROXY_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Path of the SQLite store file
    #[arg(long, env = "SQLPROXY_DATABASE", default_value = DEFAULT_DATABASE)]
    database: PathBuf,

    /// How long a command waits for a locked store before failing
    #[arg(long, env = "SQLPROXY_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    busy_timeout_ms: u64,

    /// Largest frame accepted from a client, in bytes
    #[arg(long, env = "SQLPROXY_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    server::init_tracing();

    let port = config::parse_port(args.port.as_deref());
    if let Some(raw) = args.port.as_deref().filter(|raw| raw.trim().parse::<u16>().is_err()) {
        warn!("Invalid port {:?}, using {}", raw, port);
    }

    let config = Config {
        host: args.host,
        port,
        database: args.database,
        busy_timeout: Duration::from_millis(args.busy_timeout_ms),
        max_frame_size: args.max_frame_size,
    };

    server::run(config).await
}
