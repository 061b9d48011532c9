//! Fenris server binary.
//!
//! # Usage
//!
//! ```bash
//! # Serve the current directory on the default port
//! fenris-server
//!
//! # Serve /srv/files on a custom address with verbose logging
//! fenris-server --bind 127.0.0.1:9000 --root /srv/files --log-level debug
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use fenris_core::ConnectionConfig;
use fenris_server::{
    DEFAULT_BIND_ADDRESS, DEFAULT_MAX_CONNECTIONS, FileService, Server, ServerConfig,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Fenris file-service server
#[derive(Parser, Debug)]
#[command(name = "fenris-server")]
#[command(about = "Encrypted remote file service")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = DEFAULT_BIND_ADDRESS)]
    bind: String,

    /// Directory to serve
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Maximum concurrent connections
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Seconds allowed for the key exchange
    #[arg(long, default_value_t = 30)]
    handshake_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Fenris server starting");

    if !args.root.is_dir() {
        return Err(format!("root {} is not a directory", args.root.display()).into());
    }
    tracing::info!("Serving files from {}", args.root.display());

    let config = ServerConfig {
        bind_address: args.bind,
        max_connections: args.max_connections,
        connection: ConnectionConfig {
            handshake_timeout: Duration::from_secs(args.handshake_timeout_secs),
            ..ConnectionConfig::default()
        },
    };

    let server = Server::bind(config, FileService::new(args.root))?;

    tracing::info!("Server listening on {}", server.local_addr());

    server.run()?;

    Ok(())
}
