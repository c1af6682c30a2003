//! Beacon relay server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default port
//! beacon-relay
//!
//! # Custom bind address and verbose logging
//! beacon-relay --bind 0.0.0.0:9000 --log-level debug
//! ```

use beacon_relay::{RelayConfig, Server, ServerRuntimeConfig};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Beacon relay server
#[derive(Parser, Debug)]
#[command(name = "beacon-relay")]
#[command(about = "WebSocket relay for Beacon rooms and messaging")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8090")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Per-connection outbound queue capacity, in frames
    #[arg(long, default_value = "64")]
    outbound_queue: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Beacon relay starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        outbound_queue: args.outbound_queue,
        relay: RelayConfig { max_connections: args.max_connections },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
