//! Tessera Host - serves the Tessera RPC channel over TCP.
//!
//! Each accepted connection gets its own endpoint speaking length-prefixed
//! JSON frames. Lets tooling and tests outside a WebView talk to the same
//! protocol the editor and the game view use.

mod handler;
mod server;

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "tessera-host")]
#[command(about = "Socket bridge for the Tessera RPC channel")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Channel name clients must use
    #[arg(short, long, default_value = tessera_engine::DEFAULT_ENGINE_CHANNEL)]
    channel: String,

    /// Timeout for requests sent to clients, in milliseconds
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the port line.
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Tessera bridge host");

    let config = server::ServerConfig {
        host: args.host,
        port: args.port,
        channel: args.channel,
        request_timeout: Duration::from_millis(args.timeout_ms),
    };
    let (addr, _state) = server::start_server(config).await?;

    // Parent processes read this line to find the port.
    println!("BRIDGE_PORT={}", addr.port());

    info!("Bridge running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
