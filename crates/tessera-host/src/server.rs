//! TCP bridge: one RPC endpoint per accepted connection.

use crate::handler::register_builtin_handlers;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_engine::EngineHost;
use tessera_rpc::transport::stream;
use tessera_rpc::EndpointOptions;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Settings shared by every connection.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub channel: String,
    pub request_timeout: Duration,
}

impl ServerConfig {
    fn endpoint_options(&self) -> EndpointOptions {
        EndpointOptions::new(self.channel.clone()).with_request_timeout(self.request_timeout)
    }
}

/// Counters shared across connections.
#[derive(Debug, Default)]
pub struct ServerState {
    pub active_connections: AtomicUsize,
    pub engine_events: AtomicUsize,
}

/// Start the bridge server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(config: ServerConfig) -> anyhow::Result<(SocketAddr, Arc<ServerState>)> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Bridge listening on {} (channel '{}')", actual_addr, config.channel);

    let state = Arc::new(ServerState::default());
    tokio::spawn(accept_loop(listener, config, state.clone()));

    Ok((actual_addr, state))
}

async fn accept_loop(listener: TcpListener, config: ServerConfig, state: Arc<ServerState>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                tokio::spawn(serve_connection(socket, peer, config.clone(), state.clone()));
            }
            Err(e) => {
                warn!("Accept failed: {}", e);
            }
        }
    }
}

async fn serve_connection(
    socket: TcpStream,
    peer: SocketAddr,
    config: ServerConfig,
    state: Arc<ServerState>,
) {
    if let Err(e) = socket.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
    }

    let (endpoint, handle) = stream::connect_stream(socket, config.endpoint_options());
    register_builtin_handlers(&endpoint);

    let engine = EngineHost::new(endpoint.clone());
    let counters = state.clone();
    engine.on_engine_event(move |event| {
        counters.engine_events.fetch_add(1, Ordering::Relaxed);
        info!("Engine event from {}: {} {}", peer, event.name, event.data);
    });

    let active = state.active_connections.fetch_add(1, Ordering::SeqCst) + 1;
    info!("Client {} connected ({} active)", peer, active);

    handle.closed().await;
    endpoint.destroy();

    let active = state.active_connections.fetch_sub(1, Ordering::SeqCst) - 1;
    info!("Client {} disconnected ({} active)", peer, active);
}
