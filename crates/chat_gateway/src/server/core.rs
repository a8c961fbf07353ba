//! Core gateway server implementation.
//!
//! `GatewayServer` owns the shared registries, binds the client listener and
//! runs the accept loop, spawning one bridge task per accepted connection.

use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::accounts::AccountStore;
use crate::config::GatewayConfig;
use crate::connection::ConnectionManager;
use crate::error::GatewayError;
use crate::messaging::CommandRouter;
use crate::presence::PresenceRegistry;
use crate::rooms::RoomRegistry;
use crate::server::bridge::{handle_connection, BridgeContext};

/// The gateway server.
///
/// # Architecture
///
/// * **Account Store**: durable credentials and public IDs
/// * **Presence / Room Registries**: shared bookkeeping snooped from traffic
/// * **Connection Manager**: outbound queues of every live client
/// * **Bridges**: one task per client, each with its own backend link
pub struct GatewayServer {
    config: GatewayConfig,
    accounts: Arc<AccountStore>,
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomRegistry>,
    connections: Arc<ConnectionManager>,
    active_bridges: Arc<AtomicUsize>,
    shutdown_sender: broadcast::Sender<()>,
}

/// Decrements the live bridge count when a bridge task ends, however it ends.
struct BridgeSlot(Arc<AtomicUsize>);

impl Drop for BridgeSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GatewayServer {
    /// Creates a gateway, loading the account table named in `config`.
    pub async fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let accounts = Arc::new(AccountStore::load(&config.accounts_path).await?);
        let (shutdown_sender, _) = broadcast::channel(1);

        Ok(Self {
            config,
            accounts,
            presence: Arc::new(PresenceRegistry::new()),
            rooms: Arc::new(RoomRegistry::new()),
            connections: Arc::new(ConnectionManager::new()),
            active_bridges: Arc::new(AtomicUsize::new(0)),
            shutdown_sender,
        })
    }

    /// Binds the client listener on the configured address.
    pub async fn bind(&self) -> Result<TcpListener, GatewayError> {
        let addr = self.config.bind_address;
        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| GatewayError::Network(format!("Socket creation failed: {e}")))?;
        socket.set_reuse_address(true).ok();
        socket
            .bind(&addr.into())
            .map_err(|e| GatewayError::Network(format!("Bind failed: {e}")))?;
        socket
            .listen(1024)
            .map_err(|e| GatewayError::Network(format!("Listen failed: {e}")))?;

        let std_listener: StdTcpListener = socket.into();
        std_listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| GatewayError::Network(format!("Tokio listener creation failed: {e}")))?;

        info!("✅ Listening for clients on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Accepts connections on `listener` until shutdown is requested or the
    /// listener fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        let ctx = Arc::new(BridgeContext {
            router: CommandRouter::new(
                self.accounts.clone(),
                self.presence.clone(),
                self.rooms.clone(),
                self.connections.clone(),
            ),
            presence: self.presence.clone(),
            rooms: self.rooms.clone(),
            connections: self.connections.clone(),
            backend_address: self.config.backend_address,
            outbound_queue_capacity: self.config.outbound_queue_capacity,
            max_line_len: self.config.max_line_len,
        });

        info!("🔀 Forwarding client traffic to backend {}", self.config.backend_address);
        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            return Err(GatewayError::Network(format!("Accept failed: {e}")));
                        }
                    };

                    let active = self.active_bridges.fetch_add(1, Ordering::SeqCst);
                    let slot = BridgeSlot(self.active_bridges.clone());
                    if active >= self.config.max_connections {
                        warn!(
                            "Rejecting connection from {}: {} connection limit reached",
                            addr, self.config.max_connections
                        );
                        drop(slot);
                        continue;
                    }

                    stream.set_nodelay(true).ok();
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        let _slot = slot;
                        if let Err(e) = handle_connection(stream, addr, ctx).await {
                            debug!("Connection from {} failed before bridging: {}", addr, e);
                        }
                    });
                }
                _ = shutdown_receiver.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!("Gateway stopped");
        Ok(())
    }

    /// Binds and serves until shutdown.
    pub async fn start(&self) -> Result<(), GatewayError> {
        info!("🚀 Starting gateway on {}", self.config.bind_address);
        info!(
            "👤 {} account(s) loaded from {}",
            self.accounts.len().await,
            self.accounts.path().display()
        );
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Stops the accept loop. Bridges already running finish on their own
    /// when either side closes.
    pub fn shutdown(&self) {
        info!("🛑 Shutting down gateway...");
        let _ = self.shutdown_sender.send(());
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn accounts(&self) -> Arc<AccountStore> {
        self.accounts.clone()
    }

    pub fn presence(&self) -> Arc<PresenceRegistry> {
        self.presence.clone()
    }

    pub fn rooms(&self) -> Arc<RoomRegistry> {
        self.rooms.clone()
    }

    /// Number of clients currently registered with a bridge.
    pub fn connection_count(&self) -> usize {
        self.connections.connection_count()
    }
}
