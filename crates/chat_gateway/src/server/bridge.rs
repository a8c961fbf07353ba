//! Bridge supervision: one client connection paired with one backend link.
//!
//! A bridge performs the WebSocket handshake, registers the connection and
//! opens the backend link. It then runs two flows until either side goes
//! away:
//!
//! * inbound: client frames routed through the [`CommandRouter`] and
//!   written to the backend, in a task of its own;
//! * outbound: backend lines relayed to the client unchanged, interleaved
//!   with the connection's outbound queue (replies and deliveries from
//!   other bridges).
//!
//! Whatever ends the loop, [`BridgeSession::teardown`] closes both sides and
//! clears the connection's presence and room entries exactly once.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, Stream, StreamExt};
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::backend::{BackendLink, BackendWriter};
use crate::connection::{ClientConnection, ConnectionId, ConnectionManager};
use crate::error::GatewayError;
use crate::messaging::types::trim_line_ending;
use crate::messaging::{CommandRouter, RouteOutcome};
use crate::presence::PresenceRegistry;
use crate::rooms::RoomRegistry;

/// Lifecycle of a bridge. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Connecting,
    Active,
    Closed,
}

/// Why a bridge ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    ClientError(String),
    BackendUnavailable(String),
    BackendClosed,
    BackendError(String),
}

impl CloseReason {
    /// Whether one side went away on purpose rather than failing.
    pub fn is_clean(&self) -> bool {
        matches!(self, CloseReason::ClientClosed | CloseReason::BackendClosed)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ClientClosed => write!(f, "client closed"),
            CloseReason::ClientError(e) => write!(f, "client error: {e}"),
            CloseReason::BackendUnavailable(e) => write!(f, "backend unavailable: {e}"),
            CloseReason::BackendClosed => write!(f, "backend closed"),
            CloseReason::BackendError(e) => write!(f, "backend error: {e}"),
        }
    }
}

/// Shared state every bridge needs.
#[derive(Debug, Clone)]
pub struct BridgeContext {
    pub router: CommandRouter,
    pub presence: Arc<PresenceRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub connections: Arc<ConnectionManager>,
    pub backend_address: SocketAddr,
    pub outbound_queue_capacity: usize,
    pub max_line_len: usize,
}

/// Per-bridge bookkeeping: identity, state and idempotent teardown.
#[derive(Debug)]
pub struct BridgeSession {
    client: ClientConnection,
    state: BridgeState,
    ctx: Arc<BridgeContext>,
}

impl BridgeSession {
    pub fn new(client: ClientConnection, ctx: Arc<BridgeContext>) -> Self {
        Self {
            client,
            state: BridgeState::Connecting,
            ctx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.client.id
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    fn activate(&mut self) {
        if self.state == BridgeState::Connecting {
            self.state = BridgeState::Active;
        }
    }

    /// Releases everything the bridge holds in shared registries.
    ///
    /// Returns `false` if the bridge was already closed.
    pub async fn teardown(&mut self, reason: &CloseReason) -> bool {
        if self.state == BridgeState::Closed {
            return false;
        }
        self.state = BridgeState::Closed;

        let id = self.client.id;
        self.ctx.connections.remove(id);
        if let Some(username) = self.ctx.presence.unbind(id).await {
            self.ctx.rooms.remove_member_everywhere(&username).await;
            info!("{} went offline ({})", username, reason);
        }

        if reason.is_clean() {
            debug!(
                "Connection {} from {} closed after {:?}: {}",
                id,
                self.client.remote_addr,
                self.client.uptime(),
                reason
            );
        } else {
            warn!(
                "Connection {} from {} closed after {:?}: {}",
                id,
                self.client.remote_addr,
                self.client.uptime(),
                reason
            );
        }
        true
    }
}

/// Runs one bridge to completion.
///
/// The bridge is two flows. The inbound flow runs as its own task: it reads
/// client frames, routes them and writes forwarded lines to the backend, so
/// a backend that is slow to read only holds up that client's own input.
/// The outbound flow stays in this task and relays backend lines and queued
/// deliveries to the client. Neither flow ever waits on the other's socket.
///
/// # Errors
///
/// Only a failed WebSocket handshake is returned as an error; once the
/// bridge is up, every failure is a close reason handled by teardown.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<BridgeContext>,
) -> Result<(), GatewayError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_tx, ws_rx) = ws_stream.split();

    let mut session = BridgeSession::new(ClientConnection::new(addr), ctx.clone());
    let id = session.id();
    let mut outbound = ctx.connections.register(id, ctx.outbound_queue_capacity);
    info!("Connection {} established from {}", id, addr);

    let (mut backend_rx, backend_tx) =
        match BackendLink::connect(ctx.backend_address, ctx.max_line_len).await {
            Ok(link) => link,
            Err(e) => {
                session
                    .teardown(&CloseReason::BackendUnavailable(e.to_string()))
                    .await;
                let _ = ws_tx.send(Message::Close(None)).await;
                return Ok(());
            }
        };
    session.activate();
    debug!("Connection {} bridged to backend {}", id, ctx.backend_address);

    let mut inbound = tokio::spawn(client_to_backend(
        id,
        ws_rx,
        backend_tx,
        ctx.router.clone(),
    ));

    let reason = loop {
        tokio::select! {
            finished = &mut inbound => {
                break finished.unwrap_or_else(|e| {
                    CloseReason::ClientError(format!("inbound task failed: {e}"))
                });
            }

            line = backend_rx.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        debug!("-> {} {}", id, line);
                        if let Err(e) = ws_tx.send(Message::text(line)).await {
                            break CloseReason::ClientError(e.to_string());
                        }
                    }
                    Ok(None) => break CloseReason::BackendClosed,
                    Err(e) => break CloseReason::BackendError(e.to_string()),
                }
            }

            queued = outbound.recv() => {
                let Some(line) = queued else {
                    break CloseReason::ClientClosed;
                };
                if let Err(e) = ws_tx.send(Message::text(line)).await {
                    break CloseReason::ClientError(e.to_string());
                }
            }
        }
    };

    // Dropping the inbound task drops the backend write half, which closes it.
    inbound.abort();
    session.teardown(&reason).await;
    let _ = ws_tx.send(Message::Close(None)).await;
    Ok(())
}

/// The inbound flow: client frames in, forwarded lines out to the backend.
///
/// Returns why the flow stopped. The backend write half is shut down on the
/// way out.
async fn client_to_backend<S, W>(
    id: ConnectionId,
    mut ws_rx: S,
    mut backend_tx: BackendWriter<W>,
    router: CommandRouter,
) -> CloseReason
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
    W: AsyncWrite + Unpin,
{
    let reason = loop {
        let text = match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
            Some(Ok(_)) => continue,
            Some(Err(e)) => break CloseReason::ClientError(e.to_string()),
        };

        let line = trim_line_ending(&text);
        debug!("<- {} {}", id, line);
        match router.route(id, line).await {
            Ok(RouteOutcome::Forward(out)) => {
                if let Err(e) = backend_tx.send_line(&out).await {
                    break CloseReason::BackendError(e.to_string());
                }
            }
            Ok(RouteOutcome::Handled) => {}
            Err(e) => break CloseReason::ClientError(e.to_string()),
        }
    };

    let _ = backend_tx.shutdown().await;
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountStore;
    use tempfile::TempDir;

    async fn context(dir: &TempDir) -> Arc<BridgeContext> {
        let accounts = Arc::new(AccountStore::load(dir.path().join("users.json")).await.unwrap());
        let presence = Arc::new(PresenceRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let connections = Arc::new(ConnectionManager::new());
        Arc::new(BridgeContext {
            router: CommandRouter::new(accounts, presence.clone(), rooms.clone(), connections.clone()),
            presence,
            rooms,
            connections,
            backend_address: "127.0.0.1:9".parse().unwrap(),
            outbound_queue_capacity: 8,
            max_line_len: 1024,
        })
    }

    fn session(ctx: &Arc<BridgeContext>) -> BridgeSession {
        BridgeSession::new(
            ClientConnection::new("127.0.0.1:5555".parse().unwrap()),
            ctx.clone(),
        )
    }

    #[tokio::test]
    async fn teardown_clears_registries_once() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        let mut session = session(&ctx);
        let id = session.id();
        let _rx = ctx.connections.register(id, 8);

        session.activate();
        assert_eq!(session.state(), BridgeState::Active);
        ctx.presence.bind("alice", id).await;
        ctx.rooms.join("a", "alice").await;
        ctx.rooms.join("b", "alice").await;

        assert!(session.teardown(&CloseReason::ClientClosed).await);
        assert_eq!(session.state(), BridgeState::Closed);
        assert!(!ctx.connections.contains(id));
        assert_eq!(ctx.presence.resolve("alice").await, None);
        assert!(ctx.rooms.members("a").await.is_empty());
        assert!(ctx.rooms.members("b").await.is_empty());

        assert!(!session.teardown(&CloseReason::BackendClosed).await);
    }

    #[tokio::test]
    async fn displaced_session_leaves_new_holder_alone() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        let mut old = session(&ctx);
        let new = session(&ctx);

        ctx.presence.bind("alice", old.id()).await;
        ctx.presence.bind("alice", new.id()).await;
        ctx.rooms.join("a", "alice").await;

        old.teardown(&CloseReason::ClientClosed).await;
        assert_eq!(ctx.presence.resolve("alice").await, Some(new.id()));
        assert!(ctx.rooms.members("a").await.contains("alice"));
    }

    #[test]
    fn only_orderly_closes_are_clean() {
        assert!(CloseReason::ClientClosed.is_clean());
        assert!(CloseReason::BackendClosed.is_clean());
        assert!(!CloseReason::ClientError("reset".into()).is_clean());
        assert!(!CloseReason::BackendError("line too long".into()).is_clean());
        assert!(!CloseReason::BackendUnavailable("refused".into()).is_clean());
    }

    #[tokio::test]
    async fn closed_session_cannot_reactivate() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        let mut session = session(&ctx);

        session
            .teardown(&CloseReason::BackendUnavailable("refused".into()))
            .await;
        session.activate();
        assert_eq!(session.state(), BridgeState::Closed);
    }
}
