//! Command routing for inbound client lines.
//!
//! Every line is classified once and handled in a fixed order:
//!
//! 1. `SIGNUP`, `LOGIN`, `FIND_USER`, `FILE` are answered locally and the
//!    original line never reaches the backend (a successful `LOGIN` sends a
//!    synthesized `HELLO` instead).
//! 2. `HELLO`, `JOIN`, `LEAVE` update presence/room bookkeeping and are then
//!    forwarded unchanged.
//! 3. Anything else is forwarded unchanged.
//!
//! Replies go to the originating connection only. File deliveries go to the
//! recipients' queues without waiting, so a slow recipient never stalls the
//! sender.

use std::sync::Arc;

use tracing::{debug, info};

use crate::accounts::AccountStore;
use crate::connection::{ConnectionId, ConnectionManager};
use crate::error::GatewayError;
use crate::messaging::types::{hello_line, ClientCommand, FileTarget, GatewayReply};
use crate::presence::PresenceRegistry;
use crate::rooms::RoomRegistry;

/// What the bridge should do with a line after routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Send this line to the backend.
    Forward(String),
    /// Fully handled by the gateway.
    Handled,
}

/// Applies the gateway's local command handling.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    accounts: Arc<AccountStore>,
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomRegistry>,
    connections: Arc<ConnectionManager>,
}

impl CommandRouter {
    pub fn new(
        accounts: Arc<AccountStore>,
        presence: Arc<PresenceRegistry>,
        rooms: Arc<RoomRegistry>,
        connections: Arc<ConnectionManager>,
    ) -> Self {
        Self {
            accounts,
            presence,
            rooms,
            connections,
        }
    }

    /// Routes one inbound line from `connection`.
    ///
    /// # Errors
    ///
    /// Fails only when a reply cannot be queued for `connection` itself:
    /// the connection is gone or is not draining its queue.
    pub async fn route(
        &self,
        connection: ConnectionId,
        line: &str,
    ) -> Result<RouteOutcome, GatewayError> {
        match ClientCommand::parse(line) {
            ClientCommand::Signup { username, password } => {
                let reply = match self.accounts.create_account(username, password).await {
                    Ok(id) => GatewayReply::SignupSuccess {
                        username: username.to_owned(),
                        id,
                    },
                    Err(e) => GatewayReply::error(e.to_string()),
                };
                self.reply(connection, reply)?;
                Ok(RouteOutcome::Handled)
            }

            ClientCommand::Login { username, password } => {
                match self.accounts.verify(username, password).await {
                    Ok(id) => {
                        self.presence.bind(username, connection).await;
                        info!("{} logged in on connection {}", username, connection);
                        self.reply(
                            connection,
                            GatewayReply::LoginSuccess {
                                username: username.to_owned(),
                                id,
                            },
                        )?;
                        Ok(RouteOutcome::Forward(hello_line(username)))
                    }
                    Err(e) => {
                        debug!("Login refused for {:?} on {}: {:?}", username, connection, e);
                        self.reply(connection, GatewayReply::error(e.to_string()))?;
                        Ok(RouteOutcome::Handled)
                    }
                }
            }

            ClientCommand::FindUser { id } => {
                let reply = match self.accounts.find_by_numeric_id(id).await {
                    Some(username) => GatewayReply::UserFound {
                        id: id.to_owned(),
                        username,
                    },
                    None => GatewayReply::error(format!("User with ID {id} not found")),
                };
                self.reply(connection, reply)?;
                Ok(RouteOutcome::Handled)
            }

            ClientCommand::File {
                target,
                name,
                filename,
                data,
            } => {
                self.share_file(connection, target, name, filename, data)
                    .await?;
                Ok(RouteOutcome::Handled)
            }

            ClientCommand::MalformedFile => {
                self.reply(connection, GatewayReply::error("Malformed FILE command"))?;
                Ok(RouteOutcome::Handled)
            }

            ClientCommand::Hello { username } => {
                if !username.is_empty() {
                    self.presence.bind(username, connection).await;
                }
                Ok(RouteOutcome::Forward(line.to_owned()))
            }

            ClientCommand::Join { room } => {
                if !room.is_empty() {
                    if let Some(username) = self.presence.username_of(connection).await {
                        self.rooms.join(room, &username).await;
                    }
                }
                Ok(RouteOutcome::Forward(line.to_owned()))
            }

            ClientCommand::Leave { room } => {
                if !room.is_empty() {
                    if let Some(username) = self.presence.username_of(connection).await {
                        self.rooms.leave(room, &username).await;
                    }
                }
                Ok(RouteOutcome::Forward(line.to_owned()))
            }

            ClientCommand::Passthrough => Ok(RouteOutcome::Forward(line.to_owned())),
        }
    }

    async fn share_file(
        &self,
        connection: ConnectionId,
        target: FileTarget<'_>,
        name: &str,
        filename: &str,
        data: &str,
    ) -> Result<(), GatewayError> {
        let Some(sender) = self.presence.username_of(connection).await else {
            return self.reply(
                connection,
                GatewayReply::error("You must be logged in to share files"),
            );
        };

        match target {
            FileTarget::Dm => {
                let line = GatewayReply::FileFrom {
                    sender: sender.clone(),
                    filename: filename.to_owned(),
                    data: data.to_owned(),
                }
                .to_string();

                let delivered = match self.presence.resolve(name).await {
                    Some(recipient) => self.connections.try_deliver(recipient, line),
                    None => false,
                };
                if delivered {
                    debug!("{} sent {} to {}", sender, filename, name);
                    Ok(())
                } else {
                    self.reply(
                        connection,
                        GatewayReply::error(format!("User {name} not found or offline")),
                    )
                }
            }

            FileTarget::Room => {
                let Some(members) = self.rooms.snapshot(name).await else {
                    return self.reply(connection, GatewayReply::error(format!("Room {name} not found")));
                };

                let line = GatewayReply::RoomFileFrom {
                    room: name.to_owned(),
                    sender: sender.clone(),
                    filename: filename.to_owned(),
                    data: data.to_owned(),
                }
                .to_string();

                let mut delivered = 0usize;
                for member in members.iter().filter(|m| **m != sender) {
                    if let Some(recipient) = self.presence.resolve(member).await {
                        if self.connections.try_deliver(recipient, line.clone()) {
                            delivered += 1;
                        }
                    }
                }
                debug!(
                    "{} shared {} with {} member(s) of {}",
                    sender, filename, delivered, name
                );
                Ok(())
            }

            FileTarget::Unknown(kind) => {
                self.reply(
                    connection,
                    GatewayReply::error(format!("Unknown file target type {kind}")),
                )
            }
        }
    }

    fn reply(&self, connection: ConnectionId, reply: GatewayReply) -> Result<(), GatewayError> {
        self.connections.send_to_connection(connection, reply.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct Harness {
        router: CommandRouter,
        accounts: Arc<AccountStore>,
        presence: Arc<PresenceRegistry>,
        rooms: Arc<RoomRegistry>,
        connections: Arc<ConnectionManager>,
        _dir: TempDir,
    }

    impl Harness {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let accounts = Arc::new(AccountStore::load(dir.path().join("users.json")).await.unwrap());
            let presence = Arc::new(PresenceRegistry::new());
            let rooms = Arc::new(RoomRegistry::new());
            let connections = Arc::new(ConnectionManager::new());
            let router = CommandRouter::new(
                accounts.clone(),
                presence.clone(),
                rooms.clone(),
                connections.clone(),
            );
            Self {
                router,
                accounts,
                presence,
                rooms,
                connections,
                _dir: dir,
            }
        }

        fn connect(&self) -> (ConnectionId, mpsc::Receiver<String>) {
            let id = ConnectionId::new();
            let rx = self.connections.register(id, 16);
            (id, rx)
        }

        async fn route(&self, id: ConnectionId, line: &str) -> RouteOutcome {
            self.router.route(id, line).await.unwrap()
        }
    }

    #[tokio::test]
    async fn signup_replies_and_is_not_forwarded() {
        let h = Harness::new().await;
        let (conn, mut rx) = h.connect();

        assert_eq!(h.route(conn, "SIGNUP|alice|pw").await, RouteOutcome::Handled);
        let reply = rx.recv().await.unwrap();
        let id = h.accounts.verify("alice", "pw").await.unwrap();
        assert_eq!(reply, format!("SIGNUP_SUCCESS|alice|{id}"));

        assert_eq!(h.route(conn, "SIGNUP|alice|pw").await, RouteOutcome::Handled);
        assert_eq!(rx.recv().await.unwrap(), "ERROR||Username already taken");

        assert_eq!(h.route(conn, "SIGNUP|bob").await, RouteOutcome::Handled);
        assert_eq!(rx.recv().await.unwrap(), "ERROR||Username and password required");
    }

    #[tokio::test]
    async fn login_binds_and_forwards_hello() {
        let h = Harness::new().await;
        let id = h.accounts.create_account("alice", "pw").await.unwrap();
        let (conn, mut rx) = h.connect();

        assert_eq!(
            h.route(conn, "LOGIN|alice|pw").await,
            RouteOutcome::Forward("HELLO|alice".into())
        );
        assert_eq!(rx.recv().await.unwrap(), format!("LOGIN_SUCCESS|alice|{id}"));
        assert_eq!(h.presence.resolve("alice").await, Some(conn));
    }

    #[tokio::test]
    async fn login_failures_share_one_message() {
        let h = Harness::new().await;
        h.accounts.create_account("alice", "pw").await.unwrap();
        let (conn, mut rx) = h.connect();

        assert_eq!(h.route(conn, "LOGIN|alice|wrong").await, RouteOutcome::Handled);
        let wrong_password = rx.recv().await.unwrap();
        assert_eq!(h.route(conn, "LOGIN|nobody|pw").await, RouteOutcome::Handled);
        let unknown_user = rx.recv().await.unwrap();

        assert_eq!(wrong_password, "ERROR||Invalid username or password");
        assert_eq!(wrong_password, unknown_user);
        assert_eq!(h.presence.username_of(conn).await, None);
    }

    #[tokio::test]
    async fn find_user_hits_and_misses() {
        let h = Harness::new().await;
        let id = h.accounts.create_account("alice", "pw").await.unwrap();
        let (conn, mut rx) = h.connect();

        h.route(conn, &format!("FIND_USER|{id}")).await;
        assert_eq!(rx.recv().await.unwrap(), format!("USER_FOUND|{id}|alice"));

        // Six digits but below the generated range, so it can never exist.
        assert_eq!(h.route(conn, "FIND_USER|000001").await, RouteOutcome::Handled);
        assert_eq!(rx.recv().await.unwrap(), "ERROR||User with ID 000001 not found");
        assert_eq!(h.presence.online_count().await, 0);
        assert_eq!(h.rooms.room_count().await, 0);
    }

    #[tokio::test]
    async fn snoops_are_forwarded_verbatim() {
        let h = Harness::new().await;
        let (conn, _rx) = h.connect();

        assert_eq!(
            h.route(conn, "JOIN|lobby|").await,
            RouteOutcome::Forward("JOIN|lobby|".into())
        );
        // Not bound yet, so the join is not recorded.
        assert_eq!(h.rooms.snapshot("lobby").await, None);

        assert_eq!(
            h.route(conn, "HELLO|alice").await,
            RouteOutcome::Forward("HELLO|alice".into())
        );
        h.route(conn, "JOIN|lobby|").await;
        assert!(h.rooms.members("lobby").await.contains("alice"));

        assert_eq!(
            h.route(conn, "LEAVE|lobby|").await,
            RouteOutcome::Forward("LEAVE|lobby|".into())
        );
        assert!(h.rooms.members("lobby").await.is_empty());

        assert_eq!(
            h.route(conn, "ROOMMSG|lobby|hi|there").await,
            RouteOutcome::Forward("ROOMMSG|lobby|hi|there".into())
        );
    }

    #[tokio::test]
    async fn hello_from_second_connection_wins() {
        let h = Harness::new().await;
        let (first, _rx1) = h.connect();
        let (second, _rx2) = h.connect();

        h.route(first, "HELLO|alice").await;
        h.route(second, "HELLO|alice").await;
        assert_eq!(h.presence.resolve("alice").await, Some(second));
    }

    #[tokio::test]
    async fn file_requires_login() {
        let h = Harness::new().await;
        let (conn, mut rx) = h.connect();

        assert_eq!(
            h.route(conn, "FILE|dm|bob|f.txt|AAAA").await,
            RouteOutcome::Handled
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            "ERROR||You must be logged in to share files"
        );
    }

    #[tokio::test]
    async fn file_dm_delivers_or_reports_offline() {
        let h = Harness::new().await;
        let (alice, mut alice_rx) = h.connect();
        let (bob, mut bob_rx) = h.connect();
        h.route(alice, "HELLO|alice").await;
        h.route(bob, "HELLO|bob").await;

        assert_eq!(
            h.route(alice, "FILE|dm|bob|f.txt|data:a|b").await,
            RouteOutcome::Handled
        );
        assert_eq!(bob_rx.recv().await.unwrap(), "FILE_FROM|alice|f.txt|data:a|b");

        h.route(alice, "FILE|dm|carol|f.txt|AAAA").await;
        assert_eq!(
            alice_rx.recv().await.unwrap(),
            "ERROR||User carol not found or offline"
        );
    }

    #[tokio::test]
    async fn room_file_fans_out_to_everyone_but_sender() {
        let h = Harness::new().await;
        let (a, mut a_rx) = h.connect();
        let (b, mut b_rx) = h.connect();
        let (c, mut c_rx) = h.connect();
        for (conn, name) in [(a, "A"), (b, "B"), (c, "C")] {
            h.route(conn, &format!("HELLO|{name}")).await;
            h.route(conn, "JOIN|r|").await;
        }

        assert_eq!(
            h.route(b, "FILE|room|r|f.txt|AAAA").await,
            RouteOutcome::Handled
        );
        assert_eq!(a_rx.recv().await.unwrap(), "ROOM_FILE_FROM|r|B|f.txt|AAAA");
        assert_eq!(c_rx.recv().await.unwrap(), "ROOM_FILE_FROM|r|B|f.txt|AAAA");
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn room_file_errors() {
        let h = Harness::new().await;
        let (a, mut a_rx) = h.connect();
        h.route(a, "HELLO|A").await;

        h.route(a, "FILE|room|nowhere|f.txt|AAAA").await;
        assert_eq!(a_rx.recv().await.unwrap(), "ERROR||Room nowhere not found");

        h.route(a, "FILE|fax|B|f.txt|AAAA").await;
        assert_eq!(a_rx.recv().await.unwrap(), "ERROR||Unknown file target type fax");

        h.route(a, "FILE|room|r").await;
        assert_eq!(a_rx.recv().await.unwrap(), "ERROR||Malformed FILE command");
    }

    #[tokio::test]
    async fn file_commands_never_forward() {
        let h = Harness::new().await;
        let (a, _a_rx) = h.connect();
        h.route(a, "HELLO|A").await;
        h.route(a, "JOIN|r|").await;

        assert_eq!(h.route(a, "FILE|room|r|f|x").await, RouteOutcome::Handled);
        assert_eq!(h.route(a, "FILE|dm|A|f|x").await, RouteOutcome::Handled);
    }

    #[tokio::test]
    async fn reply_to_vanished_connection_is_an_error() {
        let h = Harness::new().await;
        let err = h
            .router
            .route(ConnectionId::new(), "FIND_USER|1")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Network(_)));
    }
}
