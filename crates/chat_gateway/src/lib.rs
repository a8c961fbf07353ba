//! # Chat Gateway
//!
//! A relay between WebSocket chat clients and a line-oriented TCP chat
//! backend. Every client connection is bridged to its own backend
//! connection; the gateway watches the traffic in between.
//!
//! ## What the gateway does itself
//!
//! * **Accounts** - `SIGNUP`, `LOGIN` and `FIND_USER` are answered from a
//!   JSON account table; the backend never sees them. A successful login is
//!   announced to the backend as `HELLO|<user>`.
//! * **File sharing** - `FILE|dm|...` and `FILE|room|...` are delivered
//!   directly between client connections.
//! * **Snooping** - `HELLO`, `JOIN` and `LEAVE` update the presence and room
//!   registries, then continue to the backend unchanged.
//!
//! Everything else passes through untouched, and every backend line is
//! relayed to the client as one WebSocket text frame.
//!
//! ## Message Flow
//!
//! 1. A client frame arrives on its bridge
//! 2. The [`messaging::CommandRouter`] classifies it and applies local effects
//! 3. Forwarded lines are written to the bridge's backend link
//! 4. Backend bytes are framed into lines by [`framing::LineBuffer`]
//! 5. Lines, replies and deliveries from other bridges go out to the client
//!
//! ## Thread Safety
//!
//! * Presence and room registries sit behind `tokio::sync::RwLock`
//! * The account table sits behind one `tokio::sync::Mutex`, which also
//!   serializes file writes
//! * Outbound queues are bounded `mpsc` channels kept in a `DashMap`

pub use config::GatewayConfig;
pub use error::{AccountError, AuthError, GatewayError};
pub use server::GatewayServer;

pub mod accounts;
pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
pub mod framing;
pub mod messaging;
pub mod presence;
pub mod rooms;
pub mod server;
