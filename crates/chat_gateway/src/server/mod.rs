//! Server core and per-connection bridges.

pub mod bridge;
pub mod core;

pub use bridge::{BridgeState, CloseReason};
pub use self::core::GatewayServer;
