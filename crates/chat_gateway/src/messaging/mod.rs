//! Client protocol types and command routing.
//!
//! [`types`] defines the line grammar understood by the gateway and the
//! replies it originates; [`router`] applies each command's local effects and
//! decides what reaches the backend.

pub mod router;
pub mod types;

pub use router::{CommandRouter, RouteOutcome};
pub use types::{ClientCommand, FileTarget, GatewayReply};
