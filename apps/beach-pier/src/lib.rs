//! Rendezvous and relay engine for peer call signaling.
//!
//! Clients connect over WebSocket, register under an identifier of their
//! choosing, and exchange offers, answers, ICE candidates, and hang-ups with
//! other registered clients. Payloads pass through untouched.

pub mod config;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod websocket;

pub use config::{Cli, ServerConfig};
pub use protocol::{ClientMessage, Payload, ServerMessage};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, EndpointId};
pub use router::{DropReason, RelayOutcome, RelayRouter};
pub use server::PierServer;
pub use state::PierState;
