//! Chat server module.
//!
//! This module provides the TCP listener, the registry of live sessions,
//! broadcast fan-out, and the per-connection session handler.

mod broadcast;
mod handler;
mod listener;
mod registry;
mod session;
mod state;
pub mod transport;

pub use broadcast::Broadcaster;
pub use handler::handle_connection;
pub use listener::{ChatServer, ConnectionPermit};
pub use registry::ConnectionRegistry;
pub use session::{DeliveryError, SessionHandle, SessionId, SessionState};
pub use state::ChatState;
pub use transport::LineReader;
