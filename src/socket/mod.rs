//! Websocket subsystem.
//!
//! # Data Flow
//! ```text
//! boot: SocketServer::mount(http) + per-connection loader (socket/ modules)
//! listen: start() → upgrades accepted
//!     → connection.rs handle per client → handlers see text frames
//! stop: close() → close frame to every client, upgrades refused
//! ```

pub mod connection;
pub mod server;

pub use connection::{MessageHandler, SocketConnection};
pub use server::{ConnectionLoader, SocketServer};
