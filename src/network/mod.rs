//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication.
//! All game rules live in `game/`; this layer owns connections, locking and fan-out.

pub mod connection;
pub mod coordinator;
pub mod protocol;
pub mod server;

pub use connection::{Connection, ConnectionId, ConnectionTable, JoinError};
pub use coordinator::{CommandError, Coordinator};
pub use protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
pub use server::{GameServer, GameServerError, ServerConfig};
