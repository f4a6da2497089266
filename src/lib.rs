//! # Tic-Tac-Toe Game Server
//!
//! Multiplayer session coordinator: players register, join over WebSocket,
//! challenge each other and exchange moves on a shared 3×3 board.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TIC-TAC-TOE SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/              - Game state (no I/O)                    │
//! │  ├── board.rs       - 3×3 grid and marks                     │
//! │  ├── player.rs      - Player identities and registry         │
//! │  ├── session.rs     - Game sessions and session store        │
//! │  └── events.rs      - Game commands and events               │
//! │                                                              │
//! │  network/           - Networking                             │
//! │  ├── server.rs      - WebSocket server                       │
//! │  ├── protocol.rs    - Message types                          │
//! │  ├── connection.rs  - Joined player connections              │
//! │  └── coordinator.rs - Command handling and event fan-out     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! The coordinator keeps players, connections and sessions behind a single
//! lock. Every command is validated, applied and fanned out while holding it,
//! so both participants of a game observe events in the same order.
//! Outbound queues are bounded and never block the coordinator.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::board::{Board, Mark, BOARD_SIZE};
pub use game::events::{GameCommand, GameEvent};
pub use game::player::{Player, PlayerId};
pub use game::session::{GameId, GameSession};
pub use network::coordinator::Coordinator;
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
