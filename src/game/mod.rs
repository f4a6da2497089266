//! Game Logic Module
//!
//! Pure game state: no channels, no locks, no I/O.
//!
//! ## Module Structure
//!
//! - `board`: 3×3 grid and marks
//! - `player`: Player identities and registry
//! - `session`: Game sessions and the session store
//! - `events`: Inbound commands and outbound events

pub mod board;
pub mod events;
pub mod player;
pub mod session;

// Re-export key types
pub use board::{Board, BoardError, Mark, BOARD_SIZE};
pub use events::{GameCommand, GameEvent};
pub use player::{Player, PlayerId, PlayerRegistry};
pub use session::{GameId, GameSession, MoveError, SessionStatus, SessionStore};
