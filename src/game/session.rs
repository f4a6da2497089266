//! Game Sessions
//!
//! One in-progress game between two players, and the store that owns all
//! of them. The store keeps a participant index so a player's sessions
//! are found without scanning every game.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::game::board::{Board, BoardError, Mark};
use crate::game::player::{Player, PlayerId};

/// Unique game identifier, issued sequentially from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle.
///
/// Sessions only end when a participant disconnects; there is no
/// finished state because results are not detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Game in progress.
    Active,
    /// Removed from the store.
    Closed,
}

/// Move errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    /// Mover is not the player whose turn it is.
    #[error("player {player} moved out of turn in game {game}")]
    OutOfTurn {
        /// Game the move was sent to.
        game: GameId,
        /// Player who tried to move.
        player: PlayerId,
    },

    /// Target cell is off the board.
    #[error(transparent)]
    Board(#[from] BoardError),
}

// =============================================================================
// GAME SESSION
// =============================================================================

/// Full snapshot of a game. Events carry a copy of this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    /// Game identifier.
    pub id: GameId,
    /// Player who started the game, plays O.
    pub player_o: Player,
    /// Invited player, plays X.
    pub player_x: Player,
    /// Player allowed to submit the next move.
    pub next_player: Player,
    /// Current board.
    pub board: Board,
    /// Lifecycle state.
    pub status: SessionStatus,
}

impl GameSession {
    /// Start a game. The challenger gets O and moves first.
    pub fn new(id: GameId, from: Player, to: Player) -> Self {
        Self {
            id,
            next_player: from.clone(),
            player_o: from,
            player_x: to,
            board: Board::new(),
            status: SessionStatus::Active,
        }
    }

    /// Check if a player takes part in this game.
    pub fn has_participant(&self, player_id: PlayerId) -> bool {
        self.player_o.id == player_id || self.player_x.id == player_id
    }

    /// Mark a participant plays with.
    pub fn mark_of(&self, player_id: PlayerId) -> Option<Mark> {
        if self.player_o.id == player_id {
            Some(Mark::O)
        } else if self.player_x.id == player_id {
            Some(Mark::X)
        } else {
            None
        }
    }

    /// The other participant.
    pub fn opponent_of(&self, player_id: PlayerId) -> Option<&Player> {
        if self.player_o.id == player_id {
            Some(&self.player_x)
        } else if self.player_x.id == player_id {
            Some(&self.player_o)
        } else {
            None
        }
    }

    /// Apply a move for `mover` and hand the turn to the opponent.
    ///
    /// The target cell is written unconditionally, so an occupied cell
    /// is overwritten.
    pub fn apply_move(&mut self, mover: PlayerId, row: usize, col: usize) -> Result<(), MoveError> {
        if self.next_player.id != mover {
            return Err(MoveError::OutOfTurn { game: self.id, player: mover });
        }

        let (Some(mark), Some(opponent)) = (self.mark_of(mover), self.opponent_of(mover).cloned()) else {
            return Err(MoveError::OutOfTurn { game: self.id, player: mover });
        };
        self.board.place(row, col, mark)?;

        self.next_player = opponent;
        Ok(())
    }
}

// =============================================================================
// SESSION STORE
// =============================================================================

/// All active sessions, plus an index from player to their sessions.
#[derive(Debug)]
pub struct SessionStore {
    next_id: u64,
    sessions: BTreeMap<GameId, GameSession>,
    by_player: BTreeMap<PlayerId, BTreeSet<GameId>>,
}

impl SessionStore {
    /// Create an empty store. The first game gets id 1.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            sessions: BTreeMap::new(),
            by_player: BTreeMap::new(),
        }
    }

    /// Allocate an id and insert a new active session.
    pub fn create(&mut self, from: Player, to: Player) -> &GameSession {
        let id = GameId(self.next_id);
        self.next_id += 1;

        for player_id in [from.id, to.id] {
            self.by_player.entry(player_id).or_default().insert(id);
        }

        self.sessions
            .entry(id)
            .or_insert(GameSession::new(id, from, to))
    }

    /// Get a session.
    pub fn get(&self, id: GameId) -> Option<&GameSession> {
        self.sessions.get(&id)
    }

    /// Get a session mutably.
    pub fn get_mut(&mut self, id: GameId) -> Option<&mut GameSession> {
        self.sessions.get_mut(&id)
    }

    /// Remove a session. The returned snapshot is marked closed.
    pub fn remove(&mut self, id: GameId) -> Option<GameSession> {
        let mut session = self.sessions.remove(&id)?;

        for player_id in [session.player_o.id, session.player_x.id] {
            if let Some(games) = self.by_player.get_mut(&player_id) {
                games.remove(&id);
                if games.is_empty() {
                    self.by_player.remove(&player_id);
                }
            }
        }

        session.status = SessionStatus::Closed;
        Some(session)
    }

    /// Ids of all sessions a player takes part in.
    pub fn sessions_of(&self, player_id: PlayerId) -> Vec<GameId> {
        self.by_player
            .get(&player_id)
            .map(|games| games.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if there are no active sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
