//! Commands and Events
//!
//! Inbound commands a joined player can issue, and the events the
//! coordinator pushes back after each state change.

use serde::{Deserialize, Serialize};

use crate::game::player::PlayerId;
use crate::game::session::{GameId, GameSession};

/// Commands sent by a joined player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum GameCommand {
    /// Open a game between two joined players.
    StartGame {
        /// Challenger, plays O and moves first.
        from_player: PlayerId,
        /// Invited player, plays X.
        to_player: PlayerId,
    },

    /// Place the sender's mark on a board.
    BoardMove {
        /// Target game.
        game_id: GameId,
        /// Row, 0..3.
        row: usize,
        /// Column, 0..3.
        col: usize,
    },
}

/// Events pushed to participants. Each carries the full session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    /// A new game was created.
    GameStarted {
        /// Initial state.
        session: GameSession,
    },

    /// A move was accepted.
    MoveApplied {
        /// State after the move.
        session: GameSession,
    },

    /// The other participant disconnected; the game is closed.
    OpponentLeft {
        /// Last state of the game.
        session: GameSession,
    },
}

impl GameEvent {
    /// Session snapshot carried by the event.
    pub fn session(&self) -> &GameSession {
        match self {
            GameEvent::GameStarted { session }
            | GameEvent::MoveApplied { session }
            | GameEvent::OpponentLeft { session } => session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::PlayerRegistry;

    #[test]
    fn test_command_json() {
        let json = r#"{"command":"board_move","game_id":3,"row":1,"col":2}"#;
        let command: GameCommand = serde_json::from_str(json).unwrap();
        assert_eq!(command, GameCommand::BoardMove { game_id: GameId(3), row: 1, col: 2 });

        let json = r#"{"command":"start_game","from_player":1,"to_player":2}"#;
        let command: GameCommand = serde_json::from_str(json).unwrap();
        assert_eq!(
            command,
            GameCommand::StartGame { from_player: PlayerId(1), to_player: PlayerId(2) }
        );
    }

    #[test]
    fn test_negative_index_rejected() {
        let json = r#"{"command":"board_move","game_id":3,"row":-1,"col":2}"#;
        assert!(serde_json::from_str::<GameCommand>(json).is_err());
    }

    #[test]
    fn test_event_tag_and_session() {
        let mut registry = PlayerRegistry::new();
        let session = GameSession::new(
            GameId(1),
            registry.create_player("alice"),
            registry.create_player("bob"),
        );

        let event = GameEvent::OpponentLeft { session: session.clone() };
        assert_eq!(event.session(), &session);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "opponent_left");
        assert_eq!(json["session"]["player_x"]["name"], "bob");
    }
}
