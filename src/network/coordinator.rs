//! Session Coordinator
//!
//! Single authority over players, connections and game sessions.
//!
//! All three stores sit behind one lock. Every mutating operation holds the
//! write lock from validation through broadcast, so a move is validated,
//! applied and announced atomically with respect to every other command.
//! Broadcast never blocks: outbound queues are bounded and drop on full.

use tokio::sync::{mpsc, RwLock};
use tracing::{info, instrument, warn};

use crate::game::board::BoardError;
use crate::game::events::{GameCommand, GameEvent};
use crate::game::player::{Player, PlayerId, PlayerRegistry};
use crate::game::session::{GameId, GameSession, MoveError, SessionStore};
use crate::network::connection::{ConnectionId, ConnectionTable, JoinError};
use crate::network::protocol::ServerMessage;

/// Rejected game commands.
///
/// These are soft failures: the transport logs them and the client
/// receives nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// A start-game participant has no live connection.
    #[error("player {0} is not connected")]
    PlayerNotConnected(PlayerId),

    /// A player tried to start a game against itself.
    #[error("player {0} cannot start a game against itself")]
    SelfGame(PlayerId),

    /// No session with this id.
    #[error("game {0} does not exist")]
    GameNotFound(GameId),

    /// Mover is not next to move.
    #[error("player {player} moved out of turn in game {game}")]
    OutOfTurn {
        /// Target game.
        game: GameId,
        /// Player who tried to move.
        player: PlayerId,
    },

    /// Target cell is off the board.
    #[error(transparent)]
    OutOfBounds(#[from] BoardError),
}

impl From<MoveError> for CommandError {
    fn from(err: MoveError) -> Self {
        match err {
            MoveError::OutOfTurn { game, player } => CommandError::OutOfTurn { game, player },
            MoveError::Board(e) => CommandError::OutOfBounds(e),
        }
    }
}

struct CoordinatorState {
    players: PlayerRegistry,
    connections: ConnectionTable,
    sessions: SessionStore,
}

/// Serializes all state changes and broadcasts their events.
pub struct Coordinator {
    state: RwLock<CoordinatorState>,
}

impl Coordinator {
    /// Create a coordinator with empty stores.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CoordinatorState {
                players: PlayerRegistry::new(),
                connections: ConnectionTable::new(),
                sessions: SessionStore::new(),
            }),
        }
    }

    // =========================================================================
    // PLAYERS
    // =========================================================================

    /// Register a new player.
    #[instrument(skip(self, name))]
    pub async fn create_player(&self, name: impl Into<String>) -> Player {
        let mut state = self.state.write().await;
        let player = state.players.create_player(name);
        info!("Created player {} ({})", player.id, player.name);
        player
    }

    /// Every player ever created, in creation order.
    pub async fn list_players(&self) -> Vec<Player> {
        self.state.read().await.players.list_players()
    }

    /// Players with a live connection.
    pub async fn joined_players(&self) -> Vec<Player> {
        self.state.read().await.connections.joined_players()
    }

    // =========================================================================
    // CONNECTIONS
    // =========================================================================

    /// Bind a player identity to an outbound queue.
    #[instrument(skip(self, outbound))]
    pub async fn join(
        &self,
        player_id: PlayerId,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<ConnectionId, JoinError> {
        let mut state = self.state.write().await;
        let CoordinatorState { players, connections, .. } = &mut *state;
        connections.join(players, player_id, outbound)
    }

    /// Unjoin a player and close every game it takes part in.
    ///
    /// Each still-connected opponent receives one `OpponentLeft`. Sessions
    /// are removed whether or not the opponent is connected. Returns the
    /// ids of the closed games.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, player_id: PlayerId) -> Vec<GameId> {
        let mut state = self.state.write().await;
        Self::disconnect_locked(&mut state, player_id)
    }

    /// Transport entry point for disconnect.
    ///
    /// Only acts if `connection_id` is the player's live connection, so a
    /// stale socket cannot unjoin a newer connection of the same player.
    #[instrument(skip(self))]
    pub async fn disconnect_connection(
        &self,
        player_id: PlayerId,
        connection_id: ConnectionId,
    ) -> Vec<GameId> {
        let mut state = self.state.write().await;
        match state.connections.get(player_id) {
            Some(c) if c.id == connection_id => Self::disconnect_locked(&mut state, player_id),
            _ => {
                info!("Connection {} of player {} is no longer live", connection_id, player_id);
                Vec::new()
            }
        }
    }

    fn disconnect_locked(state: &mut CoordinatorState, player_id: PlayerId) -> Vec<GameId> {
        state.connections.leave(player_id);

        let game_ids = state.sessions.sessions_of(player_id);
        for game_id in &game_ids {
            let Some(session) = state.sessions.remove(*game_id) else {
                continue;
            };
            let opponent = session.opponent_of(player_id).map(|p| p.id);
            info!("Closed game {} after player {} left", game_id, player_id);

            if let Some(opponent) = opponent {
                state
                    .connections
                    .send(opponent, ServerMessage::Event(GameEvent::OpponentLeft { session }));
            }
        }
        game_ids
    }

    // =========================================================================
    // GAME COMMANDS
    // =========================================================================

    /// Dispatch a command issued by `player_id`.
    pub async fn handle_command(
        &self,
        player_id: PlayerId,
        command: GameCommand,
    ) -> Result<GameSession, CommandError> {
        match command {
            GameCommand::StartGame { from_player, to_player } => {
                if from_player != player_id {
                    info!(
                        "Player {} requested a game on behalf of player {}",
                        player_id, from_player
                    );
                }
                self.start_game(from_player, to_player).await
            }
            GameCommand::BoardMove { game_id, row, col } => {
                self.apply_move(player_id, game_id, row, col).await
            }
        }
    }

    /// Open a game between two joined players.
    ///
    /// `from` plays O and moves first. Both players receive `GameStarted`.
    #[instrument(skip(self))]
    pub async fn start_game(&self, from: PlayerId, to: PlayerId) -> Result<GameSession, CommandError> {
        let mut state = self.state.write().await;

        let from_player = state
            .connections
            .get(from)
            .map(|c| c.player.clone())
            .ok_or(CommandError::PlayerNotConnected(from))?;
        let to_player = state
            .connections
            .get(to)
            .map(|c| c.player.clone())
            .ok_or(CommandError::PlayerNotConnected(to))?;
        if from == to {
            return Err(CommandError::SelfGame(from));
        }

        let session = state.sessions.create(from_player, to_player).clone();
        info!(
            "Started game {} between {} and {}",
            session.id, session.player_o.name, session.player_x.name
        );

        for player_id in [from, to] {
            state.connections.send(
                player_id,
                ServerMessage::Event(GameEvent::GameStarted { session: session.clone() }),
            );
        }
        Ok(session)
    }

    /// Apply a move and broadcast the new state to both participants.
    ///
    /// Checked in order: the game exists, the mover is connected, it is the
    /// mover's turn, the cell is on the board. The cell is not required to
    /// be empty.
    #[instrument(skip(self))]
    pub async fn apply_move(
        &self,
        mover: PlayerId,
        game_id: GameId,
        row: usize,
        col: usize,
    ) -> Result<GameSession, CommandError> {
        let mut state = self.state.write().await;
        let CoordinatorState { connections, sessions, .. } = &mut *state;

        let session = sessions
            .get_mut(game_id)
            .ok_or(CommandError::GameNotFound(game_id))?;
        if !connections.is_connected(mover) {
            return Err(CommandError::PlayerNotConnected(mover));
        }
        session.apply_move(mover, row, col)?;

        let snapshot = session.clone();
        info!("Move recorded on game {} by player {} at ({}, {})", game_id, mover, row, col);

        for player_id in [snapshot.player_o.id, snapshot.player_x.id] {
            connections.send(
                player_id,
                ServerMessage::Event(GameEvent::MoveApplied { session: snapshot.clone() }),
            );
        }
        Ok(snapshot)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Snapshot of a session.
    pub async fn session(&self, game_id: GameId) -> Option<GameSession> {
        self.state.read().await.sessions.get(game_id).cloned()
    }

    /// Number of active sessions.
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Log a rejected command. Rejections are never sent to the client.
    pub fn log_rejection(player_id: PlayerId, err: &CommandError) {
        warn!("Rejected command from player {}: {}", player_id, err);
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
