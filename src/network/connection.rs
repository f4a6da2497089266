//! Connection Table
//!
//! Maps each joined player to the outbound queue of its live connection.
//! A player has at most one connection at a time.

use std::collections::BTreeMap;
use std::time::Instant;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::player::{Player, PlayerId, PlayerRegistry};
use crate::network::protocol::ServerMessage;

/// Identifier of one physical connection.
pub type ConnectionId = Uuid;

/// Join errors. Both terminate the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    /// The player already has a live connection.
    #[error("player with id {0} has already joined")]
    AlreadyJoined(PlayerId),

    /// The id was never issued by the registry.
    #[error("player with id {0} does not exist, create player first")]
    UnknownPlayer(PlayerId),
}

/// A joined player and its outbound queue.
#[derive(Debug)]
pub struct Connection {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Joined player.
    pub player: Player,
    /// When the player joined.
    pub connected_at: Instant,
    outbound: mpsc::Sender<ServerMessage>,
}

/// Live connections keyed by player.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: BTreeMap<PlayerId, Connection>,
}

impl ConnectionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a player to an outbound queue.
    ///
    /// On success a `Joined` reply is queued before the connection becomes
    /// visible, so it always precedes any game event.
    pub fn join(
        &mut self,
        players: &PlayerRegistry,
        player_id: PlayerId,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<ConnectionId, JoinError> {
        if self.connections.contains_key(&player_id) {
            return Err(JoinError::AlreadyJoined(player_id));
        }
        let player = players
            .get(player_id)
            .cloned()
            .ok_or(JoinError::UnknownPlayer(player_id))?;

        let connection = Connection {
            id: Uuid::new_v4(),
            player,
            connected_at: Instant::now(),
            outbound,
        };
        let id = connection.id;

        deliver(&connection, ServerMessage::Joined { player: connection.player.clone() });
        self.connections.insert(player_id, connection);

        info!(player = %player_id, connection = %id, "Player joined");
        Ok(id)
    }

    /// Remove a player's connection. No-op if absent.
    pub fn leave(&mut self, player_id: PlayerId) -> Option<Connection> {
        let removed = self.connections.remove(&player_id);
        match &removed {
            Some(c) => info!(
                player = %player_id,
                connection = %c.id,
                "Unjoining player after {:?}",
                c.connected_at.elapsed()
            ),
            None => info!(player = %player_id, "Unjoining player, but player is not joined"),
        }
        removed
    }

    /// Deliver a message to a player if connected.
    ///
    /// Never blocks: a full or closed queue drops the message.
    /// Returns whether the message was queued.
    pub fn send(&self, player_id: PlayerId, message: ServerMessage) -> bool {
        match self.connections.get(&player_id) {
            Some(connection) => deliver(connection, message),
            None => {
                debug!(player = %player_id, "Dropping message for disconnected player");
                false
            }
        }
    }

    /// Get a player's connection.
    pub fn get(&self, player_id: PlayerId) -> Option<&Connection> {
        self.connections.get(&player_id)
    }

    /// Check if a player has a live connection.
    pub fn is_connected(&self, player_id: PlayerId) -> bool {
        self.connections.contains_key(&player_id)
    }

    /// Players with a live connection, ordered by id.
    pub fn joined_players(&self) -> Vec<Player> {
        self.connections.values().map(|c| c.player.clone()).collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

fn deliver(connection: &Connection, message: ServerMessage) -> bool {
    match connection.outbound.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(
                player = %connection.player.id,
                "Outbound queue full, dropping message"
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(player = %connection.player.id, "Outbound queue closed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[&str]) -> (PlayerRegistry, Vec<PlayerId>) {
        let mut registry = PlayerRegistry::new();
        let ids = names.iter().map(|n| registry.create_player(*n).id).collect();
        (registry, ids)
    }

    fn pong(timestamp: u64) -> ServerMessage {
        ServerMessage::Pong { timestamp, server_time: 0 }
    }

    #[tokio::test]
    async fn test_join_queues_joined_reply() {
        let (registry, ids) = registry_with(&["alice"]);
        let mut table = ConnectionTable::new();
        let (tx, mut rx) = mpsc::channel(4);

        table.join(&registry, ids[0], tx).unwrap();

        match rx.recv().await {
            Some(ServerMessage::Joined { player }) => assert_eq!(player.id, ids[0]),
            other => panic!("Expected Joined, got {:?}", other),
        }
        assert!(table.is_connected(ids[0]));
    }

    #[tokio::test]
    async fn test_join_twice_fails() {
        let (registry, ids) = registry_with(&["alice"]);
        let mut table = ConnectionTable::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);

        let first = table.join(&registry, ids[0], tx1).unwrap();
        let second = table.join(&registry, ids[0], tx2);

        assert_eq!(second, Err(JoinError::AlreadyJoined(ids[0])));
        assert_eq!(table.get(ids[0]).map(|c| c.id), Some(first));
    }

    #[tokio::test]
    async fn test_join_unknown_player() {
        let (registry, _) = registry_with(&["alice"]);
        let mut table = ConnectionTable::new();
        let (tx, _rx) = mpsc::channel(4);

        let result = table.join(&registry, PlayerId(42), tx);
        assert_eq!(result, Err(JoinError::UnknownPlayer(PlayerId(42))));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_rejoin_after_leave() {
        let (registry, ids) = registry_with(&["alice"]);
        let mut table = ConnectionTable::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);

        let first = table.join(&registry, ids[0], tx1).unwrap();
        assert_eq!(table.leave(ids[0]).map(|c| c.id), Some(first));
        assert!(table.leave(ids[0]).is_none());

        let second = table.join(&registry, ids[0], tx2).unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_send_to_disconnected_is_dropped() {
        let table = ConnectionTable::new();
        assert!(!table.send(PlayerId(1), pong(1)));
    }

    #[tokio::test]
    async fn test_send_full_queue_drops() {
        let (registry, ids) = registry_with(&["alice"]);
        let mut table = ConnectionTable::new();
        let (tx, mut rx) = mpsc::channel(2);

        // Joined takes the first slot.
        table.join(&registry, ids[0], tx).unwrap();
        assert!(table.send(ids[0], pong(1)));
        assert!(!table.send(ids[0], pong(2)));

        assert!(matches!(rx.recv().await, Some(ServerMessage::Joined { .. })));
        assert_eq!(rx.recv().await, Some(pong(1)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_closed_queue() {
        let (registry, ids) = registry_with(&["alice"]);
        let mut table = ConnectionTable::new();
        let (tx, rx) = mpsc::channel(4);

        table.join(&registry, ids[0], tx).unwrap();
        drop(rx);
        assert!(!table.send(ids[0], pong(1)));
    }

    #[tokio::test]
    async fn test_joined_players() {
        let (registry, ids) = registry_with(&["alice", "bob", "carol"]);
        let mut table = ConnectionTable::new();
        let (tx, _rx) = mpsc::channel(8);

        table.join(&registry, ids[2], tx.clone()).unwrap();
        table.join(&registry, ids[0], tx).unwrap();

        let joined: Vec<_> = table.joined_players().into_iter().map(|p| p.name).collect();
        assert_eq!(joined, vec!["alice", "carol"]);
        assert_eq!(table.len(), 2);
    }
}
