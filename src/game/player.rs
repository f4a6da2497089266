//! Players
//!
//! Player identities and the registry of every player created during
//! the process lifetime. Nothing is ever removed from the registry.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier.
///
/// Issued sequentially from 1 by [`PlayerRegistry`]. Implements Ord so
/// stores keyed by player iterate in creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl PlayerId {
    /// Create from a raw value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlayerId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// A registered player.
///
/// Immutable once created. Two players are the same player iff their ids match.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    /// Unique identifier.
    pub id: PlayerId,
    /// Display name, not validated.
    pub name: String,
    /// When the player was created (epoch milliseconds on the wire).
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub joined_at: DateTime<Utc>,
    /// Games won. Always zero, results are not tracked.
    pub wins: u32,
}

impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Player {}

// =============================================================================
// REGISTRY
// =============================================================================

/// Every player ever created, keyed by id.
#[derive(Debug)]
pub struct PlayerRegistry {
    next_id: u64,
    players: BTreeMap<PlayerId, Player>,
}

impl PlayerRegistry {
    /// Create an empty registry. The first player gets id 1.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            players: BTreeMap::new(),
        }
    }

    /// Create and store a new player.
    pub fn create_player(&mut self, name: impl Into<String>) -> Player {
        let id = PlayerId(self.next_id);
        self.next_id += 1;

        let player = Player {
            id,
            name: name.into(),
            joined_at: Utc::now(),
            wins: 0,
        };
        self.players.insert(id, player.clone());
        player
    }

    /// Look up a player.
    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Check if an id was ever issued.
    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    /// All players in creation order.
    pub fn list_players(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    /// Number of players created.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Check if no player has been created.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
