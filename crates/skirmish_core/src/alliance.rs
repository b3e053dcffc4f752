//! Players and the alliances they belong to.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// Index of a player in the [`Alliances`] table.
pub type PlayerId = u8;

/// Identifier shared by all players fighting on the same side.
pub type AllianceId = u8;

/// A player taking part in the battle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    /// Display name.
    pub name: String,
    /// Side the player fights on.
    pub alliance: AllianceId,
}

impl Player {
    /// Create a player.
    #[must_use]
    pub fn new(name: impl Into<String>, alliance: AllianceId) -> Self {
        Self {
            name: name.into(),
            alliance,
        }
    }
}

/// Player/alliance table used for every hostility test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alliances {
    players: Vec<Player>,
}

impl Alliances {
    /// Create the table. Player IDs are indices into `players`.
    #[must_use]
    pub fn new(players: Vec<Player>) -> Self {
        Self { players }
    }

    /// Number of players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether there are no players.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Look up a player.
    pub fn player(&self, id: PlayerId) -> Result<&Player> {
        self.players
            .get(id as usize)
            .ok_or(GameError::InvalidPlayer(id))
    }

    /// Alliance of a player.
    pub fn alliance_of(&self, id: PlayerId) -> Result<AllianceId> {
        self.player(id).map(|player| player.alliance)
    }

    /// Whether two players fight on the same side.
    ///
    /// Unknown players are nobody's allies.
    #[must_use]
    pub fn allies(&self, a: PlayerId, b: PlayerId) -> bool {
        match (self.alliance_of(a), self.alliance_of(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Every alliance with at least one player, ascending.
    #[must_use]
    pub fn alliances(&self) -> Vec<AllianceId> {
        let mut ids: Vec<_> = self.players.iter().map(|p| p.alliance).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// First player of an alliance; used as the observer when building
    /// shared navigation data.
    #[must_use]
    pub fn representative(&self, alliance: AllianceId) -> Option<PlayerId> {
        self.players
            .iter()
            .position(|p| p.alliance == alliance)
            .map(|index| index as PlayerId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Alliances {
        Alliances::new(vec![
            Player::new("attacker", 0),
            Player::new("ally", 0),
            Player::new("defender", 1),
        ])
    }

    #[test]
    fn test_allies() {
        let table = table();
        assert!(table.allies(0, 1));
        assert!(table.allies(2, 2));
        assert!(!table.allies(0, 2));
        assert!(!table.allies(0, 9));
    }

    #[test]
    fn test_invalid_player() {
        assert!(matches!(
            table().alliance_of(7),
            Err(GameError::InvalidPlayer(7))
        ));
    }

    #[test]
    fn test_alliances_and_representative() {
        let table = table();
        assert_eq!(table.alliances(), vec![0, 1]);
        assert_eq!(table.representative(0), Some(0));
        assert_eq!(table.representative(1), Some(2));
        assert_eq!(table.representative(5), None);
    }
}
