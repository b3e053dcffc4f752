//! Battle scenario definitions.

use serde::{Deserialize, Serialize};

use crate::alliance::{AllianceId, Alliances, Player, PlayerId};
use crate::battle::{muster_order, Battle, Contingent};
use crate::battlefield::{Battlefield, Blockage, BATTLEFIELD_HEIGHT, BATTLEFIELD_WIDTH};
use crate::error::{GameError, Result};
use crate::formation::Deployment;
use crate::geometry::Tile;
use crate::pawn::{Troop, Unit, SPEED_LIMIT};

/// A non-open battlefield cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockageData {
    /// Cell position.
    pub tile: Tile,
    /// What blocks it.
    pub blockage: Blockage,
}

/// A troop taking part in the scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TroopData {
    /// Name of the troop's unit type.
    pub unit: String,
    /// Owning player.
    pub owner: PlayerId,
    /// Soldiers in the troop.
    pub count: u32,
    /// Where the troop enters the battle.
    pub deployment: Deployment,
    /// Tiles to move through, in order, from the first round on.
    #[serde(default)]
    pub orders: Vec<Tile>,
}

fn default_width() -> u32 {
    BATTLEFIELD_WIDTH
}

fn default_height() -> u32 {
    BATTLEFIELD_HEIGHT
}

fn default_rounds() -> u32 {
    1
}

/// Data-driven battle set-up.
///
/// # Example RON
///
/// ```ron
/// BattleScenario(
///     name: "Gatehouse",
///     players: [
///         Player(name: "Attacker", alliance: 0),
///         Player(name: "Garrison", alliance: 1),
///     ],
///     defender: 1,
///     units: [
///         Unit(name: "cavalry", speed: 4),
///         Unit(name: "archers", speed: 2, ranged: true),
///     ],
///     troops: [
///         TroopData(unit: "cavalry", owner: 0, count: 30, deployment: Attack(North),
///                   orders: [(x: 12, y: 8)]),
///         TroopData(unit: "archers", owner: 1, count: 40, deployment: Defend),
///     ],
///     blockages: [
///         BlockageData(tile: (x: 12, y: 15), blockage: Gate(owner: 1, strength: 50)),
///     ],
///     rounds: 3,
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BattleScenario {
    /// Scenario name, for reports.
    pub name: String,

    /// Battlefield width in tiles.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Battlefield height in tiles.
    #[serde(default = "default_height")]
    pub height: u32,

    /// Players; a player's ID is its index here.
    pub players: Vec<Player>,

    /// Alliance that keeps the field if nobody survives.
    pub defender: AllianceId,

    /// Unit types available to the troops.
    pub units: Vec<Unit>,

    /// Troops in the battle.
    pub troops: Vec<TroopData>,

    /// Terrain, walls and gates. Unlisted cells are open.
    #[serde(default)]
    pub blockages: Vec<BlockageData>,

    /// Rounds to simulate when the scenario is run unattended.
    #[serde(default = "default_rounds")]
    pub rounds: u32,
}

impl BattleScenario {
    /// Parse a scenario from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] naming `source_name` if the
    /// text is not a valid scenario.
    pub fn from_ron(source_name: &str, text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| GameError::DataParseError {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })
    }

    /// Get a unit type by name.
    #[must_use]
    pub fn get_unit(&self, name: &str) -> Option<&Unit> {
        self.units.iter().find(|unit| unit.name == name)
    }

    /// Check the scenario for inconsistencies.
    ///
    /// Returns a list of problems; empty if the scenario is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.width == 0 || self.height == 0 {
            errors.push(format!(
                "Battlefield size {}x{} must be positive",
                self.width, self.height
            ));
        }
        let in_bounds = |tile: Tile| tile.x < self.width && tile.y < self.height;

        if !self.players.iter().any(|p| p.alliance == self.defender) {
            errors.push(format!("Defender alliance {} has no players", self.defender));
        }
        let known_player = |id: PlayerId| (id as usize) < self.players.len();

        for (index, unit) in self.units.iter().enumerate() {
            if unit.speed == 0 || unit.speed > SPEED_LIMIT {
                errors.push(format!(
                    "Unit '{}' speed {} outside 1..={SPEED_LIMIT}",
                    unit.name, unit.speed
                ));
            }
            if self.units[..index].iter().any(|u| u.name == unit.name) {
                errors.push(format!("Duplicate unit '{}'", unit.name));
            }
        }

        for (index, troop) in self.troops.iter().enumerate() {
            if self.get_unit(&troop.unit).is_none() {
                errors.push(format!("Troop {index} uses unknown unit '{}'", troop.unit));
            }
            if !known_player(troop.owner) {
                errors.push(format!("Troop {index} owned by unknown player {}", troop.owner));
            }
            if troop.count == 0 {
                errors.push(format!("Troop {index} has no soldiers"));
            }
            for &order in &troop.orders {
                if !in_bounds(order) {
                    errors.push(format!("Troop {index} ordered off the battlefield to {order}"));
                }
            }
        }

        for entry in &self.blockages {
            if !in_bounds(entry.tile) {
                errors.push(format!("Blockage at {} is off the battlefield", entry.tile));
            }
            if let Blockage::Wall { owner, .. } | Blockage::Gate { owner, .. } = entry.blockage {
                if !known_player(owner) {
                    errors.push(format!(
                        "Fortification at {} owned by unknown player {owner}",
                        entry.tile
                    ));
                }
            }
        }

        errors
    }

    /// The battlefield described by the scenario.
    ///
    /// # Panics
    ///
    /// Panics if the width or height is zero; see [`Self::validate`].
    #[must_use]
    pub fn battlefield(&self) -> Battlefield {
        let mut battlefield = Battlefield::new(self.width, self.height);
        for entry in &self.blockages {
            battlefield.set(entry.tile, entry.blockage);
        }
        battlefield
    }

    /// Deploy the scenario and queue every troop's opening orders.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] listing every validation
    /// problem, or the first error raised while deploying troops or routing
    /// their orders.
    pub fn build(&self) -> Result<Battle> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(GameError::DataParseError {
                source_name: self.name.clone(),
                message: errors.join("; "),
            });
        }

        let mut contingents = Vec::new();
        contingents.try_reserve(self.troops.len())?;
        for troop in &self.troops {
            let unit = self.get_unit(&troop.unit).cloned().ok_or_else(|| {
                GameError::InvalidState(format!("Unknown unit '{}'", troop.unit))
            })?;
            contingents.push(Contingent::new(
                Troop::new(unit, troop.owner, troop.count),
                troop.deployment,
            ));
        }

        let mut battle = Battle::new(
            self.battlefield(),
            Alliances::new(self.players.clone()),
            contingents,
            self.defender,
        )?;

        let owners: Vec<PlayerId> = self.troops.iter().map(|troop| troop.owner).collect();
        for (pawn, troop) in muster_order(&owners).into_iter().enumerate() {
            for &target in &self.troops[troop].orders {
                battle.order_queue(pawn, target)?;
            }
        }

        tracing::info!(
            scenario = %self.name,
            pawns = battle.pawns().len(),
            "Loaded scenario"
        );
        Ok(battle)
    }
}
