//! Battle lifecycle: deployment, orders, rounds and the end condition.
//!
//! A [`Battle`] owns the battlefield, the alliance table and every pawn.
//! Navigation data is built lazily per alliance and thrown away whenever the
//! battlefield or the round changes.
//!
//! # Example
//!
//! ```
//! use skirmish_core::prelude::*;
//!
//! let alliances = Alliances::new(vec![Player::new("red", 0), Player::new("blue", 1)]);
//! let contingents = vec![
//!     Contingent::new(Troop::new(Unit::new("cavalry", 4), 0, 20), Deployment::Attack(Direction::North)),
//!     Contingent::new(Troop::new(Unit::new("militia", 2), 1, 40), Deployment::Defend),
//! ];
//! let mut battle = Battle::new(Battlefield::default(), alliances, contingents, 1).unwrap();
//!
//! battle.order_move(0, Tile::new(12, 8)).unwrap();
//! battle.round().unwrap();
//! assert_eq!(battle.pawns()[0].position, Tile::new(12, 4).center());
//! assert_eq!(battle.battle_end(), None);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::alliance::{AllianceId, Alliances, PlayerId};
use crate::battlefield::{Battlefield, Blockage};
use crate::error::{GameError, Result};
use crate::formation::{formation, Deployment};
use crate::geometry::{path_visible, segment_hits_circle, Tile, PAWN_RADIUS};
use crate::movement::{movement_perform, movement_plan, MovementReport};
use crate::pathfinding::{
    movement_queue, movement_reachable, movement_set, movement_stay, reachable, Navigation,
    Reachability,
};
use crate::pawn::{Pawn, Troop};

/// A troop together with how it enters the battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contingent {
    /// The troop.
    pub troop: Troop,
    /// Where it deploys.
    pub deployment: Deployment,
}

impl Contingent {
    /// Create a contingent.
    #[must_use]
    pub fn new(troop: Troop, deployment: Deployment) -> Self {
        Self { troop, deployment }
    }
}

/// Pawn order for troops with the given owners: grouped by owning player,
/// stable within a player. Entry `i` is the index of the troop that becomes
/// pawn `i`.
#[must_use]
pub fn muster_order(owners: &[PlayerId]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..owners.len()).collect();
    order.sort_by_key(|&index| owners[index]);
    order
}

/// Outcome of a line-of-fire check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOfFire {
    /// Nothing in the way.
    Clear,
    /// An obstacle is in the way.
    Blocked,
    /// Another pawn is in the way.
    Obstructed(usize),
}

/// A battle in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Battle {
    battlefield: Battlefield,
    alliances: Alliances,
    pawns: Vec<Pawn>,
    defender: AllianceId,
    round: u32,
    /// Navigation per alliance, built on demand.
    #[serde(skip)]
    navigation: BTreeMap<AllianceId, Navigation>,
}

impl Battle {
    /// Deploy every contingent and start the battle (`battlefield_init`).
    ///
    /// Pawns are grouped by owning player, keeping the given order within a
    /// player. Each pawn takes the first slot of its formation that its
    /// owner may enter and no earlier pawn holds.
    ///
    /// # Errors
    ///
    /// - [`GameError::InvalidPlayer`] for a troop owned by an unknown player
    /// - [`GameError::SpeedOutOfRange`] for a unit the simulator cannot move
    /// - [`GameError::NoFormationSlot`] when a formation is full
    pub fn new(
        battlefield: Battlefield,
        alliances: Alliances,
        contingents: Vec<Contingent>,
        defender: AllianceId,
    ) -> Result<Self> {
        let owners: Vec<PlayerId> = contingents.iter().map(|c| c.troop.owner).collect();
        let order = muster_order(&owners);
        let mut slots: Vec<Option<Contingent>> = contingents.into_iter().map(Some).collect();

        let (width, height) = (battlefield.width(), battlefield.height());
        let mut taken = vec![false; (width as usize) * (height as usize)];
        let mut pawns = Vec::new();
        pawns.try_reserve(order.len())?;

        for index in order {
            let Some(contingent) = slots[index].take() else {
                continue;
            };
            let owner = contingent.troop.owner;
            alliances.player(owner)?;

            let slot = formation(contingent.deployment, width, height)
                .into_iter()
                .find(|&tile| {
                    !taken[(tile.y as usize) * (width as usize) + (tile.x as usize)]
                        && battlefield.passable(tile, owner, &alliances)
                })
                .ok_or(GameError::NoFormationSlot { troop: index })?;

            taken[(slot.y as usize) * (width as usize) + (slot.x as usize)] = true;
            pawns.push(Pawn::new(contingent.troop, slot)?);
        }

        tracing::debug!(pawns = pawns.len(), defender, "Battle deployed");
        Ok(Self {
            battlefield,
            alliances,
            pawns,
            defender,
            round: 0,
            navigation: BTreeMap::new(),
        })
    }

    /// The battlefield.
    #[must_use]
    pub fn battlefield(&self) -> &Battlefield {
        &self.battlefield
    }

    /// Player/alliance table.
    #[must_use]
    pub fn alliances(&self) -> &Alliances {
        &self.alliances
    }

    /// Every pawn, dead ones included, in pawn order.
    #[must_use]
    pub fn pawns(&self) -> &[Pawn] {
        &self.pawns
    }

    /// Mutable pawn access for the combat layer.
    pub fn pawn_mut(&mut self, pawn: usize) -> Result<&mut Pawn> {
        self.pawns.get_mut(pawn).ok_or(GameError::InvalidPawn(pawn))
    }

    /// Alliance that wins if nobody is left standing.
    #[must_use]
    pub fn defender(&self) -> AllianceId {
        self.defender
    }

    /// Rounds played so far.
    #[must_use]
    pub fn round_number(&self) -> u32 {
        self.round
    }

    /// Change a battlefield cell, e.g. when a wall is breached.
    pub fn set_blockage(&mut self, tile: Tile, blockage: Blockage) -> bool {
        self.navigation.clear();
        self.battlefield.set(tile, blockage)
    }

    /// Navigation data as seen by `player`'s alliance.
    pub fn navigation(&mut self, player: PlayerId) -> Result<&mut Navigation> {
        cached_navigation(
            &mut self.navigation,
            &self.battlefield,
            &self.alliances,
            player,
        )
    }

    /// A pawn together with its alliance's navigation data.
    fn routed(&mut self, pawn: usize) -> Result<(&mut Pawn, &mut Navigation)> {
        let owner = self
            .pawns
            .get(pawn)
            .ok_or(GameError::InvalidPawn(pawn))?
            .owner();
        let nav = cached_navigation(
            &mut self.navigation,
            &self.battlefield,
            &self.alliances,
            owner,
        )?;
        Ok((&mut self.pawns[pawn], nav))
    }

    /// Replace a pawn's orders with a move to `target`.
    pub fn order_move(&mut self, pawn: usize, target: Tile) -> Result<()> {
        let (pawn, nav) = self.routed(pawn)?;
        movement_set(pawn, target, nav)
    }

    /// Queue a move to `target` after the pawn's current orders.
    pub fn order_queue(&mut self, pawn: usize, target: Tile) -> Result<()> {
        let (pawn, nav) = self.routed(pawn)?;
        movement_queue(pawn, target, nav)
    }

    /// Cancel a pawn's movement orders.
    pub fn order_stay(&mut self, pawn: usize) -> Result<()> {
        movement_stay(self.pawn_mut(pawn)?);
        Ok(())
    }

    /// Distances from a pawn to every tile.
    pub fn reachable(&mut self, pawn: usize) -> Result<Reachability> {
        let (pawn, nav) = self.routed(pawn)?;
        reachable(pawn.position, nav)
    }

    /// Whether a pawn can get to `tile` this round.
    pub fn movement_reachable(&mut self, pawn: usize, tile: Tile) -> Result<bool> {
        let (pawn, nav) = self.routed(pawn)?;
        movement_reachable(pawn, nav, tile)
    }

    /// Whether `shooter` can hit `target`.
    ///
    /// Obstacles are those of the shooter's alliance; any other live pawn
    /// whose body the line passes through obstructs the shot.
    pub fn line_of_fire(&mut self, shooter: usize, target: usize) -> Result<LineOfFire> {
        let to = self
            .pawns
            .get(target)
            .ok_or(GameError::InvalidPawn(target))?
            .position;
        let (pawn, nav) = self.routed(shooter)?;
        let from = pawn.position;

        if !path_visible(from, to, nav.obstacles()) {
            return Ok(LineOfFire::Blocked);
        }

        let obstruction = self.pawns.iter().enumerate().find(|&(index, other)| {
            index != shooter
                && index != target
                && other.alive()
                && segment_hits_circle(from, to, other.position, PAWN_RADIUS)
        });
        Ok(obstruction.map_or(LineOfFire::Clear, |(index, _)| LineOfFire::Obstructed(index)))
    }

    /// Move every pawn for one round and commit the result.
    pub fn round(&mut self) -> Result<MovementReport> {
        let report = movement_plan(&mut self.pawns, &self.alliances, &self.battlefield)?;
        for pawn in self.pawns.iter_mut().filter(|pawn| pawn.alive()) {
            movement_perform(pawn);
        }

        self.round += 1;
        self.navigation.clear();
        tracing::debug!(
            round = self.round,
            resolutions = report.resolutions,
            "Round complete"
        );
        Ok(report)
    }

    /// Alliances with at least one live pawn, ascending.
    #[must_use]
    pub fn alive_alliances(&self) -> Vec<AllianceId> {
        self.pawns
            .iter()
            .filter(|pawn| pawn.alive())
            .filter_map(|pawn| self.alliances.alliance_of(pawn.owner()).ok())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Winner of the battle, or `None` while two or more alliances still
    /// have live pawns. If nobody survives the defender keeps the field.
    #[must_use]
    pub fn battle_end(&self) -> Option<AllianceId> {
        match self.alive_alliances().as_slice() {
            [] => Some(self.defender),
            [winner] => Some(*winner),
            _ => None,
        }
    }

    /// Hash of the battle state, for determinism checks.
    ///
    /// Two battles with identical state will produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.round.hash(&mut hasher);
        self.defender.hash(&mut hasher);
        self.battlefield.hash(&mut hasher);
        self.alliances.hash(&mut hasher);
        self.pawns.hash(&mut hasher);
        hasher.finish()
    }

    /// Serialize the battle state to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize battle: {e}")))
    }

    /// Deserialize battle state from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize battle: {e}")))
    }
}

/// Look up `player`'s alliance in the navigation cache, building it on a
/// miss. Every member of an alliance shares one context, seen through the
/// alliance's first player.
fn cached_navigation<'a>(
    cache: &'a mut BTreeMap<AllianceId, Navigation>,
    battlefield: &Battlefield,
    alliances: &Alliances,
    player: PlayerId,
) -> Result<&'a mut Navigation> {
    let alliance = alliances.alliance_of(player)?;
    match cache.entry(alliance) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => {
            let observer = alliances.representative(alliance).unwrap_or(player);
            let nav = Navigation::build(battlefield, observer, alliances)?;
            Ok(entry.insert(nav))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alliance::Player;
    use crate::formation::Direction;
    use crate::pawn::Unit;

    fn alliances() -> Alliances {
        Alliances::new(vec![
            Player::new("red", 0),
            Player::new("blue", 1),
            Player::new("blue ally", 1),
        ])
    }

    fn contingent(owner: u8, speed: u32, deployment: Deployment) -> Contingent {
        Contingent::new(Troop::new(Unit::new("swordsmen", speed), owner, 25), deployment)
    }

    fn skirmish() -> Battle {
        Battle::new(
            Battlefield::default(),
            alliances(),
            vec![
                contingent(1, 2, Deployment::Defend),
                contingent(0, 4, Deployment::Attack(Direction::North)),
                contingent(1, 2, Deployment::Defend),
                contingent(0, 4, Deployment::Attack(Direction::North)),
            ],
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_pawns_grouped_by_player() {
        let battle = skirmish();
        let owners: Vec<_> = battle.pawns().iter().map(Pawn::owner).collect();
        assert_eq!(owners, vec![0, 0, 1, 1]);

        let tiles: Vec<_> = battle.pawns().iter().map(|p| p.tile).collect();
        assert_eq!(
            tiles,
            vec![
                Tile::new(12, 0),
                Tile::new(11, 0),
                Tile::new(12, 12),
                Tile::new(11, 11)
            ]
        );
    }

    #[test]
    fn test_blocked_slots_are_skipped() {
        let mut field = Battlefield::default();
        field.set(Tile::new(12, 0), Blockage::Terrain);
        let battle = Battle::new(
            field,
            alliances(),
            vec![contingent(0, 3, Deployment::Attack(Direction::North))],
            1,
        )
        .unwrap();
        assert_eq!(battle.pawns()[0].tile, Tile::new(11, 0));
    }

    #[test]
    fn test_full_formation() {
        let result = Battle::new(
            Battlefield::new(2, 1),
            alliances(),
            vec![
                contingent(0, 1, Deployment::Attack(Direction::North)),
                contingent(0, 1, Deployment::Attack(Direction::North)),
                contingent(0, 1, Deployment::Attack(Direction::North)),
            ],
            1,
        );
        assert!(matches!(result, Err(GameError::NoFormationSlot { troop: 2 })));
    }

    #[test]
    fn test_unknown_owner_and_bad_speed() {
        let unknown = Battle::new(
            Battlefield::default(),
            alliances(),
            vec![contingent(7, 2, Deployment::Defend)],
            1,
        );
        assert!(matches!(unknown, Err(GameError::InvalidPlayer(7))));

        let frozen = Battle::new(
            Battlefield::default(),
            alliances(),
            vec![contingent(0, 0, Deployment::Defend)],
            1,
        );
        assert!(matches!(frozen, Err(GameError::SpeedOutOfRange { .. })));
    }

    #[test]
    fn test_battle_end() {
        let mut battle = skirmish();
        assert_eq!(battle.battle_end(), None);

        battle.pawn_mut(0).unwrap().troop.count = 0;
        battle.pawn_mut(1).unwrap().troop.count = 0;
        assert_eq!(battle.alive_alliances(), vec![1]);
        assert_eq!(battle.battle_end(), Some(1));

        let mut battle = skirmish();
        for index in 2..4 {
            battle.pawn_mut(index).unwrap().troop.count = 0;
        }
        assert_eq!(battle.battle_end(), Some(0));

        for index in 0..2 {
            battle.pawn_mut(index).unwrap().troop.count = 0;
        }
        assert_eq!(battle.battle_end(), Some(battle.defender()));
    }

    #[test]
    fn test_orders_and_round() {
        let mut battle = skirmish();
        battle.order_move(0, Tile::new(12, 8)).unwrap();
        assert!(battle.movement_reachable(0, Tile::new(12, 4)).unwrap());
        assert!(!battle.movement_reachable(0, Tile::new(12, 5)).unwrap());

        battle.round().unwrap();
        assert_eq!(battle.round_number(), 1);
        assert_eq!(battle.pawns()[0].position, Tile::new(12, 4).center());
        assert_eq!(battle.pawns()[0].path.len(), 1);

        battle.order_stay(0).unwrap();
        assert!(battle.pawns()[0].path.is_empty());
        assert!(matches!(
            battle.order_move(9, Tile::new(1, 1)),
            Err(GameError::InvalidPawn(9))
        ));
    }

    #[test]
    fn test_gate_opens_for_allies_only() {
        let mut field = Battlefield::default();
        for x in 0..25 {
            field.set(Tile::new(x, 5), Blockage::Wall { owner: 1, strength: 80 });
        }
        field.set(Tile::new(12, 5), Blockage::Gate { owner: 2, strength: 60 });

        let mut battle = Battle::new(
            field,
            alliances(),
            vec![
                contingent(0, 3, Deployment::Attack(Direction::North)),
                contingent(1, 3, Deployment::Attack(Direction::North)),
            ],
            1,
        )
        .unwrap();

        assert!(matches!(
            battle.order_move(0, Tile::new(12, 8)),
            Err(GameError::MissingPath { .. })
        ));
        battle.order_move(1, Tile::new(12, 8)).unwrap();

        let reach = battle.reachable(1).unwrap();
        assert!(reach.get(Tile::new(12, 8)).is_some());
        assert!(battle.reachable(0).unwrap().get(Tile::new(12, 8)).is_none());
    }

    #[test]
    fn test_allies_share_navigation() {
        let mut battle = skirmish();
        assert_eq!(battle.navigation(2).unwrap().observer(), 1);
        assert_eq!(battle.navigation(1).unwrap().observer(), 1);
        assert_eq!(battle.navigation(0).unwrap().observer(), 0);
        assert!(matches!(
            battle.navigation(7),
            Err(GameError::InvalidPlayer(7))
        ));

        battle.set_blockage(Tile::new(3, 3), Blockage::Terrain);
        assert_eq!(battle.navigation(2).unwrap().obstacles().len(), 1);
    }

    #[test]
    fn test_line_of_fire() {
        let mut battle = skirmish();
        // Red pawns at (12, 0) and (11, 0), blue at (12, 12) and (11, 11)
        assert_eq!(battle.line_of_fire(0, 2).unwrap(), LineOfFire::Clear);
        assert_eq!(battle.line_of_fire(1, 2).unwrap(), LineOfFire::Clear);

        battle.pawn_mut(1).unwrap().position = Tile::new(12, 6).center();
        assert_eq!(battle.line_of_fire(0, 2).unwrap(), LineOfFire::Obstructed(1));

        battle.pawn_mut(1).unwrap().troop.count = 0;
        assert_eq!(battle.line_of_fire(0, 2).unwrap(), LineOfFire::Clear);

        battle.set_blockage(Tile::new(12, 3), Blockage::Terrain);
        assert_eq!(battle.line_of_fire(0, 2).unwrap(), LineOfFire::Blocked);
    }

    #[test]
    fn test_serialize_roundtrip_keeps_state() {
        let mut battle = skirmish();
        battle.order_move(0, Tile::new(5, 5)).unwrap();
        battle.round().unwrap();

        let bytes = battle.serialize().unwrap();
        let restored = Battle::deserialize(&bytes).unwrap();
        assert_eq!(restored.state_hash(), battle.state_hash());
        assert_eq!(restored.pawns(), battle.pawns());
    }

    #[test]
    fn test_identical_battles_hash_alike() {
        let mut a = skirmish();
        let mut b = skirmish();
        for battle in [&mut a, &mut b] {
            battle.order_move(0, Tile::new(12, 10)).unwrap();
            battle.order_move(2, Tile::new(12, 2)).unwrap();
            battle.round().unwrap();
            battle.round().unwrap();
        }
        assert_eq!(a.state_hash(), b.state_hash());
        assert_ne!(a.state_hash(), skirmish().state_hash());
    }
}
