//! Troops, pawns and their movement waypoints.

use serde::{Deserialize, Serialize};

use crate::alliance::PlayerId;
use crate::error::{GameError, Result};
use crate::geometry::{Footprint, Tile};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Fastest supported unit speed, in cells per round.
///
/// The movement simulator splits a round into enough steps that no pawn moves
/// more than half a cell per step; see [`crate::movement::MOVEMENT_STEPS`].
pub const SPEED_LIMIT: u32 = 8;

/// Unit type statistics relevant to the battle engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Unit type identifier.
    pub name: String,
    /// Movement speed in cells per round.
    pub speed: u32,
    /// Whether the unit fights at range.
    #[serde(default)]
    pub ranged: bool,
}

impl Unit {
    /// Create a melee unit type.
    #[must_use]
    pub fn new(name: impl Into<String>, speed: u32) -> Self {
        Self {
            name: name.into(),
            speed,
            ranged: false,
        }
    }

    /// Make the unit type fight at range.
    #[must_use]
    pub fn ranged(mut self) -> Self {
        self.ranged = true;
        self
    }
}

/// A stack of same-type soldiers owned by a player.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Troop {
    /// Unit type of every soldier in the stack.
    pub unit: Unit,
    /// Owning player.
    pub owner: PlayerId,
    /// Soldiers left.
    pub count: u32,
}

impl Troop {
    /// Create a troop.
    #[must_use]
    pub fn new(unit: Unit, owner: PlayerId, count: u32) -> Self {
        Self { unit, owner, count }
    }
}

/// Combat order attached to a pawn. Set and consumed by the combat layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PawnAction {
    /// No combat order.
    #[default]
    None,
    /// Melee another pawn.
    Fight {
        /// Index of the pawn to attack.
        target: usize,
    },
    /// Shoot at a position.
    Shoot {
        /// Aimed position.
        target: Vec2Fixed,
    },
    /// Attack a wall or gate.
    Assault {
        /// Fortification tile.
        target: Tile,
    },
}

/// Why a waypoint exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveKind {
    /// Requested by the player or AI.
    Manual,
    /// Location marker added by the simulator (start, stop, round end).
    Anchor,
    /// Inserted by collision resolution to hold the pawn in place.
    Wait,
}

/// A waypoint: where the pawn is at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// Position of the pawn.
    pub location: Vec2Fixed,
    /// Arrival time as a fraction of the round; may exceed 1.
    #[serde(with = "fixed_serde")]
    pub time: Fixed,
    /// Origin of the waypoint.
    pub kind: MoveKind,
}

impl Move {
    /// Create a waypoint.
    #[must_use]
    pub const fn new(location: Vec2Fixed, time: Fixed, kind: MoveKind) -> Self {
        Self {
            location,
            time,
            kind,
        }
    }

    /// A player-requested waypoint.
    #[must_use]
    pub const fn manual(location: Vec2Fixed, time: Fixed) -> Self {
        Self::new(location, time, MoveKind::Manual)
    }

    /// A simulator-added location marker.
    #[must_use]
    pub const fn anchor(location: Vec2Fixed, time: Fixed) -> Self {
        Self::new(location, time, MoveKind::Anchor)
    }
}

/// Re-derive waypoint times from cumulative distance: a pawn leaving `start`
/// at `start_time` with `speed` cells per round reaches each waypoint at
/// `start_time + distance so far / speed`.
pub fn retime(moves: &mut [Move], start: Vec2Fixed, start_time: Fixed, speed: Fixed) {
    let mut travelled = Fixed::ZERO;
    let mut previous = start;
    for waypoint in moves {
        travelled += previous.distance(waypoint.location);
        waypoint.time = start_time + travelled / speed;
        previous = waypoint.location;
    }
}

/// Battle instance of a troop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pawn {
    /// The troop this pawn fights for.
    pub troop: Troop,
    /// Current position.
    pub position: Vec2Fixed,
    /// Battlefield tile committed at the last round boundary.
    pub tile: Tile,
    /// Position at the current movement step.
    pub step: Vec2Fixed,
    /// Last position known to be free of collisions.
    pub failback: Vec2Fixed,
    /// Remaining player-requested waypoints.
    pub path: Vec<Move>,
    /// Trajectory executed during the last planned round.
    pub moves: Vec<Move>,
    /// Combat order.
    pub action: PawnAction,
}

impl Pawn {
    /// Create a pawn standing on the centre of `tile`.
    ///
    /// The movement simulator relies on the speed bound, so it is checked
    /// here once instead of on every step.
    pub fn new(troop: Troop, tile: Tile) -> Result<Self> {
        let speed = troop.unit.speed;
        if speed == 0 || speed > SPEED_LIMIT {
            return Err(GameError::SpeedOutOfRange {
                speed,
                limit: SPEED_LIMIT,
            });
        }

        let position = tile.center();
        Ok(Self {
            troop,
            position,
            tile,
            step: position,
            failback: position,
            path: Vec::new(),
            moves: vec![Move::anchor(position, Fixed::ZERO)],
            action: PawnAction::None,
        })
    }

    /// Owning player.
    #[must_use]
    pub fn owner(&self) -> PlayerId {
        self.troop.owner
    }

    /// Speed in cells per round.
    #[must_use]
    pub fn speed(&self) -> Fixed {
        Fixed::from_num(self.troop.unit.speed)
    }

    /// Whether any soldier of the troop is left.
    #[must_use]
    pub fn alive(&self) -> bool {
        self.troop.count > 0
    }

    /// Squares covered by the pawn at its current position.
    #[must_use]
    pub fn footprint(&self) -> Footprint {
        Footprint::of(self.position)
    }

    /// Where a newly queued leg starts and when: the last waypoint of the
    /// path, or the current position at the start of the round.
    #[must_use]
    pub fn path_end(&self) -> (Vec2Fixed, Fixed) {
        self.path
            .last()
            .map_or((self.position, Fixed::ZERO), |last| (last.location, last.time))
    }

    /// Re-derive path times assuming the pawn starts walking now.
    pub fn retime_path(&mut self) {
        let speed = self.speed();
        retime(&mut self.path, self.position, Fixed::ZERO, speed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn troop(speed: u32) -> Troop {
        Troop::new(Unit::new("spearmen", speed), 0, 20)
    }

    #[test]
    fn test_new_pawn_stands_on_tile_center() {
        let pawn = Pawn::new(troop(3), Tile::new(4, 6)).unwrap();
        assert_eq!(pawn.position, Vec2Fixed::new(Fixed::from_num(4.5), Fixed::from_num(6.5)));
        assert_eq!(pawn.failback, pawn.position);
        assert!(pawn.path.is_empty());
        assert!(pawn.alive());
    }

    #[test]
    fn test_speed_out_of_range() {
        assert!(matches!(
            Pawn::new(troop(0), Tile::new(0, 0)),
            Err(GameError::SpeedOutOfRange { speed: 0, .. })
        ));
        assert!(matches!(
            Pawn::new(troop(SPEED_LIMIT + 1), Tile::new(0, 0)),
            Err(GameError::SpeedOutOfRange { .. })
        ));
        assert!(Pawn::new(troop(SPEED_LIMIT), Tile::new(0, 0)).is_ok());
    }

    #[test]
    fn test_retime_uses_cumulative_distance() {
        let mut moves = vec![
            Move::manual(Vec2Fixed::from_int(3, 0), Fixed::ZERO),
            Move::manual(Vec2Fixed::from_int(3, 4), Fixed::ZERO),
        ];
        retime(&mut moves, Vec2Fixed::ZERO, Fixed::ONE, Fixed::from_num(2));
        assert_eq!(moves[0].time, Fixed::from_num(2.5));
        assert_eq!(moves[1].time, Fixed::from_num(4.5));
    }

    #[test]
    fn test_path_end_defaults_to_position() {
        let mut pawn = Pawn::new(troop(2), Tile::new(1, 1)).unwrap();
        assert_eq!(pawn.path_end(), (pawn.position, Fixed::ZERO));

        let waypoint = Move::manual(Vec2Fixed::from_int(5, 5), Fixed::from_num(1.5));
        pawn.path.push(waypoint);
        assert_eq!(pawn.path_end(), (waypoint.location, waypoint.time));
    }
}
