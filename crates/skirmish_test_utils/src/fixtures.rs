//! Test fixtures and helpers.
//!
//! Pre-built battlefields, pawns and battles
//! for consistent testing.

use fixed::types::I32F32;
use skirmish_core::prelude::*;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a position from float coordinates (for tests only).
#[must_use]
pub fn pos(x: f64, y: f64) -> Vec2Fixed {
    Vec2Fixed::new(fixed_f(x), fixed_f(y))
}

/// Three players: "red" and "red ally" in alliance 0, "blue" in alliance 1.
#[must_use]
pub fn test_alliances() -> Alliances {
    Alliances::new(vec![
        Player::new("red", 0),
        Player::new("red ally", 0),
        Player::new("blue", 1),
    ])
}

/// A troop of 30 soldiers of a unit with the given speed.
#[must_use]
pub fn test_troop(owner: PlayerId, speed: u32) -> Troop {
    Troop::new(Unit::new("pikemen", speed), owner, 30)
}

/// A pawn on `tile` with a manual path through `path`, timed from its
/// current position.
///
/// # Panics
///
/// Panics if `speed` is outside `1..=SPEED_LIMIT`.
#[must_use]
pub fn test_pawn(owner: PlayerId, tile: Tile, speed: u32, path: &[Vec2Fixed]) -> Pawn {
    let mut pawn = Pawn::new(test_troop(owner, speed), tile).expect("valid test speed");
    pawn.path = path
        .iter()
        .map(|&location| Move::manual(location, Fixed::ZERO))
        .collect();
    pawn.retime_path();
    pawn
}

/// Surround `center` with impassable terrain on all eight neighbours.
pub fn enclose(battlefield: &mut Battlefield, center: Tile) {
    for dy in 0..3 {
        for dx in 0..3 {
            if dx == 1 && dy == 1 {
                continue;
            }
            let x = (center.x + dx).checked_sub(1);
            let y = (center.y + dy).checked_sub(1);
            if let (Some(x), Some(y)) = (x, y) {
                battlefield.set(Tile::new(x, y), Blockage::Terrain);
            }
        }
    }
}

/// Fill row `y` with walls owned by `owner`, leaving a gate at `gate_x`.
pub fn gated_wall(battlefield: &mut Battlefield, y: u32, owner: PlayerId, gate_x: u32) {
    for x in 0..battlefield.width() {
        let blockage = if x == gate_x {
            Blockage::Gate {
                owner,
                strength: 50,
            }
        } else {
            Blockage::Wall {
                owner,
                strength: 100,
            }
        };
        battlefield.set(Tile::new(x, y), blockage);
    }
}

/// A two-alliance battle on an open field with standing orders.
///
/// Red (players 0 and 1) attacks from the north with cavalry and
/// infantry; blue (player 2) defends the centre with archers and militia.
/// Every attacker is ordered towards the defenders.
///
/// # Panics
///
/// Panics if the fixed set-up cannot be deployed.
#[must_use]
pub fn skirmish_battle() -> Battle {
    let contingents = vec![
        Contingent::new(
            Troop::new(Unit::new("cavalry", 4), 0, 20),
            Deployment::Attack(Direction::North),
        ),
        Contingent::new(
            Troop::new(Unit::new("infantry", 2), 1, 40),
            Deployment::Attack(Direction::North),
        ),
        Contingent::new(
            Troop::new(Unit::new("archers", 2).ranged(), 2, 30),
            Deployment::Defend,
        ),
        Contingent::new(
            Troop::new(Unit::new("militia", 1), 2, 50),
            Deployment::Defend,
        ),
        Contingent::new(
            Troop::new(Unit::new("cavalry", 4), 0, 20),
            Deployment::Attack(Direction::North),
        ),
    ];
    let mut battle = Battle::new(Battlefield::default(), test_alliances(), contingents, 1)
        .expect("skirmish deploys");

    for (pawn, target) in [(0, Tile::new(12, 9)), (1, Tile::new(10, 10)), (2, Tile::new(14, 9))] {
        battle.order_move(pawn, target).expect("open field is routable");
    }
    battle
        .order_queue(0, Tile::new(6, 12))
        .expect("open field is routable");
    battle
}

/// Parse a battle scenario from RON text.
///
/// # Panics
///
/// Panics if the text is not a valid scenario.
#[must_use]
pub fn parse_scenario(text: &str) -> BattleScenario {
    ron::from_str(text).expect("valid scenario RON")
}
