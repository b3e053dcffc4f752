//! Starting formations.
//!
//! Attackers enter from the battlefield edge facing the region they came
//! from and fill the rows nearest that edge, centre first. Defenders hold
//! the middle of the field, filling rings outwards.

use serde::{Deserialize, Serialize};

use crate::geometry::Tile;

/// Rows (or columns) an attacking formation may use.
pub const FORMATION_DEPTH: u32 = 4;

/// Largest ring around the centre a defending formation may use.
pub const DEFENSE_RADIUS: u32 = 6;

/// Battlefield edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Top edge, row 0.
    North,
    /// Right edge.
    East,
    /// Bottom edge.
    South,
    /// Left edge, column 0.
    West,
}

/// How a troop enters the battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Deployment {
    /// Arriving from a neighbouring region across the given edge.
    Attack(Direction),
    /// Holding the battlefield.
    Defend,
}

/// `0..length` ordered from the middle outwards, alternating sides.
fn center_out(length: u32) -> impl Iterator<Item = u32> {
    let center = length / 2;
    (0..length).map(move |i| {
        if i % 2 == 0 {
            center + i / 2
        } else {
            center - (i + 1) / 2
        }
    })
}

/// Formation slots for a deployment, in the order they are filled.
#[must_use]
pub fn formation(deployment: Deployment, width: u32, height: u32) -> Vec<Tile> {
    match deployment {
        Deployment::Attack(direction) => {
            let (depth_limit, lateral) = match direction {
                Direction::North | Direction::South => (height, width),
                Direction::East | Direction::West => (width, height),
            };

            (0..FORMATION_DEPTH.min(depth_limit))
                .flat_map(|depth| center_out(lateral).map(move |side| (depth, side)))
                .map(|(depth, side)| match direction {
                    Direction::North => Tile::new(side, depth),
                    Direction::South => Tile::new(side, height - 1 - depth),
                    Direction::West => Tile::new(depth, side),
                    Direction::East => Tile::new(width - 1 - depth, side),
                })
                .collect()
        }
        Deployment::Defend => {
            let (cx, cy) = (width / 2, height / 2);
            let mut slots: Vec<(u32, Tile)> = (0..height)
                .flat_map(|y| (0..width).map(move |x| Tile::new(x, y)))
                .map(|tile| (tile.x.abs_diff(cx).max(tile.y.abs_diff(cy)), tile))
                .filter(|&(ring, _)| ring <= DEFENSE_RADIUS)
                .collect();
            // Stable: row-major within a ring
            slots.sort_by_key(|&(ring, _)| ring);
            slots.into_iter().map(|(_, tile)| tile).collect()
        }
    }
}
