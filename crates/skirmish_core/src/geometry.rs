//! Geometry primitives for the battlefield.
//!
//! Three coordinate systems are in play:
//!
//! - **Positions** ([`Vec2Fixed`]) are continuous, in cell units.
//! - **Tiles** ([`Tile`]) are whole battlefield cells.
//! - **Squares** ([`Square`]) are half-cells; a pawn covers a 2×2 block of
//!   them ([`Footprint`]) and collisions are detected per square.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed, HALF};

/// Radius of a pawn in cells.
pub const PAWN_RADIUS: Fixed = HALF;

/// A battlefield cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tile {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
}

impl Tile {
    /// Create a tile.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Centre of the tile, where pawns stand.
    #[must_use]
    pub fn center(self) -> Vec2Fixed {
        Vec2Fixed::new(
            Fixed::from_num(self.x) + HALF,
            Fixed::from_num(self.y) + HALF,
        )
    }

    /// The tile containing `position`, or `None` for negative coordinates.
    #[must_use]
    pub fn containing(position: Vec2Fixed) -> Option<Self> {
        if position.x < Fixed::ZERO || position.y < Fixed::ZERO {
            return None;
        }
        Some(Self::new(
            position.x.floor().to_num::<u32>(),
            position.y.floor().to_num::<u32>(),
        ))
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

/// A half-cell square of the occupancy grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Square {
    /// Column in half-cells.
    pub x: i32,
    /// Row in half-cells.
    pub y: i32,
}

impl Square {
    /// Create a square.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {}>", self.x, self.y)
    }
}

/// The 2×2 block of squares covered by a pawn, identified by its top-left
/// square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    /// Top-left square of the block.
    pub origin: Square,
}

impl Footprint {
    /// Footprint of a pawn centred at `position`.
    ///
    /// The top-left square is `floor(2p - 1/2)` per axis, which puts a pawn
    /// standing on a tile centre exactly on the tile's four squares.
    #[must_use]
    pub fn of(position: Vec2Fixed) -> Self {
        let axis = |value: Fixed| (value * 2 - HALF).floor().to_num::<i32>();
        Self {
            origin: Square::new(axis(position.x), axis(position.y)),
        }
    }

    /// The four covered squares in row-major order.
    #[must_use]
    pub fn squares(self) -> [Square; 4] {
        let Square { x, y } = self.origin;
        [
            Square::new(x, y),
            Square::new(x + 1, y),
            Square::new(x, y + 1),
            Square::new(x + 1, y + 1),
        ]
    }

    /// Whether two footprints share at least one square.
    #[must_use]
    pub fn overlaps(self, other: Self) -> bool {
        (self.origin.x - other.origin.x).abs() <= 1 && (self.origin.y - other.origin.y).abs() <= 1
    }
}

/// An axis-aligned rectangular obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Obstacle {
    /// Smallest x.
    #[serde(with = "fixed_serde")]
    pub left: Fixed,
    /// Largest x.
    #[serde(with = "fixed_serde")]
    pub right: Fixed,
    /// Smallest y.
    #[serde(with = "fixed_serde")]
    pub top: Fixed,
    /// Largest y.
    #[serde(with = "fixed_serde")]
    pub bottom: Fixed,
}

impl Obstacle {
    /// Create an obstacle from its edges.
    #[must_use]
    pub const fn new(left: Fixed, right: Fixed, top: Fixed, bottom: Fixed) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    /// Corners in the order top-left, top-right, bottom-left, bottom-right.
    #[must_use]
    pub fn corners(&self) -> [Vec2Fixed; 4] {
        [
            Vec2Fixed::new(self.left, self.top),
            Vec2Fixed::new(self.right, self.top),
            Vec2Fixed::new(self.left, self.bottom),
            Vec2Fixed::new(self.right, self.bottom),
        ]
    }

    /// Whether `position` lies inside or on the rectangle.
    #[must_use]
    pub fn contains(&self, position: Vec2Fixed) -> bool {
        position.x >= self.left
            && position.x <= self.right
            && position.y >= self.top
            && position.y <= self.bottom
    }

    /// Whether the segment `origin`→`target` crosses or touches the rectangle.
    ///
    /// The segment misses when its bounding box misses the rectangle or when
    /// all four corners lie strictly on one side of the segment's line.
    #[must_use]
    pub fn blocks(&self, origin: Vec2Fixed, target: Vec2Fixed) -> bool {
        if origin.x.max(target.x) < self.left
            || origin.x.min(target.x) > self.right
            || origin.y.max(target.y) < self.top
            || origin.y.min(target.y) > self.bottom
        {
            return false;
        }

        let direction = target - origin;
        let mut left_of = 0;
        let mut right_of = 0;
        for corner in self.corners() {
            let side = direction.cross(corner - origin);
            if side > Fixed::ZERO {
                left_of += 1;
            } else if side < Fixed::ZERO {
                right_of += 1;
            }
        }

        left_of != 4 && right_of != 4
    }
}

/// Whether a straight line between two positions avoids every obstacle.
///
/// Used for routing and by the combat layer for line of sight.
#[must_use]
pub fn path_visible(origin: Vec2Fixed, target: Vec2Fixed, obstacles: &[Obstacle]) -> bool {
    !obstacles
        .iter()
        .any(|obstacle| obstacle.blocks(origin, target))
}

/// Whether the segment `origin`→`target` passes strictly closer than `radius`
/// to `center`.
#[must_use]
pub fn segment_hits_circle(
    origin: Vec2Fixed,
    target: Vec2Fixed,
    center: Vec2Fixed,
    radius: Fixed,
) -> bool {
    let direction = target - origin;
    let length_squared = direction.dot(direction);

    let closest = if length_squared == Fixed::ZERO {
        origin
    } else {
        let t = (direction.dot(center - origin) / length_squared).clamp(Fixed::ZERO, Fixed::ONE);
        origin.lerp(target, t)
    };

    closest.distance_squared(center) < radius * radius
}
