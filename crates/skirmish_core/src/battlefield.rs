//! The battlefield grid and obstacle extraction.
//!
//! Each cell is either open ground or blocked by terrain, a wall or a gate.
//! Whether a cell blocks movement depends on who is looking: a gate lets its
//! owner's alliance through. [`Battlefield::obstacles`] turns the cells one
//! player cannot cross into a list of rectangles for line-of-sight routing.

use serde::{Deserialize, Serialize};

use crate::alliance::{Alliances, PlayerId};
use crate::error::Result;
use crate::geometry::{Obstacle, Tile};
use crate::math::Fixed;

/// Battlefield width in tiles.
pub const BATTLEFIELD_WIDTH: u32 = 25;

/// Battlefield height in tiles.
pub const BATTLEFIELD_HEIGHT: u32 = 25;

/// Inset applied to the open sides of an extracted obstacle.
///
/// Lets a segment that merely grazes a wall pass, so pawns may walk right
/// along it and round its corners. Sides that touch another blocked tile
/// are left flush so neighbouring rectangles seal against each other.
pub const WALL_INSET: Fixed = Fixed::from_bits(1 << 28);

/// What occupies a battlefield cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Blockage {
    /// Open ground.
    #[default]
    None,
    /// Impassable terrain (rock, water).
    Terrain,
    /// Fortification wall.
    Wall {
        /// Player who built the wall.
        owner: PlayerId,
        /// Hit points left, consumed by the combat layer.
        strength: u32,
    },
    /// Gate in a fortification; open to its owner's alliance.
    Gate {
        /// Player who built the gate.
        owner: PlayerId,
        /// Hit points left, consumed by the combat layer.
        strength: u32,
    },
}

impl Blockage {
    /// Whether pawns of `observer` may enter a cell with this blockage.
    #[must_use]
    pub fn passable_for(self, observer: PlayerId, alliances: &Alliances) -> bool {
        match self {
            Self::None => true,
            Self::Terrain | Self::Wall { .. } => false,
            Self::Gate { owner, .. } => alliances.allies(owner, observer),
        }
    }
}

/// Battlefield grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Battlefield {
    /// Grid width in tiles.
    width: u32,
    /// Grid height in tiles.
    height: u32,
    /// Cell data stored in row-major order.
    cells: Vec<Blockage>,
}

impl Battlefield {
    /// Create a battlefield with every cell open.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width > 0, "Battlefield width must be positive");
        assert!(height > 0, "Battlefield height must be positive");

        Self {
            width,
            height,
            cells: vec![Blockage::None; (width as usize) * (height as usize)],
        }
    }

    /// Grid width in tiles.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in tiles.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, tile: Tile) -> usize {
        (tile.y as usize) * (self.width as usize) + (tile.x as usize)
    }

    /// Check if a tile is within grid bounds.
    #[must_use]
    pub fn in_bounds(&self, tile: Tile) -> bool {
        tile.x < self.width && tile.y < self.height
    }

    /// Blockage at a tile. Returns `None` if out of bounds.
    #[must_use]
    pub fn get(&self, tile: Tile) -> Option<Blockage> {
        self.in_bounds(tile).then(|| self.cells[self.index(tile)])
    }

    /// Set the blockage at a tile. Returns `false` if out of bounds.
    pub fn set(&mut self, tile: Tile, blockage: Blockage) -> bool {
        if self.in_bounds(tile) {
            let index = self.index(tile);
            self.cells[index] = blockage;
            true
        } else {
            false
        }
    }

    /// Whether `observer`'s pawns may enter a tile. Out of bounds is never
    /// passable.
    #[must_use]
    pub fn passable(&self, tile: Tile, observer: PlayerId, alliances: &Alliances) -> bool {
        self.get(tile)
            .is_some_and(|blockage| blockage.passable_for(observer, alliances))
    }

    /// All tiles in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Tile::new(x, y)))
    }

    /// Merge the tiles `observer` cannot cross into non-overlapping
    /// rectangles.
    ///
    /// Horizontal runs of two or more tiles are merged first; a run with the
    /// same extent as one in the row above extends that rectangle downwards.
    /// Tiles left over are merged into vertical runs per column. Each side
    /// is shrunk by [`WALL_INSET`] only when every tile across it is open
    /// or off the field.
    pub fn obstacles(&self, observer: PlayerId, alliances: &Alliances) -> Result<Vec<Obstacle>> {
        struct OpenRun {
            left: u32,
            right: u32,
            top: u32,
        }

        let blocked = |x: u32, y: u32| !self.passable(Tile::new(x, y), observer, alliances);
        let seal = |left: u32, right: u32, top: u32, bottom: u32| {
            let open_left = left == 0 || (top..bottom).all(|y| !blocked(left - 1, y));
            let open_right = right == self.width || (top..bottom).all(|y| !blocked(right, y));
            let open_top = top == 0 || (left..right).all(|x| !blocked(x, top - 1));
            let open_bottom = bottom == self.height || (left..right).all(|x| !blocked(x, bottom));
            let margin = |open: bool| if open { WALL_INSET } else { Fixed::ZERO };
            Obstacle::new(
                Fixed::from_num(left) + margin(open_left),
                Fixed::from_num(right) - margin(open_right),
                Fixed::from_num(top) + margin(open_top),
                Fixed::from_num(bottom) - margin(open_bottom),
            )
        };

        let mut obstacles = Vec::new();
        obstacles.try_reserve(self.cells.len() / 2)?;

        let mut in_run = vec![false; self.cells.len()];
        let mut open: Vec<OpenRun> = Vec::new();

        for y in 0..self.height {
            let mut continued = Vec::new();

            let mut x = 0;
            while x < self.width {
                if !blocked(x, y) {
                    x += 1;
                    continue;
                }
                let left = x;
                while x < self.width && blocked(x, y) {
                    x += 1;
                }
                if x - left < 2 {
                    continue;
                }

                for covered in left..x {
                    in_run[self.index(Tile::new(covered, y))] = true;
                }
                match open.iter().position(|run| run.left == left && run.right == x) {
                    Some(index) => continued.push(open.remove(index)),
                    None => continued.push(OpenRun {
                        left,
                        right: x,
                        top: y,
                    }),
                }
            }

            for run in open.drain(..) {
                obstacles.push(seal(run.left, run.right, run.top, y));
            }
            open = continued;
        }
        for run in open {
            obstacles.push(seal(run.left, run.right, run.top, self.height));
        }

        for x in 0..self.width {
            let mut y = 0;
            while y < self.height {
                let lone = |y: u32| blocked(x, y) && !in_run[self.index(Tile::new(x, y))];
                if !lone(y) {
                    y += 1;
                    continue;
                }
                let top = y;
                while y < self.height && lone(y) {
                    y += 1;
                }
                obstacles.push(seal(x, x + 1, top, y));
            }
        }

        Ok(obstacles)
    }
}

impl Default for Battlefield {
    /// Create an open battlefield of the standard size.
    fn default() -> Self {
        Self::new(BATTLEFIELD_WIDTH, BATTLEFIELD_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alliance::Player;
    use crate::geometry::path_visible;
    use crate::math::Vec2Fixed;

    /// Tiles `[left, right) × [top, bottom)` with every side inset.
    fn inset(left: u32, right: u32, top: u32, bottom: u32) -> Obstacle {
        Obstacle::new(
            Fixed::from_num(left) + WALL_INSET,
            Fixed::from_num(right) - WALL_INSET,
            Fixed::from_num(top) + WALL_INSET,
            Fixed::from_num(bottom) - WALL_INSET,
        )
    }

    fn pos(x: f64, y: f64) -> Vec2Fixed {
        Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Terrain outline of the square `[min, max]²`.
    fn sealed_box(field: &mut Battlefield, min: u32, max: u32) {
        for x in min..=max {
            field.set(Tile::new(x, min), Blockage::Terrain);
            field.set(Tile::new(x, max), Blockage::Terrain);
        }
        for y in min + 1..max {
            field.set(Tile::new(min, y), Blockage::Terrain);
            field.set(Tile::new(max, y), Blockage::Terrain);
        }
    }

    /// Every edge shared by two blocked tiles lies inside some obstacle.
    fn assert_seams_covered(field: &Battlefield, obstacles: &[Obstacle]) {
        let table = alliances();
        let blocked = |x: u32, y: u32| !field.passable(Tile::new(x, y), 0, &table);
        let covered = |point: Vec2Fixed| obstacles.iter().any(|o| o.contains(point));

        for tile in field.tiles() {
            if !blocked(tile.x, tile.y) {
                continue;
            }
            let (x, y) = (f64::from(tile.x), f64::from(tile.y));
            if tile.x + 1 < field.width() && blocked(tile.x + 1, tile.y) {
                assert!(covered(pos(x + 1.0, y + 0.5)), "seam right of {tile}");
            }
            if tile.y + 1 < field.height() && blocked(tile.x, tile.y + 1) {
                assert!(covered(pos(x + 0.5, y + 1.0)), "seam below {tile}");
            }
        }
    }

    fn alliances() -> Alliances {
        Alliances::new(vec![Player::new("red", 0), Player::new("blue", 1)])
    }

    fn wall() -> Blockage {
        Blockage::Wall {
            owner: 1,
            strength: 100,
        }
    }

    #[test]
    fn test_gate_passable_only_for_owner_alliance() {
        let gate = Blockage::Gate {
            owner: 1,
            strength: 50,
        };
        let table = alliances();
        assert!(gate.passable_for(1, &table));
        assert!(!gate.passable_for(0, &table));
        assert!(!wall().passable_for(1, &table));
        assert!(!Blockage::Terrain.passable_for(0, &table));
        assert!(Blockage::None.passable_for(0, &table));
    }

    #[test]
    fn test_set_get_bounds() {
        let mut field = Battlefield::default();
        assert_eq!(field.width(), BATTLEFIELD_WIDTH);
        assert!(field.set(Tile::new(3, 4), Blockage::Terrain));
        assert_eq!(field.get(Tile::new(3, 4)), Some(Blockage::Terrain));
        assert!(!field.set(Tile::new(25, 0), Blockage::Terrain));
        assert_eq!(field.get(Tile::new(0, 25)), None);
        assert!(!field.passable(Tile::new(0, 25), 0, &alliances()));
    }

    #[test]
    fn test_open_field_has_no_obstacles() {
        let field = Battlefield::default();
        assert!(field.obstacles(0, &alliances()).unwrap().is_empty());
    }

    #[test]
    fn test_horizontal_run_becomes_one_rectangle() {
        let mut field = Battlefield::default();
        for x in 3..8 {
            field.set(Tile::new(x, 10), wall());
        }

        let obstacles = field.obstacles(0, &alliances()).unwrap();
        assert_eq!(obstacles, vec![inset(3, 8, 10, 11)]);
    }

    #[test]
    fn test_solid_block_merges_across_rows() {
        let mut field = Battlefield::default();
        for y in 4..7 {
            for x in 2..5 {
                field.set(Tile::new(x, y), Blockage::Terrain);
            }
        }

        let obstacles = field.obstacles(0, &alliances()).unwrap();
        assert_eq!(obstacles, vec![inset(2, 5, 4, 7)]);
    }

    #[test]
    fn test_single_column_becomes_vertical_rectangle() {
        let mut field = Battlefield::default();
        for y in 3..9 {
            field.set(Tile::new(6, y), Blockage::Terrain);
        }

        let obstacles = field.obstacles(0, &alliances()).unwrap();
        assert_eq!(obstacles, vec![inset(6, 7, 3, 9)]);
    }

    #[test]
    fn test_ring_covers_every_blocked_tile_once() {
        let mut field = Battlefield::default();
        for x in 9..12 {
            field.set(Tile::new(x, 9), Blockage::Terrain);
            field.set(Tile::new(x, 11), Blockage::Terrain);
        }
        field.set(Tile::new(9, 10), Blockage::Terrain);
        field.set(Tile::new(11, 10), Blockage::Terrain);

        let obstacles = field.obstacles(0, &alliances()).unwrap();
        assert_eq!(obstacles.len(), 4);

        for tile in field.tiles() {
            let covering = obstacles
                .iter()
                .filter(|o| o.contains(tile.center()))
                .count();
            let expected = usize::from(field.get(tile) != Some(Blockage::None));
            assert_eq!(covering, expected, "tile {tile}");
        }
    }

    #[test]
    fn test_gate_is_obstacle_only_for_enemies() {
        let mut field = Battlefield::default();
        field.set(
            Tile::new(5, 5),
            Blockage::Gate {
                owner: 1,
                strength: 40,
            },
        );

        let table = alliances();
        assert!(field.obstacles(1, &table).unwrap().is_empty());
        assert_eq!(field.obstacles(0, &table).unwrap(), vec![inset(5, 6, 5, 6)]);
    }

    #[test]
    fn test_box_corners_are_sealed() {
        let mut field = Battlefield::default();
        sealed_box(&mut field, 5, 15);

        let obstacles = field.obstacles(0, &alliances()).unwrap();
        assert_seams_covered(&field, &obstacles);

        // Shallow line through the joint of the top row and the left column
        assert!(!path_visible(pos(0.5, 5.5), pos(10.5, 6.5), &obstacles));
        assert!(!path_visible(pos(0.5, 14.5), pos(10.5, 13.5), &obstacles));
        assert!(!path_visible(pos(20.5, 5.5), pos(10.5, 6.5), &obstacles));
        // Outside the box the margin still lets pawns skim the wall
        assert!(path_visible(pos(0.5, 4.5), pos(20.5, 4.5), &obstacles));
        assert!(path_visible(pos(4.5, 0.5), pos(4.5, 20.5), &obstacles));
    }

    #[test]
    fn test_stepped_rows_seal_against_each_other() {
        let mut field = Battlefield::default();
        for x in 5..16 {
            field.set(Tile::new(x, 5), Blockage::Terrain);
        }
        for x in 3..10 {
            field.set(Tile::new(x, 6), Blockage::Terrain);
        }

        let obstacles = field.obstacles(0, &alliances()).unwrap();
        assert_eq!(obstacles.len(), 2);
        assert_seams_covered(&field, &obstacles);
        assert_eq!(obstacles[0].bottom, Fixed::from_num(6));
        assert_eq!(obstacles[1].top, Fixed::from_num(6));
        assert!(!path_visible(pos(2.5, 5.5), pos(12.5, 6.5), &obstacles));
    }
}
