//! ASCII battlefield viewer.
//!
//! Renders a battle as a character grid for quick terminal review:
//!
//! ```text
//! . open   # terrain   = wall   + gate
//! 0-9 a-z  live pawns by index   x  dead pawn
//! ```

use std::fmt::Write;

use skirmish_core::prelude::*;

/// ANSI color codes.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";

    pub const RED: &str = "\x1b[31m";
    pub const BLUE: &str = "\x1b[34m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const GREEN: &str = "\x1b[32m";
}

/// ASCII rendering configuration.
#[derive(Debug, Clone)]
pub struct AsciiConfig {
    /// Use colored output (ANSI).
    pub use_color: bool,
    /// List the pawns under the grid.
    pub show_legend: bool,
}

impl Default for AsciiConfig {
    fn default() -> Self {
        Self {
            use_color: true,
            show_legend: true,
        }
    }
}

fn alliance_color(alliance: AllianceId) -> &'static str {
    match alliance % 4 {
        0 => colors::RED,
        1 => colors::BLUE,
        2 => colors::YELLOW,
        _ => colors::GREEN,
    }
}

fn blockage_char(blockage: Blockage) -> char {
    match blockage {
        Blockage::None => '.',
        Blockage::Terrain => '#',
        Blockage::Wall { .. } => '=',
        Blockage::Gate { .. } => '+',
    }
}

/// Label of a pawn on the grid.
fn pawn_char(index: usize) -> char {
    match index {
        0..=9 => char::from(b'0' + index as u8),
        10..=35 => char::from(b'a' + (index - 10) as u8),
        _ => '*',
    }
}

/// A grid of `(char, color)` cells, terrain only.
fn terrain_grid(battlefield: &Battlefield) -> Vec<Vec<(char, &'static str)>> {
    (0..battlefield.height())
        .map(|y| {
            (0..battlefield.width())
                .map(|x| {
                    let blockage = battlefield.get(Tile::new(x, y)).unwrap_or_default();
                    (blockage_char(blockage), "")
                })
                .collect()
        })
        .collect()
}

fn draw(grid: &[Vec<(char, &'static str)>], use_color: bool, output: &mut String) {
    for row in grid {
        for &(ch, color) in row {
            if use_color && !color.is_empty() {
                let _ = write!(output, "{color}{ch}{}", colors::RESET);
            } else {
                output.push(ch);
            }
        }
        output.push('\n');
    }
}

/// Render the battlefield with every pawn on its tile.
#[must_use]
pub fn render_battle(battle: &Battle, config: &AsciiConfig) -> String {
    let mut grid = terrain_grid(battle.battlefield());
    let alliance = |pawn: &Pawn| battle.alliances().alliance_of(pawn.owner()).unwrap_or(0);

    // Dead first so the living are drawn on top
    let (dead, alive): (Vec<_>, Vec<_>) =
        battle.pawns().iter().enumerate().partition(|(_, pawn)| !pawn.alive());
    for (index, pawn) in dead.into_iter().chain(alive) {
        let Some(cell) = grid
            .get_mut(pawn.tile.y as usize)
            .and_then(|row| row.get_mut(pawn.tile.x as usize))
        else {
            continue;
        };
        *cell = if pawn.alive() {
            (pawn_char(index), alliance_color(alliance(pawn)))
        } else {
            ('x', colors::DIM)
        };
    }

    let mut output = String::new();
    let _ = writeln!(output, "Round {}", battle.round_number());
    draw(&grid, config.use_color, &mut output);

    if config.show_legend {
        for (index, pawn) in battle.pawns().iter().enumerate() {
            let _ = writeln!(
                output,
                "{} {:<12} player {} (alliance {})  {}  {} soldiers, {} waypoints",
                pawn_char(index),
                pawn.troop.unit.name,
                pawn.owner(),
                alliance(pawn),
                pawn.tile,
                pawn.troop.count,
                pawn.path.len(),
            );
        }
        if let Some(winner) = battle.battle_end() {
            let _ = writeln!(output, "Alliance {winner} holds the field");
        }
    }

    output
}

/// Render where a pawn standing on `origin` could go.
///
/// `@` marks the origin, `*` tiles within `range`, `:` tiles reachable
/// later and `-` open tiles with no route at all.
#[must_use]
pub fn render_reachability(
    battlefield: &Battlefield,
    reach: &Reachability,
    origin: Tile,
    range: Fixed,
) -> String {
    let mut grid = terrain_grid(battlefield);
    for (y, row) in grid.iter_mut().enumerate() {
        for (x, cell) in row.iter_mut().enumerate() {
            let tile = Tile::new(x as u32, y as u32);
            if cell.0 != '.' {
                continue;
            }
            *cell = match reach.get(tile) {
                _ if tile == origin => ('@', colors::GREEN),
                Some(distance) if distance <= range => ('*', colors::GREEN),
                Some(_) => (':', colors::YELLOW),
                None => ('-', colors::DIM),
            };
        }
    }

    let mut output = String::new();
    draw(&grid, false, &mut output);
    output
}
