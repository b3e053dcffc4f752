//! # Skirmish Core
//!
//! Deterministic battle engine for a turn-based strategy game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! Given pawns with speeds and standing orders on a grid battlefield, it
//! finds shortest obstacle-avoiding routes and moves every pawn
//! simultaneously for one round, resolving every case where two pawns would
//! share the same space.
//!
//! ## Crate Structure
//!
//! - [`battlefield`] - Battlefield grid and obstacle extraction
//! - [`graph`] - Visibility graph over obstacle corners
//! - [`pathfinding`] - Dijkstra search and move orders
//! - [`movement`] - Simultaneous movement and collision resolution
//! - [`battle`] - Deployment, rounds and the end condition
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod alliance;
pub mod battle;
pub mod battlefield;
pub mod data;
pub mod error;
pub mod formation;
pub mod geometry;
pub mod graph;
pub mod math;
pub mod movement;
pub mod pathfinding;
pub mod pawn;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::alliance::{AllianceId, Alliances, Player, PlayerId};
    pub use crate::battle::{Battle, Contingent, LineOfFire};
    pub use crate::battlefield::{Battlefield, Blockage, BATTLEFIELD_HEIGHT, BATTLEFIELD_WIDTH};
    pub use crate::data::BattleScenario;
    pub use crate::error::{GameError, Result};
    pub use crate::formation::{Deployment, Direction};
    pub use crate::geometry::{path_visible, Footprint, Obstacle, Square, Tile};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::movement::{
        movement_location, movement_perform, movement_plan, MovementReport, MOVEMENT_STEPS,
        OVERLAP_LIMIT,
    };
    pub use crate::pathfinding::{
        movement_queue, movement_reachable, movement_set, movement_stay, path_distance,
        path_find, reachable, Navigation, Reachability,
    };
    pub use crate::pawn::{Move, MoveKind, Pawn, PawnAction, Troop, Unit, SPEED_LIMIT};
}
