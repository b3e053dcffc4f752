//! Error types for the battle engine.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::geometry::Square;
use crate::math::Vec2Fixed;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all battle engine errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Allocation failed while building navigation data.
    #[error("Out of memory while building navigation data: {0}")]
    OutOfMemory(#[from] TryReserveError),

    /// The target cannot be reached from the origin.
    #[error("No path from {origin} to {target}")]
    MissingPath {
        /// Where the search started.
        origin: Vec2Fixed,
        /// Where the search was headed.
        target: Vec2Fixed,
    },

    /// Invalid player identifier.
    #[error("Invalid player ID: {0}")]
    InvalidPlayer(u8),

    /// Invalid pawn index.
    #[error("Invalid pawn index: {0}")]
    InvalidPawn(usize),

    /// Unit speed outside the range the movement simulator supports.
    #[error("Unit speed {speed} outside 1..={limit}")]
    SpeedOutOfRange {
        /// Offending speed.
        speed: u32,
        /// Largest supported speed.
        limit: u32,
    },

    /// Every formation slot for a troop is taken or impassable.
    #[error("No free formation slot for troop {troop}")]
    NoFormationSlot {
        /// Index of the troop that could not be placed.
        troop: usize,
    },

    /// More pawns than the occupancy table can hold touched one square.
    #[error("More than {limit} pawns overlap square {square}")]
    OverlapLimitExceeded {
        /// The overfull square.
        square: Square,
        /// Occupancy table capacity per square.
        limit: usize,
    },

    /// Data file parsing error.
    #[error("Failed to parse data '{source_name}': {message}")]
    DataParseError {
        /// Name of the data that failed to parse.
        source_name: String,
        /// Error message.
        message: String,
    },

    /// Invalid battle state.
    #[error("Invalid battle state: {0}")]
    InvalidState(String),
}
