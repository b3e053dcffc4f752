//! Data structures for battle scenarios.
//!
//! This module contains pure data structures that describe a battle set-up:
//! the battlefield, the players, unit types, troops and their opening
//! orders. All structs are designed to be deserialized from RON files.
//!
//! **Note:** This module contains no IO - it only defines data types.
//! File loading is handled by `skirmish_tools`.

mod scenario;

pub use scenario::{BattleScenario, BlockageData, TroopData};
