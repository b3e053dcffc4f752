//! # Skirmish Development Tools
//!
//! Command-line tools for development:
//! - Scenario loading and validation
//! - Headless battle runner with JSON reports
//! - ASCII battlefield viewer
//! - Log filtering honouring `RUST_LOG`

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod logging;
pub mod render;
pub mod report;
pub mod scenario;

pub use logging::log_filter;
pub use render::{render_battle, render_reachability, AsciiConfig};
pub use report::{run_scenario, BattleReport, PawnSummary, RoundSummary};
pub use scenario::{load_scenario, scenario_files, ScenarioError, ScenarioResult};
