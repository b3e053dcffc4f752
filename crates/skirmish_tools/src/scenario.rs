//! Scenario file loading.
//!
//! Battle scenarios are RON files holding a
//! [`BattleScenario`](skirmish_core::data::BattleScenario). Loading reads,
//! parses and validates a file; deploying it is left to the caller.

use std::fs;
use std::path::{Path, PathBuf};

use skirmish_core::data::BattleScenario;
use thiserror::Error;

/// Errors that can occur when loading scenarios.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// Failed to read a file or directory.
    #[error("Failed to read '{path}': {source}")]
    IoError {
        /// Path that could not be read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a RON file.
    #[error("Failed to parse RON file '{path}': {source}")]
    ParseError {
        /// Path to the file.
        path: String,
        /// Underlying parse error.
        #[source]
        source: ron::error::SpannedError,
    },

    /// The scenario parsed but is inconsistent.
    #[error("Validation failed for scenario '{scenario}': {errors:?}")]
    ValidationError {
        /// Scenario that failed validation.
        scenario: String,
        /// Every problem found.
        errors: Vec<String>,
    },
}

/// Result type for scenario loading.
pub type ScenarioResult<T> = Result<T, ScenarioError>;

/// Load and validate a scenario from a RON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid RON, or
/// describes an inconsistent battle.
pub fn load_scenario(path: &Path) -> ScenarioResult<BattleScenario> {
    let content = fs::read_to_string(path).map_err(|source| ScenarioError::IoError {
        path: path.display().to_string(),
        source,
    })?;

    let scenario: BattleScenario =
        ron::from_str(&content).map_err(|source| ScenarioError::ParseError {
            path: path.display().to_string(),
            source,
        })?;

    let errors = scenario.validate();
    if !errors.is_empty() {
        return Err(ScenarioError::ValidationError {
            scenario: scenario.name,
            errors,
        });
    }

    tracing::info!(
        path = %path.display(),
        scenario = %scenario.name,
        troops = scenario.troops.len(),
        "Loaded scenario file"
    );
    Ok(scenario)
}

/// Scenario files to process for `path`: the file itself, or every `.ron`
/// file in the directory, sorted by name.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub fn scenario_files(path: &Path) -> ScenarioResult<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let io_error = |source: std::io::Error| ScenarioError::IoError {
        path: path.display().to_string(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(path).map_err(io_error)? {
        let file = entry.map_err(io_error)?.path();
        if file.extension().is_some_and(|ext| ext == "ron") {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}
