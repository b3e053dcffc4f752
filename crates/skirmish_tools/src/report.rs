//! Headless scenario runs and their reports.

use serde::{Deserialize, Serialize};
use skirmish_core::prelude::*;

/// What happened in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Round number, starting at 1.
    pub round: u32,
    /// Conflicts resolved during the round.
    pub resolutions: usize,
    /// Most conflicts resolved within a single sub-step.
    pub max_step_resolutions: usize,
    /// Pawns stopped by an enemy.
    pub stopped: Vec<usize>,
    /// Pawns that waited for an ally.
    pub waiting: Vec<usize>,
}

impl From<(u32, &MovementReport)> for RoundSummary {
    fn from((round, report): (u32, &MovementReport)) -> Self {
        Self {
            round,
            resolutions: report.resolutions,
            max_step_resolutions: report.max_step_resolutions,
            stopped: report.stopped.clone(),
            waiting: report.waiting.clone(),
        }
    }
}

/// Where a pawn ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PawnSummary {
    /// Pawn index.
    pub index: usize,
    /// Unit type name.
    pub unit: String,
    /// Owning player.
    pub owner: PlayerId,
    /// Whether the troop still has soldiers.
    pub alive: bool,
    /// Tile at the end of the run.
    pub tile: Tile,
    /// Waypoints still queued.
    pub waypoints: usize,
}

/// Outcome of a headless scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleReport {
    /// Scenario name.
    pub scenario: String,
    /// One entry per round played.
    pub rounds: Vec<RoundSummary>,
    /// Winning alliance, if the battle is over.
    pub winner: Option<AllianceId>,
    /// Final state hash, for comparing runs.
    pub state_hash: u64,
    /// Final pawn positions.
    pub pawns: Vec<PawnSummary>,
}

impl BattleReport {
    fn finish(scenario: &str, rounds: Vec<RoundSummary>, battle: &Battle) -> Self {
        let pawns = battle
            .pawns()
            .iter()
            .enumerate()
            .map(|(index, pawn)| PawnSummary {
                index,
                unit: pawn.troop.unit.name.clone(),
                owner: pawn.owner(),
                alive: pawn.alive(),
                tile: pawn.tile,
                waypoints: pawn.path.len(),
            })
            .collect();

        Self {
            scenario: scenario.to_string(),
            rounds,
            winner: battle.battle_end(),
            state_hash: battle.state_hash(),
            pawns,
        }
    }

    /// Conflicts resolved over the whole run.
    #[must_use]
    pub fn total_resolutions(&self) -> usize {
        self.rounds.iter().map(|round| round.resolutions).sum()
    }
}

/// Deploy a scenario and play it round by round.
///
/// Plays `rounds` rounds, or the scenario's own count if `None`, stopping
/// early once the battle has a winner. `on_round` sees the battle after
/// every round.
///
/// # Errors
///
/// Returns any error raised while deploying the scenario or planning a
/// round.
pub fn run_scenario(
    scenario: &BattleScenario,
    rounds: Option<u32>,
    mut on_round: impl FnMut(&Battle, &RoundSummary),
) -> Result<(Battle, BattleReport)> {
    let mut battle = scenario.build()?;
    let limit = rounds.unwrap_or(scenario.rounds);

    let mut summaries = Vec::new();
    while battle.round_number() < limit && battle.battle_end().is_none() {
        let report = battle.round()?;
        let summary = RoundSummary::from((battle.round_number(), &report));
        on_round(&battle, &summary);
        summaries.push(summary);
    }

    let report = BattleReport::finish(&scenario.name, summaries, &battle);
    tracing::info!(
        scenario = %scenario.name,
        rounds = report.rounds.len(),
        resolutions = report.total_resolutions(),
        winner = ?report.winner,
        "Scenario finished"
    );
    Ok((battle, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_test_utils::fixtures::parse_scenario;

    const PASS: &str = r#"
        BattleScenario(
            name: "Pass",
            players: [
                Player(name: "Red", alliance: 0),
                Player(name: "Blue", alliance: 1),
            ],
            defender: 1,
            units: [Unit(name: "scouts", speed: 8), Unit(name: "guards", speed: 1)],
            troops: [
                TroopData(unit: "scouts", owner: 0, count: 5, deployment: Attack(South),
                          orders: [(x: 12, y: 16)]),
                TroopData(unit: "guards", owner: 1, count: 12, deployment: Defend),
            ],
            rounds: 3,
        )
    "#;

    #[test]
    fn test_run_plays_scenario_rounds() {
        let scenario = parse_scenario(PASS);
        let mut seen = Vec::new();
        let (battle, report) =
            run_scenario(&scenario, None, |_, round| seen.push(round.round)).unwrap();

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(report.rounds.len(), 3);
        assert_eq!(report.winner, None);
        assert_eq!(report.state_hash, battle.state_hash());

        // 8 cells from the south edge, reached in the first round
        let scouts = &report.pawns[0];
        assert_eq!(scouts.unit, "scouts");
        assert_eq!(scouts.tile, Tile::new(12, 16));
        assert_eq!(scouts.waypoints, 0);
        assert_eq!(report.pawns[1].tile, Tile::new(12, 12));
    }

    #[test]
    fn test_run_stops_when_battle_is_decided() {
        let mut scenario = parse_scenario(PASS);
        scenario.troops[1].owner = 0;

        let (_, report) = run_scenario(&scenario, Some(10), |_, _| {}).unwrap();
        assert!(report.rounds.is_empty());
        assert_eq!(report.winner, Some(0));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let scenario = parse_scenario(PASS);
        let (_, report) = run_scenario(&scenario, Some(1), |_, _| {}).unwrap();

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"scenario\":\"Pass\""));
        let back: BattleReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
