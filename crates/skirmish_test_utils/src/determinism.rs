//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the battle engine
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Every client replays the same orders and must arrive at the same
//! battle. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`skirmish_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Pawns are processed in index order and navigation caches are keyed
//!   by `BTreeMap`.
//!
//! - **Tie-breaking**: Equal-length routes and simultaneous arrivals are
//!   resolved by vertex and pawn index, never by arrival in a container.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Pathfinding and collision resolution in isolation
//! 2. **Property tests**: Random layouts must still produce deterministic outputs
//! 3. **Integration tests**: Full battles are reproducible round by round
//! 4. **Parallel tests**: Running N battles on N threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use skirmish_core::battle::Battle;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of rounds simulated.
    pub rounds: u32,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic battle).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the battle was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Battle is non-deterministic!\n\
                 Runs: {}\n\
                 Rounds: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.rounds,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `rounds` - Number of rounds to simulate per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance the state by one round
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use skirmish_test_utils::determinism::verify_determinism;
/// use skirmish_test_utils::fixtures::skirmish_battle;
///
/// let result = verify_determinism(
///     3,
///     4,
///     skirmish_battle,
///     |battle| {
///         battle.round().unwrap();
///     },
///     |battle| battle.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    rounds: u32,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..rounds {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        rounds,
    }
}

/// Play `rounds` rounds and return the final state hash, or `None` if a
/// round failed.
fn play(battle: &mut Battle, rounds: u32) -> Option<u64> {
    for round in 0..rounds {
        if let Err(error) = battle.round() {
            tracing::warn!(round, %error, "Round failed during determinism check");
            return None;
        }
    }
    Some(battle.state_hash())
}

/// Runs the battle twice with identical setup and verifies the final
/// state hashes match exactly.
///
/// Returns `false` if the hashes differ or any round fails.
pub fn verify_battle_determinism<F>(setup_fn: F, rounds: u32) -> bool
where
    F: Fn() -> Battle,
{
    let first = play(&mut setup_fn(), rounds);
    let second = play(&mut setup_fn(), rounds);
    first.is_some() && first == second
}

/// Run N battles on scoped threads and collect final hashes.
///
/// This is useful for catching non-determinism that only manifests
/// under thread scheduling variations, memory layout differences, etc.
/// A battle whose round fails contributes hash `0`.
///
/// # Panics
///
/// Panics if a battle thread panics.
pub fn run_parallel_battles<F>(setup_fn: F, num_battles: usize, rounds: u32) -> DeterminismResult
where
    F: Fn() -> Battle + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_battles)
            .map(|_| s.spawn(|| play(&mut setup_fn(), rounds).unwrap_or(0)))
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("battle thread panicked"))
            .collect()
    });

    let is_deterministic =
        hashes.iter().all(|&h| h != 0) && hashes.windows(2).all(|w| w[0] == w[1]);
    DeterminismResult {
        is_deterministic,
        hashes,
        rounds,
    }
}

/// Compare two battles round by round, finding the first divergence.
///
/// Useful for debugging non-determinism by finding exactly when
/// battles start to differ.
///
/// # Returns
///
/// `None` if the battles stay identical, `Some(round)` if they diverge
/// after that round (`0` for the initial state).
pub fn find_first_divergence<F>(setup_fn: F, rounds: u32) -> Option<u32>
where
    F: Fn() -> Battle,
{
    let mut battle1 = setup_fn();
    let mut battle2 = setup_fn();

    if battle1.state_hash() != battle2.state_hash() {
        return Some(0);
    }

    for round in 1..=rounds {
        let report1 = battle1.round();
        let report2 = battle2.round();

        if report1.is_ok() != report2.is_ok() || battle1.state_hash() != battle2.state_hash() {
            tracing::debug!(round, "Battles diverged");
            return Some(round);
        }
    }

    None
}

/// Verify that a serialization round-trip preserves battle state exactly,
/// and that the restored battle keeps playing identically.
pub fn verify_serialization_determinism<F>(setup_fn: F, rounds: u32) -> bool
where
    F: Fn() -> Battle,
{
    let mut battle = setup_fn();
    if play(&mut battle, rounds).is_none() {
        return false;
    }

    let Ok(bytes) = battle.serialize() else {
        return false;
    };
    let Ok(mut restored) = Battle::deserialize(&bytes) else {
        return false;
    };

    if battle.state_hash() != restored.state_hash() {
        return false;
    }
    let original = play(&mut battle, 1);
    original.is_some() && original == play(&mut restored, 1)
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for battle layouts.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of the movement simulator.
pub mod strategies {
    use proptest::prelude::*;
    use skirmish_core::alliance::PlayerId;
    use skirmish_core::battlefield::{Battlefield, Blockage, BATTLEFIELD_HEIGHT, BATTLEFIELD_WIDTH};
    use skirmish_core::geometry::Tile;
    use skirmish_core::pawn::SPEED_LIMIT;

    /// A pawn to place: owner, speed, starting tile and destination tile.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PawnSetup {
        /// Owning player, an index into [`crate::fixtures::test_alliances`].
        pub owner: PlayerId,
        /// Unit speed.
        pub speed: u32,
        /// Starting tile.
        pub start: Tile,
        /// Tile to walk to in a straight line.
        pub target: Tile,
    }

    /// Generate any legal unit speed.
    pub fn arb_speed() -> impl Strategy<Value = u32> {
        1..=SPEED_LIMIT
    }

    /// Generate a tile on the default battlefield.
    pub fn arb_tile() -> impl Strategy<Value = Tile> {
        (0..BATTLEFIELD_WIDTH, 0..BATTLEFIELD_HEIGHT).prop_map(|(x, y)| Tile::new(x, y))
    }

    /// Generate a tile within `radius` of `center`, clamped to the default
    /// battlefield.
    pub fn arb_tile_near(center: Tile, radius: u32) -> impl Strategy<Value = Tile> {
        let xs = center.x.saturating_sub(radius)..=(center.x + radius).min(BATTLEFIELD_WIDTH - 1);
        let ys = center.y.saturating_sub(radius)..=(center.y + radius).min(BATTLEFIELD_HEIGHT - 1);
        (xs, ys).prop_map(|(x, y)| Tile::new(x, y))
    }

    /// Generate a default-sized battlefield strewn with terrain.
    ///
    /// Layers scattered rocks, straight wall runs and hollow rectangular
    /// enclosures, which may overlap and run off the edge of the field.
    pub fn arb_battlefield() -> impl Strategy<Value = Battlefield> {
        let rocks = proptest::collection::vec(arb_tile(), 0..16);
        let runs = proptest::collection::vec((arb_tile(), 2..=10u32, any::<bool>()), 0..4);
        let enclosures = proptest::collection::vec((arb_tile(), 2..=8u32, 2..=8u32), 0..4);

        (rocks, runs, enclosures).prop_map(|(rocks, runs, enclosures)| {
            let mut field = Battlefield::default();
            for tile in rocks {
                field.set(tile, Blockage::Terrain);
            }
            for (start, length, horizontal) in runs {
                for i in 0..length {
                    let tile = if horizontal {
                        Tile::new(start.x + i, start.y)
                    } else {
                        Tile::new(start.x, start.y + i)
                    };
                    field.set(tile, Blockage::Terrain);
                }
            }
            for (corner, width, height) in enclosures {
                let (right, bottom) = (corner.x + width, corner.y + height);
                for x in corner.x..=right {
                    field.set(Tile::new(x, corner.y), Blockage::Terrain);
                    field.set(Tile::new(x, bottom), Blockage::Terrain);
                }
                for y in corner.y..=bottom {
                    field.set(Tile::new(corner.x, y), Blockage::Terrain);
                    field.set(Tile::new(right, y), Blockage::Terrain);
                }
            }
            field
        })
    }

    /// Generate up to `max_pawns` pawns on distinct starting tiles inside
    /// a crowded `size`×`size` block at the centre of the field, each
    /// heading for a tile in the same block.
    ///
    /// Owners are drawn from the three players of
    /// [`crate::fixtures::test_alliances`]; speeds stay at or below
    /// `max_speed`.
    pub fn arb_crowd(
        max_pawns: usize,
        size: u32,
        max_speed: u32,
    ) -> impl Strategy<Value = Vec<PawnSetup>> {
        let offset_x = (BATTLEFIELD_WIDTH - size) / 2;
        let offset_y = (BATTLEFIELD_HEIGHT - size) / 2;
        let block: Vec<Tile> = (0..size)
            .flat_map(|y| (0..size).map(move |x| Tile::new(offset_x + x, offset_y + y)))
            .collect();
        let targets = block.clone();

        proptest::sample::subsequence(block, 1..=max_pawns).prop_flat_map(move |starts| {
            let count = starts.len();
            (
                Just(starts),
                proptest::collection::vec(0..3u8, count),
                proptest::collection::vec(1..=max_speed, count),
                proptest::collection::vec(proptest::sample::select(targets.clone()), count),
            )
                .prop_map(|(starts, owners, speeds, targets)| {
                    starts
                        .into_iter()
                        .zip(owners)
                        .zip(speeds)
                        .zip(targets)
                        .map(|(((start, owner), speed), target)| PawnSetup {
                            owner,
                            speed,
                            start,
                            target,
                        })
                        .collect()
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::strategies::*;
    use super::*;
    use crate::fixtures::{skirmish_battle, test_alliances, test_pawn};
    use proptest::prelude::*;
    use skirmish_core::prelude::*;

    // =========================================================================
    // Basic determinism tests
    // =========================================================================

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
        assert_eq!(result.unique_hashes(), vec![100]);
    }

    #[test]
    #[should_panic(expected = "non-deterministic")]
    fn test_assert_deterministic_reports_divergence() {
        DeterminismResult {
            is_deterministic: false,
            hashes: vec![1, 2],
            rounds: 1,
        }
        .assert_deterministic();
    }

    #[test]
    fn test_skirmish_is_deterministic() {
        assert!(verify_battle_determinism(skirmish_battle, 6));
        assert_eq!(find_first_divergence(skirmish_battle, 6), None);
    }

    #[test]
    fn test_parallel_battles_match() {
        let result = run_parallel_battles(skirmish_battle, 4, 4);
        result.assert_deterministic();
        assert_eq!(result.hashes.len(), 4);
    }

    #[test]
    fn test_rounds_change_the_hash() {
        let mut battle = skirmish_battle();
        let before = battle.state_hash();
        battle.round().unwrap();
        assert_ne!(before, battle.state_hash());
    }

    // =========================================================================
    // Serialization round-trip tests
    // =========================================================================

    #[test]
    fn test_serialization_preserves_fresh_battle() {
        assert!(verify_serialization_determinism(skirmish_battle, 0));
    }

    #[test]
    fn test_serialization_preserves_battle_in_progress() {
        assert!(verify_serialization_determinism(skirmish_battle, 3));
    }

    #[test]
    fn test_compute_hash_is_stable() {
        assert_eq!(compute_hash(&Tile::new(3, 4)), compute_hash(&Tile::new(3, 4)));
        assert_ne!(compute_hash(&Tile::new(3, 4)), compute_hash(&Tile::new(4, 3)));
    }

    // =========================================================================
    // Property-based tests using proptest
    // =========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Random crowds replay identically.
        #[test]
        fn prop_random_crowds_are_deterministic(crowd in arb_crowd(6, 5, SPEED_LIMIT)) {
            let setup = || {
                crowd
                    .iter()
                    .map(|p| test_pawn(p.owner, p.start, p.speed, &[p.target.center()]))
                    .collect::<Vec<Pawn>>()
            };
            let result = verify_determinism(
                2,
                1,
                setup,
                |pawns| {
                    movement_plan(pawns, &test_alliances(), &Battlefield::default()).unwrap();
                },
                compute_hash,
            );
            prop_assert!(result.is_deterministic);
        }

        /// Generated crowds never share a starting tile.
        #[test]
        fn prop_crowd_starts_are_distinct(crowd in arb_crowd(8, 4, 4)) {
            for (i, a) in crowd.iter().enumerate() {
                for b in &crowd[i + 1..] {
                    prop_assert_ne!(a.start, b.start);
                }
                prop_assert!(a.speed >= 1 && a.speed <= 4);
            }
        }

        #[test]
        fn prop_tiles_near_stay_on_the_field(tile in arb_tile_near(Tile::new(1, 23), 3)) {
            prop_assert!(tile.x <= 4 && tile.y >= 20 && tile.y < BATTLEFIELD_HEIGHT);
        }

        #[test]
        fn prop_speeds_are_legal(speed in arb_speed(), tile in arb_tile()) {
            prop_assert!(Pawn::new(Troop::new(Unit::new("scouts", speed), 0, 1), tile).is_ok());
        }
    }
}
