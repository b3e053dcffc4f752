//! Simultaneous movement of every pawn for one round.
//!
//! A round is split into [`MOVEMENT_STEPS`] sub-steps. At each sub-step every
//! pawn advances along its waypoints, its 2×2 footprint is recorded in an
//! occupancy table of half-cell squares, and squares claimed by more than
//! one pawn are resolved until none is left:
//!
//! - If hostile pawns meet, all of them stop at their failback for the rest
//!   of the round.
//! - If only allies meet, one of them proceeds (a pawn already standing on
//!   its failback, or else the first one with room to move on) and the
//!   others wait one sub-step at their failback.
//!
//! Every resolution sends at least one pawn back to its failback, where it
//! stays for the rest of the sub-step, so the worklist always drains.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::alliance::Alliances;
use crate::battlefield::Battlefield;
use crate::error::{GameError, Result};
use crate::geometry::{Footprint, Square, Tile};
use crate::math::{Fixed, Vec2Fixed};
use crate::pawn::{retime, Move, MoveKind, Pawn, SPEED_LIMIT};

/// Sub-steps per round. At [`SPEED_LIMIT`] a pawn moves at most half a cell,
/// one square, per sub-step.
pub const MOVEMENT_STEPS: u32 = 2 * SPEED_LIMIT;

/// Pawns one occupancy square can record.
///
/// Failback footprints never overlap and no pawn moves more than one square
/// per sub-step, so at most four pawns can reach the same square.
pub const OVERLAP_LIMIT: usize = 4;

/// Time of the end of sub-step `step`, as a fraction of the round.
#[must_use]
pub fn step_time(step: u32) -> Fixed {
    Fixed::from_num(step) / Fixed::from_num(MOVEMENT_STEPS)
}

/// Where a pawn following `moves` is at `time`.
///
/// Interpolates linearly between the waypoints around `time`; before the
/// first waypoint that is its location, after the last one the last
/// location. Returns `None` for an empty list.
#[must_use]
pub fn movement_location(moves: &[Move], time: Fixed) -> Option<Vec2Fixed> {
    let next = moves.partition_point(|waypoint| waypoint.time < time);
    let Some(to) = moves.get(next) else {
        return moves.last().map(|waypoint| waypoint.location);
    };
    if next == 0 {
        return Some(to.location);
    }

    let from = &moves[next - 1];
    if to.time == from.time {
        return Some(to.location);
    }
    let progress = (time - from.time) / (to.time - from.time);
    Some(from.location.lerp(to.location, progress))
}

/// Summary of one planned round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReport {
    /// Conflicts resolved over the whole round.
    pub resolutions: usize,
    /// Most conflicts resolved within a single sub-step.
    pub max_step_resolutions: usize,
    /// Pawns stopped before the end of their planned movement.
    pub stopped: Vec<usize>,
    /// Pawns that had to wait for an ally at least once.
    pub waiting: Vec<usize>,
    /// Position of every pawn at the end of each sub-step, by pawn index.
    pub frames: Vec<Vec<Vec2Fixed>>,
}

/// Half-cell occupancy table, [`OVERLAP_LIMIT`] pawn slots per square.
///
/// Occupied slots are packed at the front of each square's array.
#[derive(Debug)]
struct Occupancy {
    columns: i32,
    rows: i32,
    cells: Vec<[Option<usize>; OVERLAP_LIMIT]>,
}

impl Occupancy {
    fn new(battlefield: &Battlefield) -> Result<Self> {
        let columns = battlefield.width() as usize * 2;
        let rows = battlefield.height() as usize * 2;
        let mut cells = Vec::new();
        cells.try_reserve(columns * rows)?;
        cells.resize(columns * rows, [None; OVERLAP_LIMIT]);

        Ok(Self {
            columns: columns as i32,
            rows: rows as i32,
            cells,
        })
    }

    fn clear(&mut self) {
        self.cells.fill([None; OVERLAP_LIMIT]);
    }

    /// Squares of a footprint, shifted inside the table.
    fn squares(&self, footprint: Footprint) -> [Square; 4] {
        let origin = Square::new(
            footprint.origin.x.clamp(0, self.columns - 2),
            footprint.origin.y.clamp(0, self.rows - 2),
        );
        Footprint { origin }.squares()
    }

    fn index(&self, square: Square) -> usize {
        (square.y * self.columns + square.x) as usize
    }

    fn square(&self, index: usize) -> Square {
        let index = index as i32;
        Square::new(index % self.columns, index / self.columns)
    }

    /// Record a pawn on its footprint. A pawn at its failback goes in front
    /// of the other occupants.
    fn insert(&mut self, pawn: usize, footprint: Footprint, front: bool) -> Result<[Square; 4]> {
        let squares = self.squares(footprint);
        for square in squares {
            let index = self.index(square);
            let slots = &mut self.cells[index];
            if slots[OVERLAP_LIMIT - 1].is_some() {
                return Err(GameError::OverlapLimitExceeded {
                    square,
                    limit: OVERLAP_LIMIT,
                });
            }

            if front {
                slots.rotate_right(1);
                slots[0] = Some(pawn);
            } else if let Some(free) = slots.iter_mut().find(|slot| slot.is_none()) {
                *free = Some(pawn);
            }
        }
        Ok(squares)
    }

    fn remove(&mut self, pawn: usize, footprint: Footprint) {
        for square in self.squares(footprint) {
            let index = self.index(square);
            let slots = &mut self.cells[index];
            if let Some(position) = slots.iter().position(|&slot| slot == Some(pawn)) {
                slots[position..].rotate_left(1);
                slots[OVERLAP_LIMIT - 1] = None;
            }
        }
    }

    fn occupants(&self, square: Square) -> Vec<usize> {
        self.cells[self.index(square)].iter().flatten().copied().collect()
    }

    fn crowded(&self, square: Square) -> bool {
        self.cells[self.index(square)][1].is_some()
    }

    /// Squares with two or more occupants, row-major.
    fn conflicts(&self) -> impl Iterator<Item = Square> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, slots)| slots[1].is_some())
            .map(|(index, _)| self.square(index))
    }
}

/// Sub-step bounds passed to conflict resolution.
#[derive(Debug, Clone, Copy)]
struct Span {
    step: u32,
    before: Fixed,
    now: Fixed,
}

/// Keep only the moves made by `before` and hold the failback from then on.
fn stop(pawn: &mut Pawn, before: Fixed) {
    let kept = pawn.moves.partition_point(|waypoint| waypoint.time <= before);
    pawn.moves.truncate(kept);
    if pawn.moves.last().map_or(true, |last| last.time != before) {
        pawn.moves.push(Move::anchor(pawn.failback, before));
    }
}

/// Hold the failback until `now`, then carry on with the remaining moves.
fn wait(pawn: &mut Pawn, span: Span) {
    let kept = pawn.moves.partition_point(|waypoint| waypoint.time <= span.before);
    let mut later = pawn.moves.split_off(kept);

    if pawn.moves.last().map_or(true, |last| last.time != span.before) {
        pawn.moves.push(Move::anchor(pawn.failback, span.before));
    }
    pawn.moves
        .push(Move::new(pawn.failback, span.now, MoveKind::Wait));

    retime(&mut later, pawn.failback, span.now, pawn.speed());
    pawn.moves.append(&mut later);
}

/// Whether `candidate` can proceed without the other occupants moving:
/// it is clear of their failbacks now and reaches a new footprint, still
/// clear of them, later this round.
fn viable(pawns: &[Pawn], candidate: usize, occupants: &[usize], step: u32) -> bool {
    let blockers: Vec<Footprint> = occupants
        .iter()
        .filter(|&&other| other != candidate)
        .map(|&other| Footprint::of(pawns[other].failback))
        .collect();
    let clear = |footprint: Footprint| blockers.iter().all(|&b| !b.overlaps(footprint));

    let pawn = &pawns[candidate];
    let current = Footprint::of(pawn.step);
    if !clear(current) {
        return false;
    }

    (step + 1..=MOVEMENT_STEPS).any(|later| {
        movement_location(&pawn.moves, step_time(later))
            .map(Footprint::of)
            .is_some_and(|footprint| footprint != current && clear(footprint))
    })
}

/// Settle one crowded square. Returns the pawns sent back to their
/// failback.
fn resolve(
    pawns: &mut [Pawn],
    occupants: &[usize],
    alliances: &Alliances,
    span: Span,
    stopped: &mut BTreeSet<usize>,
    waiting: &mut BTreeSet<usize>,
) -> Vec<usize> {
    let displaced = |pawns: &[Pawn], index: usize| pawns[index].step != pawns[index].failback;

    let hostile = occupants.iter().enumerate().any(|(i, &a)| {
        occupants[i + 1..]
            .iter()
            .any(|&b| !alliances.allies(pawns[a].owner(), pawns[b].owner()))
    });

    let keeper = if hostile {
        None
    } else {
        occupants
            .iter()
            .copied()
            .find(|&index| !displaced(pawns, index))
            .or_else(|| {
                occupants
                    .iter()
                    .copied()
                    .find(|&index| viable(pawns, index, occupants, span.step))
            })
    };

    let retreating: Vec<usize> = occupants
        .iter()
        .copied()
        .filter(|&index| Some(index) != keeper && displaced(pawns, index))
        .collect();

    match keeper {
        Some(keeper) => {
            tracing::trace!(step = span.step, keeper, ?retreating, "Allies make way");
            for &index in occupants.iter().filter(|&&index| index != keeper) {
                wait(&mut pawns[index], span);
                waiting.insert(index);
            }
        }
        None => {
            tracing::trace!(step = span.step, hostile, ?occupants, "Pawns stopped");
            for &index in occupants {
                stop(&mut pawns[index], span.before);
                stopped.insert(index);
            }
        }
    }

    retreating
}

/// Plan every live pawn's movement for one round.
///
/// Each pawn starts at its position and follows its path, re-timed from the
/// start of the round. On return `moves` holds the collision-free
/// trajectory up to the end of the round, closed by an
/// [`MoveKind::Anchor`] at the position reached. Positions are not
/// committed; see [`movement_perform`].
///
/// # Errors
///
/// Returns [`GameError::OverlapLimitExceeded`] if more pawns than
/// [`OVERLAP_LIMIT`] reach one square, which pawns within [`SPEED_LIMIT`]
/// cannot do.
pub fn movement_plan(
    pawns: &mut [Pawn],
    alliances: &Alliances,
    battlefield: &Battlefield,
) -> Result<MovementReport> {
    let active: Vec<usize> = (0..pawns.len()).filter(|&i| pawns[i].alive()).collect();
    for &index in &active {
        let pawn = &mut pawns[index];
        let speed = pawn.speed();
        pawn.moves.clear();
        pawn.moves.try_reserve(pawn.path.len() + 1)?;
        pawn.moves.push(Move::anchor(pawn.position, Fixed::ZERO));
        pawn.moves.extend_from_slice(&pawn.path);
        retime(&mut pawn.moves[1..], pawn.position, Fixed::ZERO, speed);
        pawn.step = pawn.position;
        pawn.failback = pawn.position;
    }

    let mut table = Occupancy::new(battlefield)?;
    let mut report = MovementReport::default();
    report.frames.try_reserve(MOVEMENT_STEPS as usize)?;
    let mut stopped = BTreeSet::new();
    let mut waiting = BTreeSet::new();

    for step in 1..=MOVEMENT_STEPS {
        let span = Span {
            step,
            before: step_time(step - 1),
            now: step_time(step),
        };

        table.clear();
        for &index in &active {
            let pawn = &mut pawns[index];
            pawn.step = movement_location(&pawn.moves, span.now).unwrap_or(pawn.failback);
            let front = pawn.step == pawn.failback;
            table.insert(index, Footprint::of(pawn.step), front)?;
        }

        let mut worklist: VecDeque<Square> = table.conflicts().collect();
        let mut resolutions = 0;
        while let Some(square) = worklist.pop_front() {
            if !table.crowded(square) {
                continue;
            }

            let occupants = table.occupants(square);
            let retreating = resolve(
                pawns,
                &occupants,
                alliances,
                span,
                &mut stopped,
                &mut waiting,
            );
            resolutions += 1;

            for index in retreating {
                let pawn = &mut pawns[index];
                table.remove(index, Footprint::of(pawn.step));
                pawn.step = pawn.failback;
                for square in table.insert(index, Footprint::of(pawn.step), true)? {
                    if table.crowded(square) {
                        worklist.push_back(square);
                    }
                }
            }
        }

        #[cfg(feature = "debug-validation")]
        if let Some(square) = table.conflicts().next() {
            return Err(GameError::InvalidState(format!(
                "Square {square} still shared after step {step}"
            )));
        }

        report.resolutions += resolutions;
        report.max_step_resolutions = report.max_step_resolutions.max(resolutions);
        report
            .frames
            .push(pawns.iter().map(|pawn| pawn.step).collect());

        for &index in &active {
            pawns[index].failback = pawns[index].step;
        }
    }

    for &index in &active {
        let pawn = &mut pawns[index];
        let end = movement_location(&pawn.moves, Fixed::ONE).unwrap_or(pawn.position);
        let kept = pawn.moves.partition_point(|waypoint| waypoint.time <= Fixed::ONE);
        pawn.moves.truncate(kept);
        if pawn.moves.last().map_or(true, |last| last.time != Fixed::ONE) {
            pawn.moves.push(Move::anchor(end, Fixed::ONE));
        }
    }

    report.stopped = stopped.into_iter().collect();
    report.waiting = waiting.into_iter().collect();
    tracing::debug!(
        pawns = active.len(),
        resolutions = report.resolutions,
        max_step_resolutions = report.max_step_resolutions,
        stopped = report.stopped.len(),
        waiting = report.waiting.len(),
        "Planned movement"
    );
    Ok(report)
}

/// Commit a planned round: move the pawn to where its plan ends and drop
/// the waypoints it reached. Waypoints beyond the round stay queued, timed
/// from the new position.
pub fn movement_perform(pawn: &mut Pawn) {
    let Some(end) = pawn.moves.last().map(|waypoint| waypoint.location) else {
        return;
    };

    let reached = pawn
        .moves
        .iter()
        .filter(|waypoint| waypoint.kind == MoveKind::Manual && waypoint.time <= Fixed::ONE)
        .count();
    pawn.path.drain(..reached.min(pawn.path.len()));

    pawn.position = end;
    pawn.step = end;
    pawn.failback = end;
    if let Some(tile) = Tile::containing(end) {
        pawn.tile = tile;
    }
    pawn.retime_path();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alliance::Player;
    use crate::pawn::{Troop, Unit};

    fn fixed(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn pos(x: f64, y: f64) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn alliances() -> Alliances {
        Alliances::new(vec![
            Player::new("red", 0),
            Player::new("red ally", 0),
            Player::new("blue", 1),
        ])
    }

    fn pawn(owner: u8, x: u32, y: u32, speed: u32, path: &[Vec2Fixed]) -> Pawn {
        let troop = Troop::new(Unit::new("pikemen", speed), owner, 30);
        let mut pawn = Pawn::new(troop, Tile::new(x, y)).unwrap();
        pawn.path = path.iter().map(|&p| Move::manual(p, Fixed::ZERO)).collect();
        pawn
    }

    fn plan(pawns: &mut [Pawn]) -> MovementReport {
        movement_plan(pawns, &alliances(), &Battlefield::default()).unwrap()
    }

    #[test]
    fn test_movement_steps_match_speed_limit() {
        assert_eq!(MOVEMENT_STEPS, 16);
        assert_eq!(step_time(MOVEMENT_STEPS), Fixed::ONE);
        assert_eq!(step_time(4), fixed(0.25));
    }

    #[test]
    fn test_movement_location() {
        let moves = [
            Move::anchor(pos(0.0, 0.0), Fixed::ZERO),
            Move::manual(pos(4.0, 0.0), fixed(0.5)),
            Move::new(pos(4.0, 0.0), fixed(0.75), MoveKind::Wait),
            Move::manual(pos(4.0, 2.0), fixed(1.0)),
        ];
        assert_eq!(movement_location(&moves, Fixed::ZERO), Some(pos(0.0, 0.0)));
        assert_eq!(movement_location(&moves, fixed(0.25)), Some(pos(2.0, 0.0)));
        assert_eq!(movement_location(&moves, fixed(0.625)), Some(pos(4.0, 0.0)));
        assert_eq!(movement_location(&moves, fixed(0.875)), Some(pos(4.0, 1.0)));
        assert_eq!(movement_location(&moves, fixed(3.0)), Some(pos(4.0, 2.0)));
        assert_eq!(movement_location(&[], Fixed::ONE), None);
    }

    #[test]
    fn test_occupancy_front_insert_and_remove() {
        let mut table = Occupancy::new(&Battlefield::default()).unwrap();
        let footprint = Footprint::of(pos(3.5, 3.5));
        table.insert(0, footprint, false).unwrap();
        table.insert(1, footprint, false).unwrap();
        table.insert(2, footprint, true).unwrap();
        assert_eq!(table.occupants(footprint.origin), vec![2, 0, 1]);

        table.remove(0, footprint);
        assert_eq!(table.occupants(footprint.origin), vec![2, 1]);
        assert_eq!(table.conflicts().count(), 4);
    }

    #[test]
    fn test_occupancy_limit() {
        let mut table = Occupancy::new(&Battlefield::default()).unwrap();
        let footprint = Footprint::of(pos(3.5, 3.5));
        for pawn in 0..OVERLAP_LIMIT {
            table.insert(pawn, footprint, false).unwrap();
        }
        assert!(matches!(
            table.insert(9, footprint, false),
            Err(GameError::OverlapLimitExceeded { limit: 4, .. })
        ));
    }

    #[test]
    fn test_occupancy_clamps_to_table() {
        let mut table = Occupancy::new(&Battlefield::default()).unwrap();
        let squares = table.insert(0, Footprint::of(pos(0.1, 24.9)), false).unwrap();
        assert_eq!(squares[0], Square::new(0, 48));
    }

    #[test]
    fn test_unobstructed_pawn_follows_path() {
        let mut pawns = [pawn(0, 2, 2, 4, &[pos(10.5, 2.5)])];
        let report = plan(&mut pawns);
        assert_eq!(report.resolutions, 0);
        assert_eq!(report.frames.len(), MOVEMENT_STEPS as usize);

        let last = pawns[0].moves.last().unwrap();
        assert_eq!(last.location, pos(6.5, 2.5));
        assert_eq!(last.time, Fixed::ONE);
        assert_eq!(last.kind, MoveKind::Anchor);

        movement_perform(&mut pawns[0]);
        assert_eq!(pawns[0].position, pos(6.5, 2.5));
        assert_eq!(pawns[0].tile, Tile::new(6, 2));
        assert_eq!(pawns[0].path.len(), 1);
        assert_eq!(pawns[0].path[0].time, Fixed::ONE);
    }

    #[test]
    fn test_arrival_consumes_waypoints() {
        let mut pawns = [pawn(0, 2, 2, 4, &[pos(4.5, 2.5), pos(4.5, 4.5)])];
        plan(&mut pawns);
        movement_perform(&mut pawns[0]);
        assert_eq!(pawns[0].position, pos(4.5, 4.5));
        assert!(pawns[0].path.is_empty());
    }

    #[test]
    fn test_hostile_swap_stops_both() {
        let mut pawns = [
            pawn(0, 5, 5, 1, &[pos(6.5, 5.5)]),
            pawn(2, 6, 5, 1, &[pos(5.5, 5.5)]),
        ];
        let report = plan(&mut pawns);
        assert_eq!(report.stopped, vec![0, 1]);
        assert!(report.waiting.is_empty());

        // Footprints first meet at t = 1/4, both fall back to t = 3/16
        assert_eq!(pawns[0].moves.last().unwrap().location, pos(5.6875, 5.5));
        assert_eq!(pawns[1].moves.last().unwrap().location, pos(6.3125, 5.5));

        for pawn in &mut pawns {
            movement_perform(pawn);
            assert_eq!(pawn.path.len(), 1);
        }
        assert_eq!(pawns[0].path[0].time, fixed(0.8125));
    }

    #[test]
    fn test_slow_ally_yields_at_crossing() {
        // The slow pawn comes first in pawn order but the fast one is
        // already clear of its failback
        let mut pawns = [
            pawn(0, 10, 9, 2, &[pos(12.5, 9.5), pos(12.5, 13.5)]),
            pawn(1, 12, 7, 4, &[pos(12.5, 15.5)]),
        ];
        let report = plan(&mut pawns);
        assert!(report.stopped.is_empty());
        assert_eq!(report.waiting, vec![0]);
        assert_eq!(report.resolutions, 1);

        assert!(pawns[0].moves.iter().any(|m| m.kind == MoveKind::Wait));
        assert!(pawns[1].moves.iter().all(|m| m.kind != MoveKind::Wait));
        assert_eq!(pawns[1].moves.last().unwrap().location, pos(12.5, 11.5));

        for frame in &report.frames {
            assert!(!Footprint::of(frame[0]).overlaps(Footprint::of(frame[1])));
        }
    }

    #[test]
    fn test_ally_on_failback_keeps_its_place() {
        let mut pawns = [
            pawn(0, 8, 5, 2, &[]),
            pawn(1, 5, 5, 4, &[pos(13.5, 5.5)]),
        ];
        let report = plan(&mut pawns);
        assert!(report.stopped.is_empty());
        assert_eq!(report.waiting, vec![1]);

        assert_eq!(pawns[0].moves.last().unwrap().location, pos(8.5, 5.5));
        let blocked = pawns[1].moves.last().unwrap().location;
        assert!(blocked.x > fixed(7.0) && blocked.x < fixed(8.0));

        for frame in &report.frames {
            assert!(!Footprint::of(frame[0]).overlaps(Footprint::of(frame[1])));
        }
    }

    #[test]
    fn test_dead_pawns_do_not_move() {
        let mut corpse = pawn(2, 5, 5, 3, &[pos(9.5, 5.5)]);
        corpse.troop.count = 0;
        let mut pawns = [corpse, pawn(0, 3, 5, 2, &[pos(7.5, 5.5)])];
        let report = plan(&mut pawns);
        assert_eq!(report.resolutions, 0);
        assert_eq!(pawns[1].moves.last().unwrap().location, pos(5.5, 5.5));
    }
}
