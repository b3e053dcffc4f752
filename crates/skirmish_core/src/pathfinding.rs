//! Shortest paths over the visibility graph.
//!
//! Uses Dijkstra's algorithm with fixed-point distances. Ties in the priority
//! queue are broken by vertex index so results are reproducible bit for bit.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::alliance::{Alliances, PlayerId};
use crate::battlefield::Battlefield;
use crate::error::{GameError, Result};
use crate::geometry::{path_visible, Obstacle, Tile};
use crate::graph::VisibilityGraph;
use crate::math::{Fixed, Vec2Fixed};
use crate::pawn::{retime, Move, Pawn};

/// Everything one player needs to route pawns for a round: the obstacles
/// they cannot cross and the visibility graph built over them.
#[derive(Debug, Clone)]
pub struct Navigation {
    observer: PlayerId,
    width: u32,
    height: u32,
    passable: Vec<bool>,
    obstacles: Vec<Obstacle>,
    graph: VisibilityGraph,
}

impl Navigation {
    /// Build navigation data for `observer`'s view of the battlefield.
    pub fn build(
        battlefield: &Battlefield,
        observer: PlayerId,
        alliances: &Alliances,
    ) -> Result<Self> {
        let obstacles = battlefield.obstacles(observer, alliances)?;

        let mut passable = Vec::new();
        passable.try_reserve((battlefield.width() as usize) * (battlefield.height() as usize))?;
        passable.extend(
            battlefield
                .tiles()
                .map(|tile| battlefield.passable(tile, observer, alliances)),
        );

        let width = battlefield.width();
        let graph = VisibilityGraph::build(&obstacles, width, battlefield.height(), |tile| {
            passable[(tile.y as usize) * (width as usize) + (tile.x as usize)]
        })?;

        tracing::debug!(
            observer,
            obstacles = obstacles.len(),
            vertices = graph.vertex_count(),
            "Built navigation"
        );

        Ok(Self {
            observer,
            width,
            height: battlefield.height(),
            passable,
            obstacles,
            graph,
        })
    }

    /// Player whose view this is.
    #[must_use]
    pub fn observer(&self) -> PlayerId {
        self.observer
    }

    /// Obstacles for the observer.
    #[must_use]
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Visibility graph over the obstacles.
    #[must_use]
    pub fn graph(&self) -> &VisibilityGraph {
        &self.graph
    }

    /// Whether the observer's pawns may stand on a tile.
    #[must_use]
    pub fn passable(&self, tile: Tile) -> bool {
        tile.x < self.width
            && tile.y < self.height
            && self.passable[(tile.y as usize) * (self.width as usize) + (tile.x as usize)]
    }
}

/// Heap entry for Dijkstra's algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frontier {
    distance: Fixed,
    vertex: usize,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for shortest-first, then lower index
        match other.distance.cmp(&self.distance) {
            Ordering::Equal => other.vertex.cmp(&self.vertex),
            ord => ord,
        }
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-vertex search state.
#[derive(Debug, Clone, Copy)]
struct PathNode {
    /// Tentative distance; `Fixed::MAX` while unreached.
    distance: Fixed,
    previous: Option<usize>,
}

impl PathNode {
    const UNREACHED: Self = Self {
        distance: Fixed::MAX,
        previous: None,
    };

    fn reached(&self) -> bool {
        self.distance != Fixed::MAX
    }
}

/// Run Dijkstra from `origin`, stopping early once `target` is settled.
fn dijkstra(graph: &VisibilityGraph, origin: usize, target: Option<usize>) -> Result<Vec<PathNode>> {
    let mut nodes = Vec::new();
    nodes.try_reserve(graph.vertex_count())?;
    nodes.resize(graph.vertex_count(), PathNode::UNREACHED);
    nodes[origin].distance = Fixed::ZERO;

    let mut open = BinaryHeap::new();
    open.push(Frontier {
        distance: Fixed::ZERO,
        vertex: origin,
    });

    while let Some(Frontier { distance, vertex }) = open.pop() {
        // Stale entry, a shorter route was found after it was queued
        if distance > nodes[vertex].distance {
            continue;
        }
        if Some(vertex) == target {
            break;
        }

        for edge in graph.edges(vertex) {
            let tentative = distance + edge.distance;
            if tentative < nodes[edge.target].distance {
                nodes[edge.target] = PathNode {
                    distance: tentative,
                    previous: Some(vertex),
                };
                open.push(Frontier {
                    distance: tentative,
                    vertex: edge.target,
                });
            }
        }
    }

    Ok(nodes)
}

/// Length of the shortest obstacle-avoiding route between two positions.
///
/// The graph is left exactly as it was, whatever the outcome.
///
/// # Errors
///
/// Returns [`GameError::MissingPath`] when no route exists.
pub fn path_distance(
    origin: Vec2Fixed,
    target: Vec2Fixed,
    graph: &mut VisibilityGraph,
    obstacles: &[Obstacle],
) -> Result<Fixed> {
    if origin == target {
        return Ok(Fixed::ZERO);
    }

    let mut query = graph.query(obstacles);
    let from = query.endpoint(origin)?;
    let to = query.endpoint(target)?;

    let nodes = dijkstra(query.graph(), from, Some(to))?;
    if !nodes[to].reached() {
        return Err(GameError::MissingPath { origin, target });
    }
    Ok(nodes[to].distance)
}

/// Route a pawn to `target` and append the route to its path.
///
/// The route starts where the pawn's path currently ends, so repeated calls
/// queue legs one after another. Every vertex the route bends at becomes a
/// [`MoveKind::Manual`](crate::pawn::MoveKind::Manual) waypoint, timed by
/// cumulative distance over the pawn's speed. On failure the path is not
/// touched.
pub fn path_find(
    pawn: &mut Pawn,
    target: Vec2Fixed,
    graph: &mut VisibilityGraph,
    obstacles: &[Obstacle],
) -> Result<()> {
    let (origin, start_time) = pawn.path_end();
    if origin == target {
        return Ok(());
    }

    let waypoints = {
        let mut query = graph.query(obstacles);
        let from = query.endpoint(origin)?;
        let to = query.endpoint(target)?;

        let nodes = dijkstra(query.graph(), from, Some(to))?;
        if !nodes[to].reached() {
            return Err(GameError::MissingPath { origin, target });
        }

        let mut chain = Vec::new();
        let mut vertex = to;
        while vertex != from {
            chain.try_reserve(1)?;
            chain.push(Move::manual(query.graph().vertices()[vertex], Fixed::ZERO));
            vertex = nodes[vertex].previous.ok_or_else(|| {
                GameError::InvalidState(format!("Broken route at vertex {vertex}"))
            })?;
        }
        chain.reverse();
        chain
    };

    let first = pawn.path.len();
    pawn.path.try_reserve(waypoints.len())?;
    pawn.path.extend(waypoints);
    let speed = pawn.speed();
    retime(&mut pawn.path[first..], origin, start_time, speed);
    Ok(())
}

/// Queue a leg to the centre of `target` after the pawn's current path.
///
/// # Errors
///
/// Returns [`GameError::MissingPath`] for a target off the battlefield, on a
/// tile the pawn may not enter, or with no route to it. The pawn keeps its
/// previous orders.
pub fn movement_queue(pawn: &mut Pawn, target: Tile, nav: &mut Navigation) -> Result<()> {
    let destination = target.center();
    let result = if nav.passable(target) {
        path_find(pawn, destination, &mut nav.graph, &nav.obstacles)
    } else {
        Err(GameError::MissingPath {
            origin: pawn.path_end().0,
            target: destination,
        })
    };

    if let Err(error) = &result {
        tracing::warn!(owner = pawn.owner(), %target, %error, "Rejected move order");
    }
    result
}

/// Replace the pawn's path with a route to `target`.
///
/// On failure the previous path is restored.
pub fn movement_set(pawn: &mut Pawn, target: Tile, nav: &mut Navigation) -> Result<()> {
    let previous = std::mem::take(&mut pawn.path);
    let result = movement_queue(pawn, target, nav);
    if result.is_err() {
        pawn.path = previous;
    }
    result
}

/// Cancel every queued move.
pub fn movement_stay(pawn: &mut Pawn) {
    pawn.path.clear();
}

/// Travel distances from one position to every tile centre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reachability {
    width: u32,
    distances: Vec<Option<Fixed>>,
}

impl Reachability {
    /// Distance to the centre of `tile`, or `None` when it cannot be reached.
    #[must_use]
    pub fn get(&self, tile: Tile) -> Option<Fixed> {
        if tile.x >= self.width {
            return None;
        }
        self.distances
            .get((tile.y as usize) * (self.width as usize) + (tile.x as usize))
            .copied()
            .flatten()
    }

    /// Tiles within `range`, row-major.
    pub fn within(&self, range: Fixed) -> impl Iterator<Item = Tile> + '_ {
        let width = self.width as usize;
        self.distances
            .iter()
            .enumerate()
            .filter(move |(_, distance)| distance.is_some_and(|d| d <= range))
            .map(move |(index, _)| Tile::new((index % width) as u32, (index / width) as u32))
    }
}

/// Distance from `origin` to every tile on the battlefield.
///
/// One Dijkstra run from `origin` covers every graph vertex; a tile is then
/// reached through whichever visible vertex (or `origin` itself) gives the
/// shortest total. Impassable and unreachable tiles are `None`.
pub fn reachable(origin: Vec2Fixed, nav: &mut Navigation) -> Result<Reachability> {
    let (width, height) = (nav.width, nav.height);
    let mut query = nav.graph.query(&nav.obstacles);
    let from = query.endpoint(origin)?;
    let nodes = dijkstra(query.graph(), from, None)?;
    let vertices = query.graph().vertices();

    let mut distances = Vec::new();
    distances.try_reserve(nav.passable.len())?;
    for (index, &passable) in nav.passable.iter().enumerate() {
        if !passable {
            distances.push(None);
            continue;
        }

        let center = Tile::new((index % width as usize) as u32, (index / width as usize) as u32)
            .center();
        let best = vertices
            .iter()
            .zip(&nodes)
            .filter(|(_, node)| node.reached())
            .filter(|(&vertex, _)| path_visible(vertex, center, query.obstacles()))
            .map(|(&vertex, node)| node.distance + vertex.distance(center))
            .min();
        distances.push(best);
    }

    tracing::trace!(
        width,
        height,
        reachable = distances.iter().flatten().count(),
        "Computed reachability"
    );
    Ok(Reachability { width, distances })
}

/// Whether the pawn can get to the centre of `tile` within this round.
pub fn movement_reachable(pawn: &Pawn, nav: &mut Navigation, tile: Tile) -> Result<bool> {
    if !nav.passable(tile) {
        return Ok(false);
    }

    match path_distance(pawn.position, tile.center(), &mut nav.graph, &nav.obstacles) {
        Ok(distance) => Ok(distance <= pawn.speed()),
        Err(GameError::MissingPath { .. }) => Ok(false),
        Err(error) => Err(error),
    }
}
