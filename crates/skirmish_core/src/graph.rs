//! Visibility graph over obstacle corners.
//!
//! Shortest obstacle-avoiding routes in the plane bend only at obstacle
//! corners, so the search space is one vertex per corner, pushed diagonally
//! out by the pawn radius so pawns clear the corner. Mutually visible
//! vertices are joined by an edge weighted with their euclidean distance.
//!
//! Routes start and end at arbitrary points, which are attached as temporary
//! vertices for the lifetime of a [`PathQuery`]. Dropping the query detaches
//! them again, so the graph is back to its built state on every exit path.

use crate::error::Result;
use crate::geometry::{path_visible, Obstacle, Tile, PAWN_RADIUS};
use crate::math::{Fixed, Vec2Fixed};

/// Link to a neighbouring vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Index of the vertex this edge leads to.
    pub target: usize,
    /// Length of the edge.
    pub distance: Fixed,
}

/// Visibility graph for one observer's obstacle layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityGraph {
    vertices: Vec<Vec2Fixed>,
    /// Adjacency lists, indexed like `vertices`.
    edges: Vec<Vec<Edge>>,
}

impl VisibilityGraph {
    /// Build the graph for `obstacles` on a `width` × `height` battlefield.
    ///
    /// `passable` says whether a pawn may stand on a tile; corner vertices on
    /// tiles it rejects are skipped. The graph is only returned once complete.
    pub fn build(
        obstacles: &[Obstacle],
        width: u32,
        height: u32,
        passable: impl Fn(Tile) -> bool,
    ) -> Result<Self> {
        let mut graph = Self::default();
        graph.vertices.try_reserve(obstacles.len() * 4)?;

        for obstacle in obstacles {
            let corners = [
                (obstacle.left - PAWN_RADIUS, obstacle.top - PAWN_RADIUS),
                (obstacle.right + PAWN_RADIUS, obstacle.top - PAWN_RADIUS),
                (obstacle.left - PAWN_RADIUS, obstacle.bottom + PAWN_RADIUS),
                (obstacle.right + PAWN_RADIUS, obstacle.bottom + PAWN_RADIUS),
            ];

            for (x, y) in corners {
                let vertex = Vec2Fixed::new(x, y);
                let on_field = Tile::containing(vertex)
                    .is_some_and(|tile| tile.x < width && tile.y < height && passable(tile));
                if on_field && !graph.vertices.contains(&vertex) {
                    graph.vertices.push(vertex);
                }
            }
        }

        graph.edges.try_reserve(graph.vertices.len())?;
        for _ in 0..graph.vertices.len() {
            graph.edges.push(Vec::new());
        }
        for index in 0..graph.vertices.len() {
            graph.link(index, index, obstacles)?;
        }

        tracing::trace!(
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            "Built visibility graph"
        );
        Ok(graph)
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of undirected edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// Vertex positions.
    #[must_use]
    pub fn vertices(&self) -> &[Vec2Fixed] {
        &self.vertices
    }

    /// Edges leaving a vertex.
    #[must_use]
    pub fn edges(&self, vertex: usize) -> &[Edge] {
        self.edges
            .get(vertex)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Index of the vertex at exactly `position`.
    #[must_use]
    pub fn find(&self, position: Vec2Fixed) -> Option<usize> {
        self.vertices.iter().position(|&vertex| vertex == position)
    }

    /// Start a query session for attaching temporary endpoints.
    pub fn query<'g, 'o>(&'g mut self, obstacles: &'o [Obstacle]) -> PathQuery<'g, 'o> {
        let base = self.vertices.len();
        PathQuery {
            graph: self,
            obstacles,
            base,
        }
    }

    /// Join vertex `index` with every vertex before `limit` it can see.
    fn link(&mut self, index: usize, limit: usize, obstacles: &[Obstacle]) -> Result<()> {
        let origin = self.vertices[index];
        for other in 0..limit {
            let target = self.vertices[other];
            if !path_visible(origin, target, obstacles) {
                continue;
            }

            let distance = origin.distance(target);
            self.edges[index].try_reserve(1)?;
            self.edges[other].try_reserve(1)?;
            self.edges[index].push(Edge {
                target: other,
                distance,
            });
            self.edges[other].push(Edge {
                target: index,
                distance,
            });
        }
        Ok(())
    }

    /// Remove every vertex from `base` on, together with the edges that
    /// reference them.
    fn detach(&mut self, base: usize) {
        self.vertices.truncate(base);
        self.edges.truncate(base);
        for list in &mut self.edges {
            // Temporary edges are always appended after the permanent ones
            while list.last().is_some_and(|edge| edge.target >= base) {
                list.pop();
            }
        }
    }
}

/// Scoped session that owns temporary query vertices.
///
/// Holding the graph mutably for the whole session keeps other queries out.
#[derive(Debug)]
pub struct PathQuery<'g, 'o> {
    graph: &'g mut VisibilityGraph,
    obstacles: &'o [Obstacle],
    base: usize,
}

impl PathQuery<'_, '_> {
    /// Vertex index for `position`, attaching a temporary vertex linked to
    /// everything it can see when no vertex sits there yet.
    pub fn endpoint(&mut self, position: Vec2Fixed) -> Result<usize> {
        if let Some(index) = self.graph.find(position) {
            return Ok(index);
        }

        let index = self.graph.vertices.len();
        self.graph.vertices.try_reserve(1)?;
        self.graph.edges.try_reserve(1)?;
        self.graph.vertices.push(position);
        self.graph.edges.push(Vec::new());
        self.graph.link(index, index, self.obstacles)?;
        Ok(index)
    }

    /// The graph including temporary vertices.
    #[must_use]
    pub fn graph(&self) -> &VisibilityGraph {
        self.graph
    }

    /// Obstacles the session links against.
    #[must_use]
    pub fn obstacles(&self) -> &[Obstacle] {
        self.obstacles
    }
}

impl Drop for PathQuery<'_, '_> {
    fn drop(&mut self) {
        self.graph.detach(self.base);
    }
}
