//! Boundary tracing from the edge raster, with layered fallbacks.
//!
//! The primary strategy is a Moore-neighborhood walk around the object
//! outline. When an edge raster is too fragmented for the walk to get
//! anywhere, an adjacency-graph walk over all edge pixels takes over,
//! and as a last resort the edge pixels are collected and ordered into
//! an approximate outline. Strategies form an ordered list of pure
//! functions over the raster; each is tried only if the previous one
//! produced fewer than [`MIN_ACCEPTED_POINTS`] points.
//!
//! Tracing never fails the pipeline: a degenerate result downgrades
//! mask building to its opaque fallback and is reported via
//! diagnostics.

use std::collections::{HashMap, HashSet, VecDeque};

use image::{GrayImage, Luma};
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

use crate::edge::EDGE_GAP;
use crate::types::ContourPath;

/// Minimum point count for a strategy's output to be accepted.
pub const MIN_ACCEPTED_POINTS: usize = 10;
/// Minimum path length before the Moore walk may close on its start.
const CLOSURE_MIN_POINTS: usize = 30;
/// Chebyshev distance to the start within which the walk counts as closed.
const CLOSURE_DISTANCE: i64 = 2;
/// Hard cap on the graph-walk path length.
const GRAPH_WALK_CAP: usize = 3000;

/// Clockwise Moore neighborhood, starting east (y grows downward).
const DIRECTIONS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Which tracing strategy produced the outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceStrategy {
    /// Clockwise 8-connected boundary walk.
    MooreNeighborhood,
    /// Adjacency-graph walk over all edge pixels.
    GraphWalk,
    /// Sorted top/bottom collection of all edge pixels.
    BoundaryCollection,
}

impl std::fmt::Display for TraceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MooreNeighborhood => write!(f, "moore-neighborhood"),
            Self::GraphWalk => write!(f, "graph-walk"),
            Self::BoundaryCollection => write!(f, "boundary-collection"),
        }
    }
}

/// Result of tracing: the ROI-local pixel chain and how it was found.
#[derive(Debug, Clone)]
pub struct TraceOutcome {
    /// Ordered boundary pixels in ROI-local coordinates.
    pub points: Vec<(u32, u32)>,
    /// Strategy that produced the chain.
    pub strategy: TraceStrategy,
    /// Edge pixel count of the raster before gap filling.
    pub raw_edge_pixels: usize,
}

/// Whether a raster value marks an edge (detector output or filled gap).
const fn is_edge(value: u8) -> bool {
    value > 0
}

/// Fill 1-pixel gaps: promote non-edge pixels with at least two edge
/// neighbors, improving connectivity for the walk.
#[must_use]
pub fn fill_gaps(edges: &GrayImage) -> GrayImage {
    let (w, h) = (edges.width(), edges.height());
    let mut out = edges.clone();
    for y in 0..h {
        for x in 0..w {
            if is_edge(edges.get_pixel(x, y).0[0]) {
                continue;
            }
            let mut neighbors = 0;
            for (dx, dy) in DIRECTIONS {
                let nx = i64::from(x) + dx;
                let ny = i64::from(y) + dy;
                if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                if is_edge(edges.get_pixel(nx as u32, ny as u32).0[0]) {
                    neighbors += 1;
                }
            }
            if neighbors >= 2 {
                out.put_pixel(x, y, Luma([EDGE_GAP]));
            }
        }
    }
    out
}

/// The topmost row's leftmost edge pixel, if any.
fn find_start(edges: &GrayImage) -> Option<(u32, u32)> {
    for y in 0..edges.height() {
        for x in 0..edges.width() {
            if is_edge(edges.get_pixel(x, y).0[0]) {
                return Some((x, y));
            }
        }
    }
    None
}

/// Clockwise Moore-neighborhood walk from the start pixel.
///
/// At each step the 8 directions are scanned starting from the last
/// successful one; the walk advances to the first unvisited edge pixel.
/// Once the path is long enough, returning near the start closes it.
fn trace_moore(edges: &GrayImage) -> Vec<(u32, u32)> {
    let (w, h) = (edges.width(), edges.height());
    let Some(start) = find_start(edges) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut visited: HashSet<(u32, u32)> = HashSet::from([start]);
    let mut current = start;
    let mut last_dir = 0;

    loop {
        let mut advanced = false;
        for offset in 0..8 {
            let dir = (last_dir + offset) % 8;
            let (dx, dy) = DIRECTIONS[dir];
            let nx = i64::from(current.0) + dx;
            let ny = i64::from(current.1) + dy;
            if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                continue;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let next = (nx as u32, ny as u32);
            if is_edge(edges.get_pixel(next.0, next.1).0[0]) && !visited.contains(&next) {
                visited.insert(next);
                path.push(next);
                current = next;
                last_dir = dir;
                advanced = true;
                break;
            }
        }
        if !advanced {
            break;
        }
        if path.len() >= CLOSURE_MIN_POINTS {
            let dx = (i64::from(current.0) - i64::from(start.0)).abs();
            let dy = (i64::from(current.1) - i64::from(start.1)).abs();
            if dx.max(dy) <= CLOSURE_DISTANCE {
                break;
            }
        }
    }
    path
}

/// Walk an explicit adjacency graph of edge pixels, preferring
/// unvisited neighbors and falling back to the oldest pixel seen but
/// not yet walked. Capped at [`GRAPH_WALK_CAP`] points.
fn trace_graph_walk(edges: &GrayImage) -> Vec<(u32, u32)> {
    let (w, h) = (edges.width(), edges.height());
    let mut graph: UnGraph<(u32, u32), ()> = UnGraph::new_undirected();
    let mut nodes: HashMap<(u32, u32), NodeIndex> = HashMap::new();

    // Nodes and edges in raster order keeps the walk deterministic.
    for y in 0..h {
        for x in 0..w {
            if is_edge(edges.get_pixel(x, y).0[0]) {
                nodes.insert((x, y), graph.add_node((x, y)));
            }
        }
    }
    for y in 0..h {
        for x in 0..w {
            let Some(&here) = nodes.get(&(x, y)) else {
                continue;
            };
            for (dx, dy) in DIRECTIONS {
                let nx = i64::from(x) + dx;
                let ny = i64::from(y) + dy;
                if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let neighbor = (nx as u32, ny as u32);
                // Each undirected edge added once.
                if neighbor > (x, y)
                    && let Some(&there) = nodes.get(&neighbor)
                {
                    graph.add_edge(here, there, ());
                }
            }
        }
    }

    let Some(start) = find_start(edges) else {
        return Vec::new();
    };
    let Some(&start_idx) = nodes.get(&start) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut visited: HashSet<NodeIndex> = HashSet::from([start_idx]);
    let mut pending: VecDeque<NodeIndex> = VecDeque::new();
    let mut current = start_idx;

    while path.len() < GRAPH_WALK_CAP {
        let mut unvisited = graph
            .neighbors(current)
            .filter(|n| !visited.contains(n))
            .collect::<Vec<_>>();
        // neighbors() yields most-recent edges first; restore raster order.
        unvisited.sort_unstable_by_key(|&n| {
            let (x, y) = graph[n];
            (y, x)
        });
        let next = if let Some(&first) = unvisited.first() {
            pending.extend(unvisited.iter().skip(1).copied());
            first
        } else if let Some(revisit) = pending.pop_front() {
            if visited.contains(&revisit) {
                continue;
            }
            revisit
        } else {
            break;
        };
        visited.insert(next);
        path.push(graph[next]);
        current = next;
    }
    path
}

/// Last-resort outline: every edge pixel, split at the ROI midline,
/// top half ordered left-to-right and bottom half right-to-left.
///
/// Not topologically rigorous, but it always yields a closed-ish loop
/// around whatever the detector found.
fn collect_boundary(edges: &GrayImage) -> Vec<(u32, u32)> {
    let mid = edges.height() / 2;
    let mut top = Vec::new();
    let mut bottom = Vec::new();
    for y in 0..edges.height() {
        for x in 0..edges.width() {
            if is_edge(edges.get_pixel(x, y).0[0]) {
                if y < mid {
                    top.push((x, y));
                } else {
                    bottom.push((x, y));
                }
            }
        }
    }
    top.sort_unstable();
    bottom.sort_unstable_by(|a, b| b.cmp(a));

    let mut seen = HashSet::new();
    top.into_iter()
        .chain(bottom)
        .filter(|p| seen.insert(*p))
        .collect()
}

/// Trace the object boundary, trying each strategy in order.
///
/// Gap filling runs first to improve connectivity. The first strategy
/// producing at least [`MIN_ACCEPTED_POINTS`] points wins; if none
/// does, the longest result is returned and downstream stages degrade
/// gracefully.
#[must_use]
pub fn trace(edges: &GrayImage) -> TraceOutcome {
    let raw_edge_pixels = edges.pixels().filter(|p| is_edge(p.0[0])).count();
    let filled = fill_gaps(edges);

    let strategies: [(TraceStrategy, fn(&GrayImage) -> Vec<(u32, u32)>); 3] = [
        (TraceStrategy::MooreNeighborhood, trace_moore),
        (TraceStrategy::GraphWalk, trace_graph_walk),
        (TraceStrategy::BoundaryCollection, collect_boundary),
    ];

    let mut best: Option<(TraceStrategy, Vec<(u32, u32)>)> = None;
    for (strategy, run) in strategies {
        let points = run(&filled);
        if points.len() >= MIN_ACCEPTED_POINTS {
            return TraceOutcome {
                points,
                strategy,
                raw_edge_pixels,
            };
        }
        if best
            .as_ref()
            .is_none_or(|(_, b)| points.len() > b.len())
        {
            best = Some((strategy, points));
        }
    }
    let (strategy, points) = best.unwrap_or((TraceStrategy::MooreNeighborhood, Vec::new()));
    TraceOutcome {
        points,
        strategy,
        raw_edge_pixels,
    }
}

/// Plausibility check on the simplified contour.
///
/// A failed validation never aborts the pipeline; it is surfaced via
/// diagnostics while mask building degrades gracefully.
#[must_use]
pub fn validate(path: &ContourPath, raw_edge_pixels: usize) -> bool {
    path.len() >= 8
        && path.len() <= 1000
        && path.len() < raw_edge_pixels
        && path.corner_count() + path.curve_count() > 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::edge::EDGE_STRONG;

    /// Hollow rectangle ring of edge pixels.
    fn ring(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        let mut img = GrayImage::new(w, h);
        for x in x0..=x1 {
            img.put_pixel(x, y0, Luma([EDGE_STRONG]));
            img.put_pixel(x, y1, Luma([EDGE_STRONG]));
        }
        for y in y0..=y1 {
            img.put_pixel(x0, y, Luma([EDGE_STRONG]));
            img.put_pixel(x1, y, Luma([EDGE_STRONG]));
        }
        img
    }

    #[test]
    fn empty_raster_traces_nothing() {
        let outcome = trace(&GrayImage::new(20, 20));
        assert!(outcome.points.is_empty());
        assert_eq!(outcome.raw_edge_pixels, 0);
    }

    #[test]
    fn moore_walk_follows_a_ring() {
        let img = ring(30, 30, 5, 5, 24, 24);
        let outcome = trace(&img);
        assert_eq!(outcome.strategy, TraceStrategy::MooreNeighborhood);
        // The ring perimeter is 4*20 - 4 = 76 pixels; the walk should
        // cover most of it.
        assert!(
            outcome.points.len() > 50,
            "expected a long walk, got {} points",
            outcome.points.len(),
        );
    }

    #[test]
    fn moore_walk_starts_at_topmost_leftmost_pixel() {
        // A bare L shape with no gap-fill candidates on the top row.
        let mut img = GrayImage::new(20, 20);
        for x in 3..15 {
            img.put_pixel(x, 4, Luma([EDGE_STRONG]));
        }
        let points = super::trace_moore(&img);
        assert_eq!(points[0], (3, 4));
    }

    #[test]
    fn gap_fill_promotes_bridging_pixels() {
        // Horizontal line with a 1-pixel hole at x=5.
        let mut img = GrayImage::new(11, 3);
        for x in 0..11 {
            if x != 5 {
                img.put_pixel(x, 1, Luma([EDGE_STRONG]));
            }
        }
        let filled = fill_gaps(&img);
        assert_eq!(filled.get_pixel(5, 1).0[0], EDGE_GAP);
        // Isolated empty corners stay empty.
        assert_eq!(filled.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn graph_walk_covers_fragmented_edges() {
        // A short bare segment: the graph walk orders every reachable
        // pixel starting from the topmost-leftmost one.
        let mut img = GrayImage::new(20, 20);
        for x in 2..8 {
            img.put_pixel(x, 3, Luma([EDGE_STRONG]));
        }
        let points = super::trace_graph_walk(&img);
        assert_eq!(points.len(), 6);
        assert_eq!(points[0], (2, 3));
    }

    #[test]
    fn boundary_collection_orders_top_then_bottom() {
        let mut img = GrayImage::new(10, 10);
        img.put_pixel(2, 1, Luma([EDGE_STRONG]));
        img.put_pixel(7, 1, Luma([EDGE_STRONG]));
        img.put_pixel(2, 8, Luma([EDGE_STRONG]));
        img.put_pixel(7, 8, Luma([EDGE_STRONG]));
        let points = super::collect_boundary(&img);
        assert_eq!(points, vec![(2, 1), (7, 1), (7, 8), (2, 8)]);
    }

    #[test]
    fn fallback_selects_longest_when_all_degenerate() {
        // 4 scattered pixels: no strategy reaches 10 points.
        let mut img = GrayImage::new(20, 20);
        img.put_pixel(1, 1, Luma([EDGE_STRONG]));
        img.put_pixel(18, 1, Luma([EDGE_STRONG]));
        img.put_pixel(1, 18, Luma([EDGE_STRONG]));
        img.put_pixel(18, 18, Luma([EDGE_STRONG]));
        let outcome = trace(&img);
        assert!(outcome.points.len() < MIN_ACCEPTED_POINTS);
        assert_eq!(outcome.points.len(), 4);
    }

    #[test]
    fn validation_requires_shape() {
        use crate::types::{ContourPoint, Point, PointClass};
        let straight = ContourPath::new(
            (0..20)
                .map(|i| ContourPoint {
                    point: Point::new(f64::from(i), 0.0),
                    class: PointClass::Edge,
                })
                .collect(),
        );
        // No corner or curve: implausible outline.
        assert!(!validate(&straight, 1000));

        let mut points = straight.into_points();
        points[10].class = PointClass::Corner;
        let shaped = ContourPath::new(points);
        assert!(validate(&shaped, 1000));
        // Must have fewer points than raw edge pixels.
        assert!(!validate(&shaped, 20));
    }
}
