//! Layered (Sugiyama-style) placement of an acyclic node/edge set.
//!
//! The pipeline is the usual one: longest-path ranking, splitting of edges
//! that skip ranks into chains of virtual vertices, barycenter sweeps to
//! reduce crossings, then coordinate assignment along the cross axis with
//! minimum separations. Coordinates are computed for node centers and
//! converted to top-left corners at the end.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::debug;

use crate::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub node_width: f32,
    pub base_height: f32,
    pub line_height: f32,
    pub chars_per_line: usize,
    pub node_separation: f32,
    pub rank_separation: f32,
    /// Spacing reserved around virtual vertices of long edges.
    pub edge_separation: f32,
    pub ordering_passes: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: NODE_WIDTH,
            base_height: NODE_BASE_HEIGHT,
            line_height: NODE_LINE_HEIGHT,
            chars_per_line: NODE_CHARS_PER_LINE,
            node_separation: NODE_SEPARATION,
            rank_separation: RANK_SEPARATION,
            edge_separation: EDGE_SEPARATION,
            ordering_passes: ORDERING_PASSES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub nodes: Vec<PositionedNode>,
    pub edges: Vec<Edge>,
    pub size: CanvasSize,
}

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("cannot lay out a cyclic graph (cycle through {})", .path.join(" -> "))]
    Cyclic { path: Vec<String> },
}

/// Estimated rendered height of a node whose label wraps at
/// `chars_per_line` characters. Empty labels still get one line.
pub fn estimate_node_height(label: &str, config: &LayoutConfig) -> f32 {
    let chars = label.chars().count();
    let lines = chars.div_ceil(config.chars_per_line.max(1)).max(1);
    (config.base_height + lines as f32 * config.line_height).max(1.0)
}

/// Lays out `nodes` in ranks following `direction`.
///
/// `edges` must be acyclic with respect to `nodes` (run
/// [`break_cycles`] first). Cyclic input is not rejected; ranks are then
/// assigned on a best-effort basis and the drawing may be degenerate. Use
/// [`try_layout`] to have the precondition checked.
///
/// The returned nodes keep the input order and all of their fields; edges
/// are returned unchanged. Self-loops and edges with unknown endpoints do
/// not influence placement.
pub fn layout(nodes: &[Node], edges: &[Edge], direction: Direction, config: &LayoutConfig) -> Layout {
    if nodes.is_empty() {
        return Layout {
            nodes: Vec::new(),
            edges: edges.to_vec(),
            size: CanvasSize::default(),
        };
    }

    let mut index: HashMap<&str, usize> = HashMap::new();
    for (idx, node) in nodes.iter().enumerate() {
        index.entry(node.id.as_str()).or_insert(idx);
    }

    let links: Vec<(usize, usize)> = edges
        .iter()
        .filter(|edge| !edge.is_self_loop())
        .filter_map(|edge| {
            let from = *index.get(edge.source.as_str())?;
            let to = *index.get(edge.target.as_str())?;
            Some((from, to))
        })
        .collect();

    let sizes: Vec<(f32, f32)> = nodes
        .iter()
        .map(|node| (config.node_width, estimate_node_height(&node.label, config)))
        .collect();

    let ranks = assign_ranks(nodes.len(), &links);
    let graph = LayerGraph::build(&ranks, &links);
    let layers = order_layers(&graph, graph.initial_layers(), config.ordering_passes);

    let horizontal = direction.is_horizontal();
    let (cross_extent, rank_extent): (Vec<f32>, Vec<f32>) = graph
        .real
        .iter()
        .map(|real| match real {
            Some(idx) => {
                let (width, height) = sizes[*idx];
                if horizontal { (height, width) } else { (width, height) }
            }
            None => (0.0, 0.0),
        })
        .unzip();

    let cross = assign_cross_coordinates(&graph, &layers, &cross_extent, config);
    let rank_centers = assign_rank_centers(&layers, &rank_extent, config, direction.is_reversed());

    let centers: Vec<Point> = (0..nodes.len())
        .map(|idx| {
            let along = rank_centers[ranks[idx]];
            if horizontal {
                Point { x: along, y: cross[idx] }
            } else {
                Point { x: cross[idx], y: along }
            }
        })
        .collect();

    let min_x = centers
        .iter()
        .zip(&sizes)
        .map(|(center, (width, _))| center.x - width / 2.0)
        .fold(f32::INFINITY, f32::min);
    let min_y = centers
        .iter()
        .zip(&sizes)
        .map(|(center, (_, height))| center.y - height / 2.0)
        .fold(f32::INFINITY, f32::min);

    let mut size = CanvasSize::default();
    let positioned: Vec<PositionedNode> = nodes
        .iter()
        .zip(centers.iter().zip(&sizes))
        .map(|(node, (center, &(width, height)))| {
            let position = Point {
                x: center.x - width / 2.0 - min_x,
                y: center.y - height / 2.0 - min_y,
            };
            size.width = size.width.max(position.x + width);
            size.height = size.height.max(position.y + height);
            PositionedNode {
                node: node.clone(),
                position,
                width,
                height,
            }
        })
        .collect();

    debug!(
        nodes = nodes.len(),
        edges = links.len(),
        ranks = layers.len(),
        virtual_vertices = graph.len() - nodes.len(),
        direction = %direction,
        "computed layered layout"
    );

    Layout {
        nodes: positioned,
        edges: edges.to_vec(),
        size,
    }
}

/// [`layout`] with the acyclicity precondition checked up front.
pub fn try_layout(
    nodes: &[Node],
    edges: &[Edge],
    direction: Direction,
    config: &LayoutConfig,
) -> Result<Layout, LayoutError> {
    if let Some(path) = find_cycle(nodes, edges) {
        return Err(LayoutError::Cyclic { path });
    }
    Ok(layout(nodes, edges, direction, config))
}

fn assign_ranks(count: usize, links: &[(usize, usize)]) -> Vec<usize> {
    let mut ranks = vec![0_usize; count];
    let mut indegree = vec![0_usize; count];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); count];

    for &(from, to) in links {
        indegree[to] += 1;
        outgoing[from].push(to);
    }

    let mut queue: VecDeque<usize> = (0..count).filter(|&idx| indegree[idx] == 0).collect();
    let mut visited = vec![false; count];

    while let Some(current) = queue.pop_front() {
        visited[current] = true;
        for &target in &outgoing[current] {
            ranks[target] = ranks[target].max(ranks[current] + 1);
            indegree[target] -= 1;
            if indegree[target] == 0 {
                queue.push_back(target);
            }
        }
    }

    // Only reachable when the acyclicity precondition was violated.
    if visited.iter().any(|seen| !seen) {
        for idx in 0..count {
            if visited[idx] {
                continue;
            }
            ranks[idx] = links
                .iter()
                .filter(|(_, to)| *to == idx)
                .map(|(from, _)| ranks[*from] + 1)
                .max()
                .unwrap_or(0);
        }
    }

    ranks
}

/// Ranked graph in which every edge joins adjacent ranks. Vertices
/// `0..node_count` are the real nodes; the rest are virtual.
struct LayerGraph {
    ranks: Vec<usize>,
    real: Vec<Option<usize>>,
    preds: Vec<Vec<usize>>,
    succs: Vec<Vec<usize>>,
}

impl LayerGraph {
    fn build(ranks: &[usize], links: &[(usize, usize)]) -> Self {
        let mut graph = Self {
            ranks: ranks.to_vec(),
            real: (0..ranks.len()).map(Some).collect(),
            preds: vec![Vec::new(); ranks.len()],
            succs: vec![Vec::new(); ranks.len()],
        };

        for &(from, to) in links {
            if ranks[to] <= ranks[from] {
                continue;
            }
            let mut previous = from;
            for rank in ranks[from] + 1..ranks[to] {
                let vertex = graph.push_virtual(rank);
                graph.connect(previous, vertex);
                previous = vertex;
            }
            graph.connect(previous, to);
        }

        graph
    }

    fn len(&self) -> usize {
        self.ranks.len()
    }

    fn push_virtual(&mut self, rank: usize) -> usize {
        self.ranks.push(rank);
        self.real.push(None);
        self.preds.push(Vec::new());
        self.succs.push(Vec::new());
        self.ranks.len() - 1
    }

    fn connect(&mut self, from: usize, to: usize) {
        self.succs[from].push(to);
        self.preds[to].push(from);
    }

    fn initial_layers(&self) -> Vec<Vec<usize>> {
        let depth = self.ranks.iter().copied().max().unwrap_or(0) + 1;
        let mut layers = vec![Vec::new(); depth];
        for (vertex, &rank) in self.ranks.iter().enumerate() {
            layers[rank].push(vertex);
        }
        layers
    }
}

fn order_layers(graph: &LayerGraph, mut layers: Vec<Vec<usize>>, passes: usize) -> Vec<Vec<usize>> {
    let mut order = vec![0_usize; graph.len()];
    record_order(&layers, &mut order);

    let mut best = layers.clone();
    let mut best_crossings = count_crossings(graph, &layers, &order);

    for pass in 0..passes {
        if best_crossings == 0 {
            break;
        }

        let downward = pass % 2 == 0;
        let sweep: Vec<usize> = if downward {
            (1..layers.len()).collect()
        } else {
            (0..layers.len().saturating_sub(1)).rev().collect()
        };
        let neighbours = if downward { &graph.preds } else { &graph.succs };

        for rank in sweep {
            let mut keyed: Vec<(f32, usize)> = layers[rank]
                .iter()
                .map(|&vertex| {
                    let adjacent = &neighbours[vertex];
                    let barycenter = if adjacent.is_empty() {
                        order[vertex] as f32
                    } else {
                        adjacent.iter().map(|&other| order[other] as f32).sum::<f32>()
                            / adjacent.len() as f32
                    };
                    (barycenter, vertex)
                })
                .collect();
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

            layers[rank] = keyed.into_iter().map(|(_, vertex)| vertex).collect();
            for (idx, &vertex) in layers[rank].iter().enumerate() {
                order[vertex] = idx;
            }
        }

        let crossings = count_crossings(graph, &layers, &order);
        if crossings < best_crossings {
            best = layers.clone();
            best_crossings = crossings;
        }
    }

    best
}

fn record_order(layers: &[Vec<usize>], order: &mut [usize]) {
    for layer in layers {
        for (idx, &vertex) in layer.iter().enumerate() {
            order[vertex] = idx;
        }
    }
}

fn count_crossings(graph: &LayerGraph, layers: &[Vec<usize>], order: &[usize]) -> usize {
    let mut total = 0;
    for layer in layers {
        let segments: Vec<(usize, usize)> = layer
            .iter()
            .flat_map(|&vertex| {
                graph.succs[vertex]
                    .iter()
                    .map(move |&target| (order[vertex], order[target]))
            })
            .collect();

        for (idx, &(top_a, bottom_a)) in segments.iter().enumerate() {
            for &(top_b, bottom_b) in &segments[idx + 1..] {
                if (top_a < top_b && bottom_a > bottom_b) || (top_a > top_b && bottom_a < bottom_b) {
                    total += 1;
                }
            }
        }
    }
    total
}

fn assign_cross_coordinates(
    graph: &LayerGraph,
    layers: &[Vec<usize>],
    extent: &[f32],
    config: &LayoutConfig,
) -> Vec<f32> {
    let half_gap = |vertex: usize| {
        if graph.real[vertex].is_some() {
            config.node_separation / 2.0
        } else {
            config.edge_separation / 2.0
        }
    };
    let gap = |a: usize, b: usize| (extent[a] + extent[b]) / 2.0 + half_gap(a) + half_gap(b);

    let mut coords = vec![0.0_f32; graph.len()];

    for layer in layers {
        let mut cursor = 0.0_f32;
        for (idx, &vertex) in layer.iter().enumerate() {
            if idx > 0 {
                cursor += gap(layer[idx - 1], vertex);
            }
            coords[vertex] = cursor;
        }
        let shift = cursor / 2.0;
        for &vertex in layer {
            coords[vertex] -= shift;
        }
    }

    for pass in 0..config.ordering_passes {
        let downward = pass % 2 == 0;
        let neighbours = if downward { &graph.preds } else { &graph.succs };
        let sweep: Vec<usize> = if downward {
            (1..layers.len()).collect()
        } else {
            (0..layers.len().saturating_sub(1)).rev().collect()
        };

        for rank in sweep {
            let layer = &layers[rank];
            let desired: Vec<f32> = layer
                .iter()
                .map(|&vertex| {
                    let adjacent = &neighbours[vertex];
                    if adjacent.is_empty() {
                        coords[vertex]
                    } else {
                        adjacent.iter().map(|&other| coords[other]).sum::<f32>() / adjacent.len() as f32
                    }
                })
                .collect();

            let placed = place_with_separation(layer, &desired, gap);
            for (&vertex, value) in layer.iter().zip(placed) {
                coords[vertex] = value;
            }
        }
    }

    coords
}

/// Moves each vertex as close to its desired coordinate as the minimum gaps
/// allow, averaging a left-anchored and a right-anchored placement.
fn place_with_separation(layer: &[usize], desired: &[f32], gap: impl Fn(usize, usize) -> f32) -> Vec<f32> {
    let count = layer.len();
    if count == 0 {
        return Vec::new();
    }

    let mut forward = desired.to_vec();
    for idx in 1..count {
        forward[idx] = forward[idx].max(forward[idx - 1] + gap(layer[idx - 1], layer[idx]));
    }

    let mut backward = desired.to_vec();
    for idx in (0..count - 1).rev() {
        backward[idx] = backward[idx].min(backward[idx + 1] - gap(layer[idx], layer[idx + 1]));
    }

    forward
        .into_iter()
        .zip(backward)
        .map(|(left, right)| (left + right) / 2.0)
        .collect()
}

fn assign_rank_centers(layers: &[Vec<usize>], extent: &[f32], config: &LayoutConfig, reversed: bool) -> Vec<f32> {
    let thickness: Vec<f32> = layers
        .iter()
        .map(|layer| layer.iter().map(|&vertex| extent[vertex]).fold(0.0, f32::max))
        .collect();

    let mut centers = Vec::with_capacity(layers.len());
    let mut cursor = 0.0_f32;
    for (rank, &span) in thickness.iter().enumerate() {
        if rank > 0 {
            cursor += thickness[rank - 1] / 2.0 + config.rank_separation + span / 2.0;
        } else {
            cursor = span / 2.0;
        }
        centers.push(cursor);
    }

    if reversed {
        let total = cursor + thickness.last().copied().unwrap_or(0.0) / 2.0;
        for center in &mut centers {
            *center = total - *center;
        }
    }

    centers
}
