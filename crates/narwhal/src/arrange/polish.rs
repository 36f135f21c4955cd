//! Force-directed polishing: grid-hash repulsion, square-law springs,
//! ranged gravity, geometric cooling.

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::graph::{Graph, Vec2};

use super::{ArrangeOptions, CancelToken, ConstraintProcessor};

const GRID_CELL_FLOOR: f64 = 100.0;
const GRAVITY_RANGE_FACTOR: f64 = 3.8;
const OVERLAP_EPSILON: f64 = 0.1;
const MIN_REPULSION_DISTANCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct PolishStats {
    pub iterations: usize,
    pub max_displacement: f64,
    pub converged: bool,
}

pub(crate) fn polish(
    graph: &mut Graph,
    processor: &ConstraintProcessor,
    options: &ArrangeOptions,
    token: &CancelToken,
) -> Result<PolishStats> {
    let n = graph.nodes.len();
    let mut stats = PolishStats::default();
    if n == 0 {
        return Ok(stats);
    }
    let cell = options
        .grid_cell_size
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or((4.0 * options.ideal_edge_length).max(GRID_CELL_FLOOR));
    let gravity_range = estimated_size(graph) * GRAVITY_RANGE_FACTOR;

    let mut temperature = options.initial_temperature;
    let half_initial = options.initial_temperature * 0.5;
    let mut displacements = vec![Vec2::ZERO; n];
    let mut previous = vec![Vec2::ZERO; n];

    for iteration in 0..options.max_iterations {
        if iteration % options.yield_period == 0 {
            token.check()?;
        }

        let grid = SpatialGrid::build(graph, cell);
        // Each worker computes the total repulsion on one node; slots are
        // disjoint, the join happens at collect.
        let graph_ref: &Graph = graph;
        let repulsion: Vec<Vec2> = (0..n)
            .into_par_iter()
            .map(|i| repulsion_on(graph_ref, &grid, i, cell, options))
            .collect();
        displacements.copy_from_slice(&repulsion);
        apply_springs(graph, options, &mut displacements);
        apply_gravity(graph, options, gravity_range, &mut displacements);

        // Residual forces measured before the clamp; once the temperature
        // cools below the threshold the clamped values satisfy any
        // comparison vacuously.
        let mut residual = 0.0f64;
        let mut swinging = 0.0f64;
        let mut traction = 0.0f64;
        for (i, node) in graph.nodes.iter().enumerate() {
            if node.is_compound() || processor.is_fixed(graph, i) {
                continue;
            }
            let d = displacements[i];
            if !d.is_finite() {
                continue;
            }
            residual = residual.max(d.length());
            swinging += (d - previous[i]).length();
            traction += (d + previous[i]).length() * 0.5;
            previous[i] = d;
        }

        processor.apply_to_displacements(graph, &mut displacements, temperature);

        let mut max_displacement = 0.0f64;
        for (i, node) in graph.nodes.iter_mut().enumerate() {
            if node.is_compound() || node.fixed {
                continue;
            }
            // Already clamped per axis to the temperature by the
            // displacement filter; equal clamps keep aligned groups equal.
            let d = displacements[i];
            if !d.is_finite() {
                continue;
            }
            node.position += d;
            max_displacement = max_displacement.max(d.length());
        }
        graph.update_compound_bounds();

        stats.iterations = iteration + 1;
        stats.max_displacement = max_displacement;
        // Settled means the residual forces fell below the threshold, or
        // the remaining motion is rebound inside the clamp (swinging above
        // traction) rather than steady drift.
        let settled = residual < options.energy_threshold
            || (iteration > 0 && swinging > traction);
        if max_displacement < options.energy_threshold && temperature < half_initial && settled {
            stats.converged = true;
            break;
        }
        temperature *= options.cooling_factor;
        if temperature < options.min_temperature {
            break;
        }
    }
    tracing::debug!(
        iterations = stats.iterations,
        converged = stats.converged,
        max_displacement = stats.max_displacement,
        "polish finished"
    );
    Ok(stats)
}

/// Average node extent; gravity only acts outside a multiple of it.
fn estimated_size(graph: &Graph) -> f64 {
    let leaves: Vec<&crate::graph::Node> = graph
        .nodes
        .iter()
        .filter(|n| !n.is_compound())
        .collect();
    if leaves.is_empty() {
        return 1.0;
    }
    let total: f64 = leaves.iter().map(|n| (n.width + n.height) * 0.5).sum();
    (total / (leaves.len() as f64).sqrt()).max(1.0)
}

fn repulsion_on(
    graph: &Graph,
    grid: &SpatialGrid,
    idx: usize,
    cell: f64,
    options: &ArrangeOptions,
) -> Vec2 {
    let a = &graph.nodes[idx];
    if a.is_compound() {
        return Vec2::ZERO;
    }
    let mut out = Vec2::ZERO;
    grid.for_neighbors(a.position, |j| {
        if j == idx {
            return;
        }
        let b = &graph.nodes[j];
        let mut delta = a.position - b.position;
        if delta.length_sq() < 1e-12 {
            delta = coincident_offset(idx, j);
        }
        let dist = delta.length().max(MIN_REPULSION_DISTANCE);
        let overlap = a.radius() + b.radius() - dist;
        let magnitude = if overlap > 0.0 {
            options.repulsion * options.repulsion * (overlap + OVERLAP_EPSILON)
        } else if dist <= cell {
            options.repulsion / (dist * dist)
        } else {
            return;
        };
        out += delta * (magnitude / dist);
    });
    out
}

/// Antisymmetric in the pair so coincident partners push apart instead of
/// drifting together.
fn coincident_offset(i: usize, j: usize) -> Vec2 {
    let (lo, hi) = (i.min(j), i.max(j));
    let angle = (lo.wrapping_mul(31) ^ hi) as f64 * 2.399963229728653;
    let v = Vec2::new(angle.cos(), angle.sin());
    if i <= j { v } else { -v }
}

fn apply_springs(graph: &Graph, options: &ArrangeOptions, displacements: &mut [Vec2]) {
    for edge in &graph.edges {
        let (s, t) = (edge.source.0, edge.target.0);
        if s == t || s >= graph.nodes.len() || t >= graph.nodes.len() {
            continue;
        }
        if graph.is_ancestor(s, t) || graph.is_ancestor(t, s) {
            continue;
        }
        let a = &graph.nodes[s];
        let b = &graph.nodes[t];
        let mut delta = b.position - a.position;
        if delta.length_sq() < 1e-12 {
            delta = coincident_offset(s, t);
        }
        let dist = delta.length();
        // Half-diagonals folded into the ideal so compound borders are not
        // pulled on top of each other.
        let effective_ideal = options.ideal_edge_length + a.radius() + b.radius();
        let magnitude = options.spring * edge.strength * (dist * dist) / effective_ideal;
        let force = delta * (magnitude / dist);
        distribute(graph, displacements, s, force);
        distribute(graph, displacements, t, -force);
    }
}

/// Adds a displacement to a node, spreading it over descendant leaves when
/// the node is a compound.
fn distribute(graph: &Graph, displacements: &mut [Vec2], idx: usize, d: Vec2) {
    if !graph.nodes[idx].is_compound() {
        displacements[idx] += d;
        return;
    }
    let mut leaves = Vec::new();
    graph.descendant_leaves(idx, &mut leaves);
    if leaves.is_empty() {
        return;
    }
    let share = d * (1.0 / leaves.len() as f64);
    for leaf in leaves {
        displacements[leaf] += share;
    }
}

fn apply_gravity(
    graph: &Graph,
    options: &ArrangeOptions,
    range: f64,
    displacements: &mut [Vec2],
) {
    for (i, node) in graph.nodes.iter().enumerate() {
        if node.is_compound() || node.fixed {
            continue;
        }
        if node.position.length() > range {
            displacements[i] += -node.position * options.gravity;
        }
    }
}

/// Uniform spatial hash over leaf nodes; queries visit the cell containing
/// the position plus its eight neighbors.
struct SpatialGrid {
    cell: f64,
    buckets: FxHashMap<(i64, i64), Vec<usize>>,
}

impl SpatialGrid {
    fn build(graph: &Graph, cell: f64) -> Self {
        let mut buckets: FxHashMap<(i64, i64), Vec<usize>> = FxHashMap::default();
        for (i, node) in graph.nodes.iter().enumerate() {
            if node.is_compound() {
                continue;
            }
            buckets.entry(Self::key(node.position, cell)).or_default().push(i);
        }
        Self { cell, buckets }
    }

    fn key(position: Vec2, cell: f64) -> (i64, i64) {
        ((position.x / cell).floor() as i64, (position.y / cell).floor() as i64)
    }

    fn for_neighbors(&self, position: Vec2, mut f: impl FnMut(usize)) {
        let (cx, cy) = Self::key(position, self.cell);
        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(bucket) = self.buckets.get(&(cx + dx, cy + dy)) {
                    for &i in bucket {
                        f(i);
                    }
                }
            }
        }
    }
}
