//! Spectral draft: PivotMDS over BFS hop distances.
//!
//! Produces a rough global placement that the polish phase refines. The
//! draft runs on the leaf graph (compounds collapse to one representative
//! leaf) and unifies disconnected components through a synthetic hub so a
//! single distance matrix covers the whole graph.

use nalgebra::{DMatrix, DVector};

use crate::graph::{Graph, Vec2};
use crate::rng::XorShift64Star;

use super::{ArrangeOptions, ConstraintProcessor};

const MAX_PIVOTS: usize = 50;
const UNREACHABLE_PENALTY_FACTOR: f64 = 1.5;
const JITTER: f64 = 0.5;

pub(crate) fn draft(
    graph: &mut Graph,
    options: &ArrangeOptions,
    processor: &ConstraintProcessor,
    rng: &mut XorShift64Star,
) {
    let leaves: Vec<usize> = (0..graph.nodes.len())
        .filter(|&i| !graph.nodes[i].is_compound())
        .collect();
    if leaves.len() < 2 {
        graph.update_compound_bounds();
        return;
    }
    if leaves.len() == 2 {
        place_pair(graph, &leaves, options, processor);
        graph.update_compound_bounds();
        return;
    }

    let mut dense_of = vec![usize::MAX; graph.nodes.len()];
    for (dense, &idx) in leaves.iter().enumerate() {
        dense_of[idx] = dense;
    }

    // Leaf adjacency; edges incident to a compound are remapped to one of
    // its descendant leaves.
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); leaves.len()];
    for e in &graph.edges {
        if e.source.0 >= graph.nodes.len() || e.target.0 >= graph.nodes.len() {
            continue;
        }
        let a = dense_of[graph.representative_leaf(e.source.0)];
        let b = dense_of[graph.representative_leaf(e.target.0)];
        if a == b || a == usize::MAX || b == usize::MAX {
            continue;
        }
        adjacency[a].push(b);
        adjacency[b].push(a);
    }
    for list in &mut adjacency {
        list.sort_unstable();
        list.dedup();
    }

    // A synthetic hub joined to the minimum-degree node of every component
    // keeps all hop distances finite.
    let components = components(&adjacency);
    if components.len() > 1 {
        let hub = adjacency.len();
        adjacency.push(Vec::new());
        for component in &components {
            let mut best = component[0];
            for &i in component {
                if adjacency[i].len() < adjacency[best].len() {
                    best = i;
                }
            }
            adjacency[hub].push(best);
            adjacency[best].push(hub);
        }
    }
    let node_count = adjacency.len();

    let pivot_count = if node_count <= MAX_PIVOTS {
        node_count
    } else {
        MAX_PIVOTS.max((node_count as f64).sqrt().ceil() as usize)
    };

    // MaxMin farthest-point pivot sampling with per-pivot BFS rows.
    let separation = options.ideal_edge_length.max(1.0);
    let mut distances = DMatrix::<f64>::zeros(pivot_count, node_count);
    let mut min_dist = vec![f64::INFINITY; node_count];
    let mut pivot = rng.next_usize(node_count);
    for row in 0..pivot_count {
        let hops = bfs(&adjacency, pivot);
        let eccentricity = hops.iter().copied().filter(|&h| h >= 0).max().unwrap_or(0);
        let penalty = UNREACHABLE_PENALTY_FACTOR * eccentricity.max(1) as f64;
        let mut next = pivot;
        let mut best = f64::NEG_INFINITY;
        for i in 0..node_count {
            let d = if hops[i] < 0 { penalty } else { hops[i] as f64 };
            distances[(row, i)] = d * separation;
            min_dist[i] = min_dist[i].min(distances[(row, i)]);
            if min_dist[i] > best {
                best = min_dist[i];
                next = i;
            }
        }
        pivot = next;
    }

    // PivotMDS: double-center the squared distance rows, then project onto
    // the two dominant eigenvectors of the pivot covariance.
    let mut centered = distances;
    centered.apply(|v| *v = *v * *v);
    double_center(&mut centered);
    let covariance = &centered * centered.transpose();

    let Some((v1, lambda1)) = power_iteration(&covariance, options, rng) else {
        graph.update_compound_bounds();
        return;
    };
    let deflated = &covariance - (&v1 * v1.transpose()) * lambda1;
    let Some((v2, lambda2)) = power_iteration(&deflated, options, rng) else {
        graph.update_compound_bounds();
        return;
    };
    // Projecting a unit covariance eigenvector yields norm sqrt(lambda);
    // distance-true coordinates carry the Gram eigenvalue's square root,
    // one more root down.
    let mut xs = centered.transpose() * &v1;
    let mut ys = centered.transpose() * &v2;
    let scale_x = lambda1.abs().sqrt().sqrt();
    if scale_x > f64::EPSILON {
        xs /= scale_x;
    } else {
        // Zero eigenvalue, no variance on this axis.
        xs.fill(0.0);
    }
    let scale_y = lambda2.abs().sqrt().sqrt();
    if scale_y > f64::EPSILON {
        ys /= scale_y;
    } else {
        ys.fill(0.0);
    }

    for (dense, &idx) in leaves.iter().enumerate() {
        if processor.is_fixed(graph, idx) {
            continue;
        }
        let jx = rng.next_f64_signed() * JITTER;
        let jy = rng.next_f64_signed() * JITTER;
        if xs[dense].is_finite() && ys[dense].is_finite() {
            graph.nodes[idx].position = Vec2::new(
                xs[dense] * options.spectral_scale + jx,
                ys[dense] * options.spectral_scale + jy,
            );
        }
    }
    graph.update_compound_bounds();
}

fn place_pair(
    graph: &mut Graph,
    leaves: &[usize],
    options: &ArrangeOptions,
    processor: &ConstraintProcessor,
) {
    let (a, b) = (leaves[0], leaves[1]);
    let offset = graph.nodes[a].half_width()
        + graph.nodes[b].half_width()
        + options.ideal_edge_length;
    let anchor = graph.nodes[a].position;
    if !processor.is_fixed(graph, b) {
        graph.nodes[b].position = Vec2::new(anchor.x + offset, anchor.y);
    }
}

fn components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut seen = vec![false; adjacency.len()];
    let mut out = Vec::new();
    for start in 0..adjacency.len() {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut component = vec![start];
        let mut queue = std::collections::VecDeque::from([start]);
        while let Some(cur) = queue.pop_front() {
            for &next in &adjacency[cur] {
                if !seen[next] {
                    seen[next] = true;
                    component.push(next);
                    queue.push_back(next);
                }
            }
        }
        out.push(component);
    }
    out
}

/// Hop distances from `start`; `-1` marks unreachable nodes.
fn bfs(adjacency: &[Vec<usize>], start: usize) -> Vec<i64> {
    let mut dist = vec![-1i64; adjacency.len()];
    dist[start] = 0;
    let mut queue = std::collections::VecDeque::from([start]);
    while let Some(cur) = queue.pop_front() {
        for &next in &adjacency[cur] {
            if dist[next] < 0 {
                dist[next] = dist[cur] + 1;
                queue.push_back(next);
            }
        }
    }
    dist
}

fn double_center(m: &mut DMatrix<f64>) {
    let (rows, cols) = m.shape();
    if rows == 0 || cols == 0 {
        return;
    }
    let row_means: Vec<f64> = (0..rows).map(|i| m.row(i).sum() / cols as f64).collect();
    let col_means: Vec<f64> = (0..cols).map(|j| m.column(j).sum() / rows as f64).collect();
    let total_mean = row_means.iter().sum::<f64>() / rows as f64;
    for i in 0..rows {
        for j in 0..cols {
            m[(i, j)] = -0.5 * (m[(i, j)] - row_means[i] - col_means[j] + total_mean);
        }
    }
}

/// Dominant eigenpair of a symmetric matrix. Returns `None` when the
/// iteration degenerates (non-finite entries).
fn power_iteration(
    m: &DMatrix<f64>,
    options: &ArrangeOptions,
    rng: &mut XorShift64Star,
) -> Option<(DVector<f64>, f64)> {
    let k = m.nrows();
    if k == 0 {
        return None;
    }
    let mut v = DVector::from_fn(k, |_, _| rng.next_f64_signed());
    let norm = v.norm();
    if norm <= f64::EPSILON {
        v = DVector::zeros(k);
        v[0] = 1.0;
    } else {
        v /= norm;
    }
    let mut lambda = 0.0;
    for _ in 0..options.power_iterations {
        let mut next = m * &v;
        let norm = next.norm();
        if !norm.is_finite() {
            return None;
        }
        if norm <= f64::EPSILON {
            // Null operator; any unit vector is an eigenvector for 0.
            return Some((v, 0.0));
        }
        next /= norm;
        let alignment = v.dot(&next).abs();
        v = next;
        lambda = v.dot(&(m * &v));
        if (alignment - 1.0).abs() <= options.power_tolerance {
            break;
        }
    }
    if lambda.is_finite() { Some((v, lambda)) } else { None }
}
