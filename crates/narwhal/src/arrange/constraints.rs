//! Placement constraints for the one-shot pipeline.
//!
//! Three shapes: fixed nodes, alignment groups (shared coordinate on one
//! axis), and relative placement (ordered pair with a minimum border gap).
//! The processor runs twice as a geometric pass (transform, enforce) and
//! once per polish iteration as a displacement filter.

use indexmap::IndexSet;

use crate::graph::{Axis, Constraint, Graph, Vec2};

#[derive(Debug, Clone, Copy)]
struct RelativeRule {
    first: usize,
    second: usize,
    axis: Axis,
    min_gap: f64,
}

#[derive(Debug, Default)]
pub(crate) struct ConstraintProcessor {
    fixed: IndexSet<usize>,
    alignments: Vec<(Axis, Vec<usize>)>,
    relatives: Vec<RelativeRule>,
}

impl ConstraintProcessor {
    pub(crate) fn new(constraints: &[Constraint]) -> Self {
        let mut processor = Self::default();
        for constraint in constraints {
            match constraint {
                Constraint::Fixed(id) => {
                    processor.fixed.insert(id.0);
                }
                Constraint::Alignment { nodes, axis } => {
                    if nodes.len() > 1 {
                        processor
                            .alignments
                            .push((*axis, nodes.iter().map(|n| n.0).collect()));
                    }
                }
                Constraint::Relative {
                    first,
                    second,
                    axis,
                    min_gap,
                } => {
                    if first != second {
                        processor.relatives.push(RelativeRule {
                            first: first.0,
                            second: second.0,
                            axis: *axis,
                            min_gap: *min_gap,
                        });
                    }
                }
            }
        }
        processor
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.fixed.is_empty() && self.alignments.is_empty() && self.relatives.is_empty()
    }

    pub(crate) fn is_fixed(&self, graph: &Graph, idx: usize) -> bool {
        self.fixed.contains(&idx) || graph.nodes[idx].fixed
    }

    /// Brings the draft into a constraint-consistent orientation: flips an
    /// axis when a majority of relative pairs point the wrong way, then
    /// averages alignment groups onto a shared coordinate.
    pub(crate) fn transform(&self, graph: &mut Graph) {
        if graph.nodes.is_empty() || self.is_empty() {
            return;
        }
        let mut flip_x = 0i32;
        let mut flip_y = 0i32;
        for rule in &self.relatives {
            let first = coordinate(graph, rule.first, rule.axis);
            let second = coordinate(graph, rule.second, rule.axis);
            let vote = if first >= second { 1 } else { -1 };
            match rule.axis {
                Axis::Horizontal => flip_x += vote,
                Axis::Vertical => flip_y += vote,
            }
        }
        if flip_x > 0 || flip_y > 0 {
            let center = match graph.bounding_rect() {
                Some(rect) => rect.center(),
                None => return,
            };
            for idx in 0..graph.nodes.len() {
                let node = &mut graph.nodes[idx];
                if node.is_compound() || self.fixed.contains(&idx) || node.fixed {
                    continue;
                }
                if flip_x > 0 {
                    node.position.x = 2.0 * center.x - node.position.x;
                }
                if flip_y > 0 {
                    node.position.y = 2.0 * center.y - node.position.y;
                }
            }
        }
        self.snap_alignments(graph);
        graph.update_compound_bounds();
    }

    /// Satisfies the constraints exactly: alignment snap, then a per-axis
    /// topological relaxation of the relative-placement DAG.
    pub(crate) fn enforce(&self, graph: &mut Graph) {
        if graph.nodes.is_empty() || self.is_empty() {
            return;
        }
        self.snap_alignments(graph);
        self.relax_relative(graph, Axis::Horizontal);
        self.relax_relative(graph, Axis::Vertical);
        graph.update_compound_bounds();
    }

    fn snap_alignments(&self, graph: &mut Graph) {
        for (axis, members) in &self.alignments {
            let coord = shared_axis(*axis);
            let valid: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&i| i < graph.nodes.len())
                .collect();
            if valid.len() < 2 {
                continue;
            }
            // A fixed member dictates the shared coordinate; otherwise the
            // group mean does.
            let target = match valid.iter().find(|&&i| self.is_fixed(graph, i)) {
                Some(&pinned) => coordinate(graph, pinned, coord),
                None => {
                    valid.iter().map(|&i| coordinate(graph, i, coord)).sum::<f64>()
                        / valid.len() as f64
                }
            };
            for &idx in &valid {
                if !self.is_fixed(graph, idx) {
                    set_coordinate(graph, idx, coord, target);
                }
            }
        }
        graph.update_compound_bounds();
    }

    /// Longest-path relaxation over the relative-placement DAG on one axis.
    /// A forward pass pushes successors ahead, a backward pass pulls
    /// predecessors back where a fixed successor cannot yield, and
    /// components without fixed members are recentered on their original
    /// midpoint.
    fn relax_relative(&self, graph: &mut Graph, axis: Axis) {
        let rules: Vec<&RelativeRule> = self
            .relatives
            .iter()
            .filter(|r| {
                r.axis == axis && r.first < graph.nodes.len() && r.second < graph.nodes.len()
            })
            .collect();
        if rules.is_empty() {
            return;
        }

        let mut keys: IndexSet<usize> = IndexSet::new();
        for rule in &rules {
            keys.insert(rule.first);
            keys.insert(rule.second);
        }
        let slot = |idx: usize| keys.get_index_of(&idx);

        let mut position: Vec<f64> = keys
            .iter()
            .map(|&i| coordinate(graph, i, axis))
            .collect();
        let original = position.clone();

        // Kahn ordering; nodes on cycles never enter the order and keep
        // their coordinates.
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); keys.len()];
        let mut indegree = vec![0usize; keys.len()];
        let mut gaps: Vec<(usize, usize, f64)> = Vec::new();
        for rule in &rules {
            let (Some(a), Some(b)) = (slot(rule.first), slot(rule.second)) else {
                continue;
            };
            let gap = center_gap(graph, rule);
            successors[a].push(b);
            indegree[b] += 1;
            gaps.push((a, b, gap));
        }
        let mut queue: std::collections::VecDeque<usize> = (0..keys.len())
            .filter(|&i| indegree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(keys.len());
        while let Some(cur) = queue.pop_front() {
            order.push(cur);
            for &next in &successors[cur] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        let pinned: Vec<bool> = keys.iter().map(|&i| self.is_fixed(graph, i)).collect();
        for &cur in &order {
            for &(a, b, gap) in &gaps {
                if a == cur && !pinned[b] {
                    position[b] = position[b].max(position[a] + gap);
                }
            }
        }
        for &cur in order.iter().rev() {
            for &(a, b, gap) in &gaps {
                if b == cur && !pinned[a] {
                    position[a] = position[a].min(position[b] - gap);
                }
            }
        }

        // Recenter free components so enforcement does not drift the layout.
        let components = key_components(keys.len(), &gaps);
        for component in components {
            if component.iter().any(|&i| pinned[i]) {
                continue;
            }
            let before: f64 =
                component.iter().map(|&i| original[i]).sum::<f64>() / component.len() as f64;
            let after: f64 =
                component.iter().map(|&i| position[i]).sum::<f64>() / component.len() as f64;
            let shift = before - after;
            for &i in &component {
                position[i] += shift;
            }
        }

        for (slot_idx, &node_idx) in keys.iter().enumerate() {
            if !pinned[slot_idx] {
                set_coordinate(graph, node_idx, axis, position[slot_idx]);
            }
        }
    }

    /// Per-iteration displacement filter for the polish loop: alignment
    /// groups move together, violated relative gaps are corrected, fixed
    /// nodes end with zero displacement, and everything is clamped to the
    /// step budget.
    pub(crate) fn apply_to_displacements(
        &self,
        graph: &Graph,
        displacements: &mut [Vec2],
        max_step: f64,
    ) {
        for (axis, members) in &self.alignments {
            let valid: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&i| i < displacements.len() && !self.is_fixed(graph, i))
                .collect();
            if valid.is_empty() {
                continue;
            }
            match axis {
                Axis::Horizontal => {
                    let avg =
                        valid.iter().map(|&i| displacements[i].y).sum::<f64>() / valid.len() as f64;
                    for &i in &valid {
                        displacements[i].y = avg;
                    }
                }
                Axis::Vertical => {
                    let avg =
                        valid.iter().map(|&i| displacements[i].x).sum::<f64>() / valid.len() as f64;
                    for &i in &valid {
                        displacements[i].x = avg;
                    }
                }
            }
        }

        for _ in 0..2 {
            for rule in &self.relatives {
                if rule.first >= displacements.len() || rule.second >= displacements.len() {
                    continue;
                }
                let gap = center_gap(graph, rule);
                let projected = coordinate(graph, rule.second, rule.axis)
                    + axis_component(displacements[rule.second], rule.axis)
                    - coordinate(graph, rule.first, rule.axis)
                    - axis_component(displacements[rule.first], rule.axis);
                if projected >= gap {
                    continue;
                }
                let shortfall = gap - projected;
                let first_pinned = self.is_fixed(graph, rule.first);
                let second_pinned = self.is_fixed(graph, rule.second);
                match (first_pinned, second_pinned) {
                    (true, true) => {}
                    (true, false) => {
                        add_axis(&mut displacements[rule.second], rule.axis, shortfall);
                    }
                    (false, true) => {
                        add_axis(&mut displacements[rule.first], rule.axis, -shortfall);
                    }
                    (false, false) => {
                        add_axis(&mut displacements[rule.first], rule.axis, -shortfall * 0.5);
                        add_axis(&mut displacements[rule.second], rule.axis, shortfall * 0.5);
                    }
                }
            }
        }

        for idx in 0..displacements.len() {
            if self.is_fixed(graph, idx) {
                displacements[idx] = Vec2::ZERO;
            } else {
                displacements[idx].x = displacements[idx].x.clamp(-max_step, max_step);
                displacements[idx].y = displacements[idx].y.clamp(-max_step, max_step);
            }
        }
    }
}

/// Required center-to-center distance so the borders keep `min_gap` between
/// them.
fn center_gap(graph: &Graph, rule: &RelativeRule) -> f64 {
    let a = &graph.nodes[rule.first];
    let b = &graph.nodes[rule.second];
    match rule.axis {
        Axis::Horizontal => rule.min_gap + a.half_width() + b.half_width(),
        Axis::Vertical => rule.min_gap + a.half_height() + b.half_height(),
    }
}

fn coordinate(graph: &Graph, idx: usize, axis: Axis) -> f64 {
    match axis {
        Axis::Horizontal => graph.nodes[idx].position.x,
        Axis::Vertical => graph.nodes[idx].position.y,
    }
}

/// Coordinate a group aligned on `axis` shares: a horizontal group sits on
/// one y, a vertical group on one x.
fn shared_axis(axis: Axis) -> Axis {
    match axis {
        Axis::Horizontal => Axis::Vertical,
        Axis::Vertical => Axis::Horizontal,
    }
}

fn axis_component(v: Vec2, axis: Axis) -> f64 {
    match axis {
        Axis::Horizontal => v.x,
        Axis::Vertical => v.y,
    }
}

fn add_axis(v: &mut Vec2, axis: Axis, delta: f64) {
    match axis {
        Axis::Horizontal => v.x += delta,
        Axis::Vertical => v.y += delta,
    }
}

/// Moves a node to a new coordinate on one axis, carrying its subtree along
/// when the node is a compound.
fn set_coordinate(graph: &mut Graph, idx: usize, axis: Axis, value: f64) {
    let delta = value - coordinate(graph, idx, axis);
    if delta == 0.0 {
        return;
    }
    let mut targets = vec![idx];
    if graph.nodes[idx].is_compound() {
        let mut leaves = Vec::new();
        graph.descendant_leaves(idx, &mut leaves);
        targets = leaves;
    }
    for t in targets {
        match axis {
            Axis::Horizontal => graph.nodes[t].position.x += delta,
            Axis::Vertical => graph.nodes[t].position.y += delta,
        }
    }
}

fn key_components(len: usize, gaps: &[(usize, usize, f64)]) -> Vec<Vec<usize>> {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); len];
    for &(a, b, _) in gaps {
        adjacency[a].push(b);
        adjacency[b].push(a);
    }
    let mut seen = vec![false; len];
    let mut out = Vec::new();
    for start in 0..len {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Constraint, Graph, NodeId};

    fn three_nodes() -> (Graph, NodeId, NodeId, NodeId) {
        let mut g = Graph::new();
        let a = g.add_node(30.0, 20.0);
        let b = g.add_node(30.0, 20.0);
        let c = g.add_node(30.0, 20.0);
        g.node_mut(a).position = Vec2::new(0.0, 0.0);
        g.node_mut(b).position = Vec2::new(10.0, 5.0);
        g.node_mut(c).position = Vec2::new(-20.0, 12.0);
        (g, a, b, c)
    }

    #[test]
    fn alignment_snap_equalizes_the_constrained_coordinate() {
        let (mut g, a, b, c) = three_nodes();
        let processor = ConstraintProcessor::new(&[Constraint::Alignment {
            nodes: vec![a, b, c],
            axis: Axis::Horizontal,
        }]);
        processor.enforce(&mut g);
        let y = g.node(a).position.y;
        assert_eq!(g.node(b).position.y, y);
        assert_eq!(g.node(c).position.y, y);
        // Mean of 0, 5, 12.
        assert!((y - 17.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn alignment_with_a_fixed_member_uses_its_coordinate() {
        let (mut g, a, b, _c) = three_nodes();
        g.node_mut(a).fixed = true;
        let processor = ConstraintProcessor::new(&[Constraint::Alignment {
            nodes: vec![a, b],
            axis: Axis::Vertical,
        }]);
        processor.enforce(&mut g);
        assert_eq!(g.node(a).position.x, 0.0);
        assert_eq!(g.node(b).position.x, 0.0);
    }

    #[test]
    fn horizontal_alignment_and_horizontal_relative_use_different_coordinates() {
        let mut g = Graph::new();
        let a = g.add_node(30.0, 20.0);
        let b = g.add_node(30.0, 20.0);
        let c = g.add_node(30.0, 20.0);
        let d = g.add_node(30.0, 20.0);
        g.node_mut(a).position = Vec2::new(-40.0, 8.0);
        g.node_mut(b).position = Vec2::new(40.0, -2.0);
        g.node_mut(c).position = Vec2::new(0.0, 50.0);
        g.node_mut(d).position = Vec2::new(4.0, 60.0);
        let processor = ConstraintProcessor::new(&[
            Constraint::Alignment {
                nodes: vec![a, b],
                axis: Axis::Horizontal,
            },
            Constraint::Relative {
                first: c,
                second: d,
                axis: Axis::Horizontal,
                min_gap: 12.0,
            },
        ]);
        processor.enforce(&mut g);
        // The alignment equalizes y and leaves x alone.
        assert_eq!(g.node(a).position.y, 3.0);
        assert_eq!(g.node(b).position.y, 3.0);
        assert_eq!(g.node(a).position.x, -40.0);
        assert_eq!(g.node(b).position.x, 40.0);
        // The relative rule opens the x gap and leaves y alone.
        let border_gap = (g.node(d).position.x - g.node(d).half_width())
            - (g.node(c).position.x + g.node(c).half_width());
        assert!(border_gap >= 12.0 - 1e-9);
        assert_eq!(g.node(c).position.y, 50.0);
        assert_eq!(g.node(d).position.y, 60.0);
    }

    #[test]
    fn relative_enforcement_opens_the_border_gap() {
        let (mut g, a, b, _c) = three_nodes();
        let processor = ConstraintProcessor::new(&[Constraint::Relative {
            first: a,
            second: b,
            axis: Axis::Horizontal,
            min_gap: 25.0,
        }]);
        processor.enforce(&mut g);
        let border_gap = (g.node(b).position.x - g.node(b).half_width())
            - (g.node(a).position.x + g.node(a).half_width());
        assert!(border_gap >= 25.0 - 1e-9);
    }

    #[test]
    fn relative_enforcement_respects_a_fixed_successor() {
        let (mut g, a, b, _c) = three_nodes();
        g.node_mut(b).fixed = true;
        g.node_mut(b).position = Vec2::new(5.0, 0.0);
        let processor = ConstraintProcessor::new(&[Constraint::Relative {
            first: a,
            second: b,
            axis: Axis::Horizontal,
            min_gap: 10.0,
        }]);
        processor.enforce(&mut g);
        assert_eq!(g.node(b).position.x, 5.0);
        let border_gap = (g.node(b).position.x - g.node(b).half_width())
            - (g.node(a).position.x + g.node(a).half_width());
        assert!(border_gap >= 10.0 - 1e-9);
    }

    #[test]
    fn chained_relative_rules_relax_in_topological_order() {
        let (mut g, a, b, c) = three_nodes();
        let processor = ConstraintProcessor::new(&[
            Constraint::Relative {
                first: a,
                second: b,
                axis: Axis::Vertical,
                min_gap: 5.0,
            },
            Constraint::Relative {
                first: b,
                second: c,
                axis: Axis::Vertical,
                min_gap: 5.0,
            },
        ]);
        processor.enforce(&mut g);
        let gap_ab = (g.node(b).position.y - g.node(b).half_height())
            - (g.node(a).position.y + g.node(a).half_height());
        let gap_bc = (g.node(c).position.y - g.node(c).half_height())
            - (g.node(b).position.y + g.node(b).half_height());
        assert!(gap_ab >= 5.0 - 1e-9);
        assert!(gap_bc >= 5.0 - 1e-9);
    }

    #[test]
    fn transform_flips_an_axis_when_pairs_point_the_wrong_way() {
        let (mut g, a, b, _c) = three_nodes();
        g.node_mut(a).position = Vec2::new(50.0, 0.0);
        g.node_mut(b).position = Vec2::new(-50.0, 0.0);
        let processor = ConstraintProcessor::new(&[Constraint::Relative {
            first: a,
            second: b,
            axis: Axis::Horizontal,
            min_gap: 10.0,
        }]);
        processor.transform(&mut g);
        assert!(g.node(a).position.x < g.node(b).position.x);
    }

    #[test]
    fn displacement_filter_zeroes_fixed_nodes_last() {
        let (g, a, _b, _c) = three_nodes();
        let processor = ConstraintProcessor::new(&[Constraint::Fixed(a)]);
        let mut displacements = vec![Vec2::new(9.0, -9.0); 3];
        processor.apply_to_displacements(&g, &mut displacements, 100.0);
        assert_eq!(displacements[0], Vec2::ZERO);
        assert_eq!(displacements[1], Vec2::new(9.0, -9.0));
    }

    #[test]
    fn displacement_filter_clamps_to_the_step_budget() {
        let (g, _a, _b, _c) = three_nodes();
        let processor = ConstraintProcessor::new(&[]);
        let mut displacements = vec![Vec2::new(500.0, -500.0); 3];
        processor.apply_to_displacements(&g, &mut displacements, 3.0);
        assert_eq!(displacements[1], Vec2::new(3.0, -3.0));
    }

    #[test]
    fn displacement_filter_splits_relative_corrections() {
        let (g, a, b, _c) = three_nodes();
        let processor = ConstraintProcessor::new(&[Constraint::Relative {
            first: a,
            second: b,
            axis: Axis::Horizontal,
            min_gap: 0.0,
        }]);
        let mut displacements = vec![Vec2::ZERO; 3];
        processor.apply_to_displacements(&g, &mut displacements, 1000.0);
        // Centers are 10 apart, required center gap is 30; the 20 shortfall
        // splits evenly.
        assert!(displacements[a.0].x < 0.0);
        assert!(displacements[b.0].x > 0.0);
        assert!(
            (displacements[b.0].x - displacements[a.0].x - 20.0).abs() < 1e-9
        );
    }
}
