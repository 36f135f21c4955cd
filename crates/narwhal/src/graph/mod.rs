use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use crate::error::{Error, Result};

/// Padding added on every side of a compound's union rect.
pub const COMPOUND_PADDING: f64 = 10.0;

/// Index of a node inside [`Graph::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn length_sq(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Axis-aligned rectangle in layout coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }

    pub fn union(self, other: Rect) -> Rect {
        Rect {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn expand(self, pad: f64) -> Rect {
        Rect {
            min_x: self.min_x - pad,
            min_y: self.min_y - pad,
            max_x: self.max_x + pad,
            max_y: self.max_y + pad,
        }
    }
}

/// A rectangular body in the layout.
///
/// Positions are rect centers. A node with children is a compound: its
/// position and size are derived from its descendants by
/// [`Graph::update_compound_bounds`] and the simulators never move it
/// directly.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass: f64,
    pub width: f64,
    pub height: f64,
    /// Pinned in place; forces never move it.
    pub fixed: bool,
    /// Marker for edge-as-node bodies (hyperedge midpoints). They carry no
    /// repulsive mass and their incident edges pull harder.
    pub hyper: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub(crate) force: Vec2,
    pub(crate) old_force: Vec2,
    pub(crate) swinging: f64,
    pub(crate) traction: f64,
}

impl Node {
    fn new(id: NodeId, width: f64, height: f64) -> Self {
        Self {
            id,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            mass: 1.0,
            width,
            height,
            fixed: false,
            hyper: false,
            parent: None,
            children: Vec::new(),
            force: Vec2::ZERO,
            old_force: Vec2::ZERO,
            swinging: 0.0,
            traction: 0.0,
        }
    }

    pub fn is_compound(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn half_width(&self) -> f64 {
        self.width * 0.5
    }

    pub fn half_height(&self) -> f64 {
        self.height * 0.5
    }

    /// Circumscribed radius: half the rect diagonal.
    pub fn radius(&self) -> f64 {
        0.5 * (self.width * self.width + self.height * self.height).sqrt()
    }

    pub fn rect(&self) -> Rect {
        Rect {
            min_x: self.position.x - self.half_width(),
            min_y: self.position.y - self.half_height(),
            max_x: self.position.x + self.half_width(),
            max_y: self.position.y + self.half_height(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    /// Spring strength multiplier, 1.0 by default.
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// One-shot arrangement constraints.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// The node keeps its current position through every phase.
    Fixed(NodeId),
    /// All members share one coordinate: `Horizontal` puts them on a
    /// horizontal line (equal y), `Vertical` on a vertical line (equal x).
    Alignment { nodes: Vec<NodeId>, axis: Axis },
    /// `first` stays before `second` along the axis (`Horizontal` = left of,
    /// `Vertical` = above), with at least `min_gap` between first's trailing
    /// border and second's leading border.
    Relative {
        first: NodeId,
        second: NodeId,
        axis: Axis,
        min_gap: f64,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, width: f64, height: f64) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, width, height));
        id
    }

    /// Adds a node nested under `parent`, turning the parent into a
    /// compound.
    pub fn add_child(&mut self, parent: NodeId, width: f64, height: f64) -> NodeId {
        let id = self.add_node(width, height);
        self.nodes[id.0].parent = Some(parent);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn add_edge(&mut self, source: NodeId, target: NodeId) {
        self.add_edge_with_strength(source, target, 1.0);
    }

    pub fn add_edge_with_strength(&mut self, source: NodeId, target: NodeId, strength: f64) {
        self.edges.push(Edge {
            source,
            target,
            strength,
        });
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn validate(&self) -> Result<()> {
        for (i, e) in self.edges.iter().enumerate() {
            if e.source.0 >= self.nodes.len() || e.target.0 >= self.nodes.len() {
                return Err(Error::MissingEndpoint { edge: i });
            }
        }
        Ok(())
    }

    /// Clears the per-step force accumulators.
    pub fn reset_physics(&mut self) {
        for node in &mut self.nodes {
            node.force = Vec2::ZERO;
        }
    }

    /// Total kinetic energy, `Σ mass·|v|²`. Hosts poll this to decide when
    /// the continuous simulation has settled.
    pub fn kinetic_energy(&self) -> f64 {
        self.nodes
            .iter()
            .filter(|n| !n.is_compound())
            .map(|n| n.mass * n.velocity.length_sq())
            .sum()
    }

    /// Bounding rect of all leaf nodes.
    pub fn bounding_rect(&self) -> Option<Rect> {
        self.nodes
            .iter()
            .filter(|n| !n.is_compound())
            .map(Node::rect)
            .reduce(Rect::union)
    }

    /// Connected components over the undirected edge set, as lists of node
    /// indices. Singleton nodes form their own components.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let n = self.nodes.len();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for e in &self.edges {
            if e.source != e.target && e.source.0 < n && e.target.0 < n {
                adjacency[e.source.0].push(e.target.0);
                adjacency[e.target.0].push(e.source.0);
            }
        }
        let mut seen = vec![false; n];
        let mut components = Vec::new();
        for start in 0..n {
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
            components.push(component);
        }
        components
    }

    /// Recomputes every compound's rect as the union of its descendants plus
    /// [`COMPOUND_PADDING`], children before parents.
    pub fn update_compound_bounds(&mut self) {
        let mut compounds: Vec<(usize, usize)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_compound())
            .map(|(i, _)| (self.depth(i), i))
            .collect();
        compounds.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        for (_, idx) in compounds {
            let children = self.nodes[idx].children.clone();
            let union = children
                .iter()
                .map(|&c| self.nodes[c.0].rect())
                .reduce(Rect::union);
            if let Some(rect) = union {
                let rect = rect.expand(COMPOUND_PADDING);
                let node = &mut self.nodes[idx];
                node.width = rect.width();
                node.height = rect.height();
                node.position = rect.center();
            }
        }
    }

    fn depth(&self, idx: usize) -> usize {
        let mut depth = 0;
        let mut cur = self.nodes[idx].parent;
        while let Some(p) = cur {
            depth += 1;
            cur = self.nodes[p.0].parent;
        }
        depth
    }

    /// First leaf found under `idx` (depth-first), or `idx` itself if it is
    /// a leaf.
    pub(crate) fn representative_leaf(&self, idx: usize) -> usize {
        let mut cur = idx;
        while let Some(&first) = self.nodes[cur].children.first() {
            cur = first.0;
        }
        cur
    }

    pub(crate) fn descendant_leaves(&self, idx: usize, out: &mut Vec<usize>) {
        if !self.nodes[idx].is_compound() {
            out.push(idx);
            return;
        }
        for &child in &self.nodes[idx].children {
            self.descendant_leaves(child.0, out);
        }
    }

    pub(crate) fn is_ancestor(&self, ancestor: usize, idx: usize) -> bool {
        let mut cur = self.nodes[idx].parent;
        while let Some(p) = cur {
            if p.0 == ancestor {
                return true;
            }
            cur = self.nodes[p.0].parent;
        }
        false
    }
}
