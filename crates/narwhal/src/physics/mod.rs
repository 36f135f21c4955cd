//! Continuous force simulation for interactive canvases.
//!
//! The host drives the loop: call [`step`] once per frame with the elapsed
//! `dt` and poll [`crate::graph::Graph::kinetic_energy`] to decide when the
//! layout has settled. The step itself is total and never fails.

use rayon::prelude::*;

use crate::graph::{Graph, Vec2};

pub mod quadtree;

pub use quadtree::QuadTree;

const MIN_GLOBAL_SPEED: f64 = 0.01;
const MIN_SPRING_DISTANCE: f64 = 1e-6;
const MIN_MASS: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct PhysicsOptions {
    /// Pull toward the origin, proportional to distance and mass.
    pub gravity: f64,
    /// Pairwise inverse-square repulsion scale.
    pub repulsion: f64,
    /// Hooke spring constant for edges stretched past their rest length.
    pub spring: f64,
    /// Slack added to both radii to form a spring's rest length.
    pub min_distance: f64,
    /// Barnes-Hut accuracy parameter; 0 disables the approximation.
    pub theta: f64,
    /// Velocity retained per step, in `(0, 1]`.
    pub damping: f64,
    /// ForceAtlas2 speed tolerance; higher converges faster but oscillates
    /// more.
    pub speed_tolerance: f64,
    /// Upper clamp for the adaptive global speed.
    pub max_speed: f64,
    /// Strength multiplier for edges touching a hyper node.
    pub hyper_strength: f64,
}

impl Default for PhysicsOptions {
    fn default() -> Self {
        Self {
            gravity: 0.01,
            repulsion: 1000.0,
            spring: 0.1,
            min_distance: 10.0,
            theta: 0.7,
            damping: 0.9,
            speed_tolerance: 1.0,
            max_speed: 10.0,
            hyper_strength: 4.0,
        }
    }
}

/// Advances the simulation by one frame.
pub fn step(graph: &mut Graph, options: &PhysicsOptions, dt: f64) {
    if graph.nodes.is_empty() || !(dt > 0.0) {
        return;
    }
    graph.reset_physics();
    apply_gravity(graph, options);
    apply_repulsion(graph, options);
    apply_springs(graph, options);
    integrate(graph, options, dt);
    graph.update_compound_bounds();
}

fn apply_gravity(graph: &mut Graph, options: &PhysicsOptions) {
    for node in &mut graph.nodes {
        if node.is_compound() || node.fixed {
            continue;
        }
        node.force += -node.position * (options.gravity * node.mass);
    }
}

fn apply_repulsion(graph: &mut Graph, options: &PhysicsOptions) {
    if options.repulsion == 0.0 {
        return;
    }
    // Hyper nodes get zero tree mass so they never dominate repulsion.
    let bodies: Vec<(usize, Vec2, f64)> = graph
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| !n.is_compound())
        .map(|(i, n)| (i, n.position, if n.hyper { 0.0 } else { n.mass }))
        .collect();
    if bodies.len() < 2 {
        return;
    }
    let tree = QuadTree::build(&bodies);
    let nodes = &graph.nodes;
    // Fan out over disjoint per-node slots; the join happens at collect.
    let forces: Vec<(usize, Vec2)> = bodies
        .par_iter()
        .filter(|(i, _, _)| !nodes[*i].fixed)
        .map(|&(i, position, _)| {
            (
                i,
                tree.force_on(position, nodes[i].mass, i, options.repulsion, options.theta),
            )
        })
        .collect();
    for (i, force) in forces {
        graph.nodes[i].force += force;
    }
}

fn apply_springs(graph: &mut Graph, options: &PhysicsOptions) {
    for k in 0..graph.edges.len() {
        let edge = graph.edges[k];
        let (s, t) = (edge.source.0, edge.target.0);
        if s == t || s >= graph.nodes.len() || t >= graph.nodes.len() {
            continue;
        }
        let a = &graph.nodes[s];
        let b = &graph.nodes[t];
        let rest = a.radius() + b.radius() + options.min_distance;
        let delta = b.position - a.position;
        let dist = delta.length();
        if dist <= rest || dist < MIN_SPRING_DISTANCE {
            continue;
        }
        let strength = if a.hyper || b.hyper {
            edge.strength * options.hyper_strength
        } else {
            edge.strength
        };
        let magnitude = options.spring * strength * (dist - rest);
        let force = delta * (magnitude / dist);
        apply_force(graph, s, force);
        apply_force(graph, t, -force);
    }
}

/// Adds a force to a node; compound endpoints distribute it evenly over
/// their descendant leaves.
fn apply_force(graph: &mut Graph, idx: usize, force: Vec2) {
    if !graph.nodes[idx].is_compound() {
        graph.nodes[idx].force += force;
        return;
    }
    let mut leaves = Vec::new();
    graph.descendant_leaves(idx, &mut leaves);
    if leaves.is_empty() {
        return;
    }
    let share = force * (1.0 / leaves.len() as f64);
    for leaf in leaves {
        graph.nodes[leaf].force += share;
    }
}

fn integrate(graph: &mut Graph, options: &PhysicsOptions, dt: f64) {
    // ForceAtlas2 adaptive speed: swinging measures oscillation, traction
    // measures coherent motion.
    let mut swing_sum = 0.0;
    let mut traction_sum = 0.0;
    for node in &mut graph.nodes {
        if node.is_compound() || node.fixed {
            continue;
        }
        node.swinging = (node.force - node.old_force).length();
        node.traction = (node.force + node.old_force).length() * 0.5;
        swing_sum += node.mass * node.swinging;
        traction_sum += node.mass * node.traction;
    }
    let global_speed = if swing_sum > f64::EPSILON {
        (options.speed_tolerance * traction_sum / swing_sum)
            .clamp(MIN_GLOBAL_SPEED, options.max_speed)
    } else {
        1.0
    };

    for node in &mut graph.nodes {
        if node.is_compound() {
            continue;
        }
        if node.fixed {
            node.velocity = Vec2::ZERO;
            continue;
        }
        let local_speed = global_speed / (1.0 + (global_speed * node.swinging).sqrt());
        node.velocity += node.force * (dt / node.mass.max(MIN_MASS));
        node.velocity = node.velocity * options.damping;
        node.position += node.velocity * (dt * local_speed);
        node.old_force = node.force;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn lone_node_under_gravity_drifts_toward_the_origin() {
        let mut g = Graph::new();
        let a = g.add_node(30.0, 30.0);
        g.node_mut(a).position = Vec2::new(200.0, -150.0);
        let options = PhysicsOptions {
            repulsion: 0.0,
            ..PhysicsOptions::default()
        };
        let mut previous = g.node(a).position.length();
        for _ in 0..50 {
            step(&mut g, &options, 0.1);
            let current = g.node(a).position.length();
            assert!(current <= previous, "distance to origin grew");
            previous = current;
        }
        assert!(previous < 250.0);
    }

    #[test]
    fn stretched_spring_pulls_endpoints_together() {
        let mut g = Graph::new();
        let a = g.add_node(30.0, 30.0);
        let b = g.add_node(30.0, 30.0);
        g.node_mut(b).position = Vec2::new(500.0, 0.0);
        g.add_edge(a, b);
        let options = PhysicsOptions {
            gravity: 0.0,
            repulsion: 0.0,
            ..PhysicsOptions::default()
        };
        step(&mut g, &options, 0.1);
        assert!(g.node(a).position.x > 0.0);
        assert!(g.node(b).position.x < 500.0);
    }

    #[test]
    fn spring_force_is_zero_at_rest_length() {
        let mut g = Graph::new();
        let a = g.add_node(30.0, 30.0);
        let b = g.add_node(30.0, 30.0);
        let options = PhysicsOptions {
            gravity: 0.0,
            repulsion: 0.0,
            ..PhysicsOptions::default()
        };
        let rest = g.node(a).radius() + g.node(b).radius() + options.min_distance;
        g.node_mut(b).position = Vec2::new(rest, 0.0);
        step(&mut g, &options, 0.1);
        assert_eq!(g.node(a).position, Vec2::ZERO);
        assert_eq!(g.node(b).position, Vec2::new(rest, 0.0));
    }

    #[test]
    fn fixed_node_never_moves() {
        let mut g = Graph::new();
        let a = g.add_node(30.0, 30.0);
        let b = g.add_node(30.0, 30.0);
        g.node_mut(a).fixed = true;
        g.node_mut(a).position = Vec2::new(40.0, 40.0);
        g.node_mut(b).position = Vec2::new(45.0, 40.0);
        g.add_edge(a, b);
        let options = PhysicsOptions::default();
        for _ in 0..20 {
            step(&mut g, &options, 0.1);
        }
        assert_eq!(g.node(a).position, Vec2::new(40.0, 40.0));
        assert_eq!(g.node(a).velocity, Vec2::ZERO);
    }

    #[test]
    fn coincident_nodes_separate() {
        let mut g = Graph::new();
        let a = g.add_node(30.0, 30.0);
        let b = g.add_node(30.0, 30.0);
        g.node_mut(a).position = Vec2::new(10.0, 10.0);
        g.node_mut(b).position = Vec2::new(10.0, 10.0);
        let options = PhysicsOptions {
            gravity: 0.0,
            ..PhysicsOptions::default()
        };
        for _ in 0..10 {
            step(&mut g, &options, 0.1);
        }
        let gap = (g.node(a).position - g.node(b).position).length();
        assert!(gap > 0.0);
        assert!(g.node(a).position.is_finite());
        assert!(g.node(b).position.is_finite());
    }

    #[test]
    fn hyper_node_exerts_no_repulsion() {
        let mut g = Graph::new();
        let a = g.add_node(30.0, 30.0);
        let h = g.add_node(1.0, 1.0);
        g.node_mut(h).hyper = true;
        g.node_mut(h).position = Vec2::new(20.0, 0.0);
        let options = PhysicsOptions {
            gravity: 0.0,
            spring: 0.0,
            ..PhysicsOptions::default()
        };
        step(&mut g, &options, 0.1);
        assert_eq!(g.node(a).position, Vec2::ZERO);
    }

    #[test]
    fn kinetic_energy_decays_once_the_graph_settles() {
        let mut g = Graph::new();
        let mut prev = None;
        for i in 0..6 {
            let id = g.add_node(30.0, 30.0);
            g.node_mut(id).position = Vec2::new((i as f64) * 37.0 - 90.0, (i as f64) * 19.0 - 50.0);
            if let Some(p) = prev {
                g.add_edge(p, id);
            }
            prev = Some(id);
        }
        let options = PhysicsOptions::default();
        for _ in 0..300 {
            step(&mut g, &options, 0.05);
        }
        let settled = g.kinetic_energy();
        for _ in 0..100 {
            step(&mut g, &options, 0.05);
        }
        assert!(g.kinetic_energy() <= settled.max(1e-3) * 2.0);
        for node in &g.nodes {
            assert!(node.position.is_finite());
        }
    }
}
