#![forbid(unsafe_code)]

//! Headless force-directed layout for compound note graphs.
//!
//! Two engines over one graph model:
//!
//! - [`physics::step`] advances a continuous Barnes-Hut simulation one frame
//!   at a time; the host owns the loop and polls
//!   [`graph::Graph::kinetic_energy`] to decide when it has settled.
//! - [`arrange()`] runs the one-shot pipeline (spectral draft, constraint
//!   transform and enforcement, force-directed polish) to completion.

pub mod arrange;
pub mod error;
pub mod graph;
pub mod physics;
mod rng;

pub use arrange::{ArrangeOptions, Arrangement, CancelToken, PolishStats};
pub use error::{Error, Result};
pub use graph::{Axis, Constraint, Edge, Graph, Node, NodeId, Rect, Vec2};
pub use physics::PhysicsOptions;

/// One-shot arrangement entry point.
pub fn arrange(
    graph: &mut Graph,
    constraints: &[Constraint],
    options: &ArrangeOptions,
) -> Result<PolishStats> {
    Arrangement::new(constraints, options, CancelToken::new())?.run(graph)
}
