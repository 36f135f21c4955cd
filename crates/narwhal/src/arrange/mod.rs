//! One-shot auto-arrange pipeline.
//!
//! Four phases run in order: a spectral draft for the global shape, a
//! constraint transform that orients the draft, direct constraint
//! enforcement, and force-directed polishing. Each phase is also exposed on
//! [`Arrangement`] so a host can re-enter the pipeline at any point, e.g.
//! re-polish after the user drags a node.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::graph::{Constraint, Graph};
use crate::rng::XorShift64Star;

mod constraints;
mod polish;
mod spectral;

pub(crate) use constraints::ConstraintProcessor;
pub use polish::PolishStats;

#[derive(Debug, Clone)]
pub struct ArrangeOptions {
    /// Target center-to-center edge length before node extents are added.
    pub ideal_edge_length: f64,
    /// Spring constant for the square-law attraction.
    pub spring: f64,
    /// Repulsion constant; also squared for the overlap push.
    pub repulsion: f64,
    /// Pull toward the origin for nodes outside the gravity range.
    pub gravity: f64,
    /// Geometric cooling multiplier, in `(0, 1)`.
    pub cooling_factor: f64,
    /// Starting step budget per iteration.
    pub initial_temperature: f64,
    /// The loop stops once the temperature cools below this.
    pub min_temperature: f64,
    /// Unconditional upper bound on polish iterations.
    pub max_iterations: usize,
    /// Convergence threshold on the largest per-node displacement.
    pub energy_threshold: f64,
    /// Repulsion grid cell size; `None` derives it from the ideal length.
    pub grid_cell_size: Option<f64>,
    /// Multiplier applied to the spectral draft coordinates.
    pub spectral_scale: f64,
    /// Iteration cap for each power-iteration eigensolve.
    pub power_iterations: usize,
    /// Alignment tolerance that ends a power iteration early.
    pub power_tolerance: f64,
    /// Seed for all randomness in the pipeline.
    pub random_seed: u64,
    /// Cancellation is polled every this many polish iterations.
    pub yield_period: usize,
}

impl Default for ArrangeOptions {
    fn default() -> Self {
        Self {
            ideal_edge_length: 50.0,
            spring: 0.45,
            repulsion: 4500.0,
            gravity: 0.25,
            cooling_factor: 0.95,
            initial_temperature: 100.0,
            min_temperature: 0.04,
            max_iterations: 2500,
            energy_threshold: 1.0,
            grid_cell_size: None,
            spectral_scale: 1.0,
            power_iterations: 1000,
            power_tolerance: 1e-8,
            random_seed: 1,
            yield_period: 4,
        }
    }
}

impl ArrangeOptions {
    /// Rejects configurations that could never terminate or that would feed
    /// the solvers non-finite numbers.
    pub fn validate(&self) -> Result<()> {
        if !(self.cooling_factor > 0.0 && self.cooling_factor < 1.0) {
            return Err(invalid("cooling_factor must be in (0, 1)"));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be positive"));
        }
        if !(self.initial_temperature > 0.0) || !(self.min_temperature > 0.0) {
            return Err(invalid("temperatures must be positive"));
        }
        if self.min_temperature >= self.initial_temperature {
            return Err(invalid(
                "min_temperature must be below initial_temperature",
            ));
        }
        if self.yield_period == 0 {
            return Err(invalid("yield_period must be positive"));
        }
        if !(self.energy_threshold >= 0.0) {
            return Err(invalid("energy_threshold must be non-negative"));
        }
        if !(self.ideal_edge_length > 0.0) {
            return Err(invalid("ideal_edge_length must be positive"));
        }
        if self.power_iterations == 0 {
            return Err(invalid("power_iterations must be positive"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> Error {
    Error::InvalidOptions {
        message: message.to_string(),
    }
}

/// Cooperative cancellation handle, checked at the top of every phase and
/// at every polish yield point.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One arrangement run: validated options, compiled constraints, a seeded
/// PRNG and a cancellation token.
pub struct Arrangement<'a> {
    options: &'a ArrangeOptions,
    processor: ConstraintProcessor,
    token: CancelToken,
    rng: XorShift64Star,
}

impl<'a> Arrangement<'a> {
    pub fn new(
        constraints: &[Constraint],
        options: &'a ArrangeOptions,
        token: CancelToken,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            processor: ConstraintProcessor::new(constraints),
            token,
            rng: XorShift64Star::new(options.random_seed),
        })
    }

    /// Runs the full pipeline.
    pub fn run(&mut self, graph: &mut Graph) -> Result<PolishStats> {
        graph.validate()?;
        self.spectral(graph)?;
        self.transform(graph)?;
        self.enforce(graph)?;
        self.polish(graph)
    }

    /// Spectral draft of the global shape.
    pub fn spectral(&mut self, graph: &mut Graph) -> Result<()> {
        self.token.check()?;
        tracing::debug!(nodes = graph.nodes.len(), "spectral draft");
        spectral::draft(graph, self.options, &self.processor, &mut self.rng);
        Ok(())
    }

    /// Orients the draft so constraints start out roughly satisfied.
    pub fn transform(&mut self, graph: &mut Graph) -> Result<()> {
        self.token.check()?;
        self.processor.transform(graph);
        Ok(())
    }

    /// Moves nodes directly onto their constraint targets.
    pub fn enforce(&mut self, graph: &mut Graph) -> Result<()> {
        self.token.check()?;
        self.processor.enforce(graph);
        Ok(())
    }

    /// Force-directed refinement under the compiled constraints.
    pub fn polish(&mut self, graph: &mut Graph) -> Result<PolishStats> {
        self.token.check()?;
        polish::polish(graph, &self.processor, self.options, &self.token)
    }
}
