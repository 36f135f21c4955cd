use crate::graph::Vec2;

const MAX_LEAF_BODIES: usize = 4;
const MIN_CELL_SIZE: f64 = 1.0;
const BOUNDS_MARGIN: f64 = 10.0;
/// Floor distance for coincident bodies.
const MIN_SEPARATION: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
struct Body {
    idx: usize,
    position: Vec2,
    mass: f64,
}

/// Barnes-Hut quadtree over point bodies, rebuilt every simulation step.
///
/// Internal cells aggregate total mass and center of mass; a cell far enough
/// away (`cell_size / distance < theta`) acts on a query body as a single
/// pseudo-body.
#[derive(Debug)]
pub struct QuadTree {
    x: f64,
    y: f64,
    size: f64,
    bodies: Vec<Body>,
    children: Option<Box<[QuadTree; 4]>>,
    mass: f64,
    center: Vec2,
}

impl QuadTree {
    /// Builds the tree over `(index, position, mass)` bodies. The root square
    /// covers 1.2x the body bounding box plus a margin so drifting bodies
    /// stay inside for the whole step.
    pub fn build(bodies: &[(usize, Vec2, f64)]) -> Self {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for &(_, p, _) in bodies {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        if bodies.is_empty() {
            min_x = 0.0;
            min_y = 0.0;
            max_x = 0.0;
            max_y = 0.0;
        }
        let extent = (max_x - min_x).max(max_y - min_y);
        let size = extent * 1.2 + BOUNDS_MARGIN;
        let cx = (min_x + max_x) * 0.5;
        let cy = (min_y + max_y) * 0.5;
        let mut root = QuadTree::new(cx - size * 0.5, cy - size * 0.5, size);
        for &(idx, position, mass) in bodies {
            root.insert(idx, position, mass);
        }
        root
    }

    fn new(x: f64, y: f64, size: f64) -> Self {
        Self {
            x,
            y,
            size,
            bodies: Vec::new(),
            children: None,
            mass: 0.0,
            center: Vec2::ZERO,
        }
    }

    pub fn insert(&mut self, idx: usize, position: Vec2, mass: f64) {
        let total = self.mass + mass;
        if total > 0.0 {
            self.center = (self.center * self.mass + position * mass) * (1.0 / total);
        }
        self.mass = total;

        let q = self.quadrant(position);
        if let Some(children) = &mut self.children {
            children[q].insert(idx, position, mass);
            return;
        }
        self.bodies.push(Body {
            idx,
            position,
            mass,
        });
        if self.bodies.len() > MAX_LEAF_BODIES && self.size > MIN_CELL_SIZE {
            self.subdivide();
        }
    }

    fn quadrant(&self, position: Vec2) -> usize {
        let half = self.size * 0.5;
        let mut q = 0;
        if position.x >= self.x + half {
            q += 1;
        }
        if position.y >= self.y + half {
            q += 2;
        }
        q
    }

    fn subdivide(&mut self) {
        let half = self.size * 0.5;
        let mut children = Box::new([
            QuadTree::new(self.x, self.y, half),
            QuadTree::new(self.x + half, self.y, half),
            QuadTree::new(self.x, self.y + half, half),
            QuadTree::new(self.x + half, self.y + half, half),
        ]);
        for body in self.bodies.drain(..) {
            let mut q = 0;
            if body.position.x >= self.x + half {
                q += 1;
            }
            if body.position.y >= self.y + half {
                q += 2;
            }
            children[q].insert(body.idx, body.position, body.mass);
        }
        self.children = Some(children);
    }

    /// Repulsive force on the body `idx` at `position` with mass `mass`.
    /// `theta = 0` disables the far-field approximation and reduces to the
    /// exact pairwise sum.
    pub fn force_on(&self, position: Vec2, mass: f64, idx: usize, repulsion: f64, theta: f64) -> Vec2 {
        if self.mass <= 0.0 {
            return Vec2::ZERO;
        }
        if let Some(children) = &self.children {
            let mut delta = position - self.center;
            let mut dist = delta.length();
            if dist < MIN_SEPARATION {
                delta = jitter(idx, usize::MAX);
                dist = MIN_SEPARATION;
            }
            if self.size / dist < theta {
                let magnitude = repulsion * mass * self.mass / (dist * dist);
                return delta * (magnitude / dist);
            }
            let mut force = Vec2::ZERO;
            for child in children.iter() {
                force += child.force_on(position, mass, idx, repulsion, theta);
            }
            force
        } else {
            let mut force = Vec2::ZERO;
            for body in &self.bodies {
                if body.idx == idx || body.mass <= 0.0 {
                    continue;
                }
                let mut delta = position - body.position;
                let mut dist = delta.length();
                if dist < MIN_SEPARATION {
                    delta = jitter(idx, body.idx);
                    dist = MIN_SEPARATION;
                }
                let magnitude = repulsion * mass * body.mass / (dist * dist);
                force += delta * (magnitude / dist);
            }
            force
        }
    }
}

/// Deterministic offset for coincident bodies. Antisymmetric in the pair so
/// the two partners get opposite pushes, spread over the golden angle so
/// distinct pairs separate in distinct directions.
fn jitter(a: usize, b: usize) -> Vec2 {
    let (lo, hi) = (a.min(b), a.max(b));
    let angle = (lo.wrapping_mul(31) ^ hi) as f64 * 2.399963229728653;
    let v = Vec2::new(angle.cos(), angle.sin()) * MIN_SEPARATION;
    if a <= b { v } else { -v }
}
