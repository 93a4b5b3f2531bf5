//! Cubes, boxes, spheres and cones used by the octree traversals.
use glam::DVec3;

/// Axis-aligned extents accumulated over a stream of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new()
    }
}

impl Bounds {
    /// Create new bounds initialised to infinity values
    pub fn new() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    /// Update bounds with a new point
    pub fn update(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// World space dimensions
    pub fn dimensions(&self) -> DVec3 {
        if self.is_empty() {
            DVec3::ZERO
        } else {
            self.max - self.min
        }
    }
}

/// Closed axis-aligned box in octree coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// Box spanned by two opposite corners given in any order.
    pub fn new(a: DVec3, b: DVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Shift the box by `-offset`, turning source coordinates into octree coordinates.
    pub fn translated(&self, delta: DVec3) -> Self {
        Self {
            min: self.min + delta,
            max: self.max + delta,
        }
    }
}

/// Axis-aligned cube given by centre and half side length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cube {
    pub center: DVec3,
    pub radius: f64,
}

impl Cube {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Smallest cube around the given bounds, padded by a relative margin so boundary points stay inside.
    pub fn bounding(bounds: &Bounds, padding: f64) -> Self {
        if bounds.is_empty() {
            return Self::new(DVec3::ZERO, 1.0);
        }
        let center = (bounds.min + bounds.max) * 0.5;
        let half = bounds.dimensions().max_element() * 0.5;
        let radius = if half > 0.0 {
            half * (1.0 + padding)
        } else {
            1.0
        };
        Self::new(center, radius)
    }

    pub fn min(&self) -> DVec3 {
        self.center - DVec3::splat(self.radius)
    }

    pub fn max(&self) -> DVec3 {
        self.center + DVec3::splat(self.radius)
    }

    pub fn contains(&self, p: DVec3) -> bool {
        (p - self.center).abs().max_element() <= self.radius
    }

    /// Octant index of a point: bit 0 for x, bit 1 for y, bit 2 for z.
    pub fn octant(&self, p: DVec3) -> usize {
        let mut index = 0;
        if p.x >= self.center.x {
            index |= 0x1;
        }
        if p.y >= self.center.y {
            index |= 0x2;
        }
        if p.z >= self.center.z {
            index |= 0x4;
        }
        index
    }

    pub fn child(&self, octant: usize) -> Cube {
        let half = self.radius * 0.5;
        let mut center = self.center;
        for axis in 0..3 {
            if octant & (1 << axis) != 0 {
                center[axis] += half;
            } else {
                center[axis] -= half;
            }
        }
        Cube::new(center, half)
    }

    /// Squared distance from a point to the closest point of the cube.
    pub fn sqr_dist(&self, p: DVec3) -> f64 {
        let d = ((p - self.center).abs() - DVec3::splat(self.radius)).max(DVec3::ZERO);
        d.length_squared()
    }

    pub fn intersects_sphere(&self, center: DVec3, radius: f64) -> bool {
        self.sqr_dist(center) <= radius * radius
    }

    pub fn intersects_box(&self, b: &Aabb) -> bool {
        self.min().cmple(b.max).all() && self.max().cmpge(b.min).all()
    }

    pub fn inside_box(&self, b: &Aabb) -> bool {
        b.contains(self.min()) && b.contains(self.max())
    }
}

/// A cube below a root cube, named by the octant taken at each level.
///
/// Membership is decided by replaying the octant choices, so every point
/// belongs to exactly one of a node's eight children.
#[derive(Debug, Clone, PartialEq)]
pub struct CubePath {
    root: Cube,
    octants: Vec<u8>,
    cube: Cube,
}

impl CubePath {
    pub fn root(root: Cube) -> Self {
        Self {
            root,
            octants: Vec::new(),
            cube: root,
        }
    }

    pub fn child(&self, octant: usize) -> Self {
        let mut octants = self.octants.clone();
        octants.push(octant as u8);
        Self {
            root: self.root,
            octants,
            cube: self.cube.child(octant),
        }
    }

    pub fn cube(&self) -> Cube {
        self.cube
    }

    pub fn depth(&self) -> u32 {
        self.octants.len() as u32
    }

    /// Hash of the octant sequence, stable across runs.
    pub fn key(&self) -> u64 {
        self.octants.iter().fold(1u64, |key, &octant| {
            key.wrapping_mul(0x100_0000_01b3).wrapping_add(u64::from(octant) + 1)
        })
    }

    pub fn owns(&self, p: DVec3) -> bool {
        if !self.root.contains(p) {
            return false;
        }
        let mut cube = self.root;
        for &octant in &self.octants {
            if cube.octant(p) != octant as usize {
                return false;
            }
            cube = cube.child(octant as usize);
        }
        true
    }
}

/// World-space sphere used to mark, select, or deselect points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interactor {
    pub center: DVec3,
    pub radius: f64,
}

impl Interactor {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn contains(&self, p: DVec3) -> bool {
        p.distance_squared(self.center) <= self.radius * self.radius
    }
}

/// Ray with an angular tolerance, carrying the nearest hit found so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeState {
    pub origin: DVec3,
    pub direction: DVec3,
    tan_half_angle: f64,
    /// Ray parameter of the nearest hit, or the initial search limit.
    pub best_t: f64,
    pub hit: Option<DVec3>,
}

impl ConeState {
    /// Cone from a ray origin, a direction of any length, and a half-angle in radians.
    pub fn new(origin: DVec3, direction: DVec3, half_angle: f64) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            tan_half_angle: half_angle.tan(),
            best_t: f64::INFINITY,
            hit: None,
        }
    }

    /// Limit the search to hits closer than `max_t`.
    pub fn with_limit(mut self, max_t: f64) -> Self {
        self.best_t = max_t;
        self
    }

    pub fn tan_half_angle(&self) -> f64 {
        self.tan_half_angle
    }

    /// Ray parameter of a point if it lies inside the cone.
    pub fn param_in_cone(&self, p: DVec3) -> Option<f64> {
        let d = p - self.origin;
        let t = d.dot(self.direction);
        if t < 0.0 {
            return None;
        }
        let perp2 = (d.length_squared() - t * t).max(0.0);
        let allowed = t * self.tan_half_angle;
        (perp2 <= allowed * allowed).then_some(t)
    }

    /// Offer a point; it becomes the hit if it is inside the cone and nearer than the current one.
    pub fn offer(&mut self, p: DVec3) -> bool {
        match self.param_in_cone(p) {
            Some(t) if t < self.best_t => {
                self.best_t = t;
                self.hit = Some(p);
                true
            }
            _ => false,
        }
    }

    /// Whether any point of the cube could lie inside the cone nearer than the current hit.
    pub fn may_hit(&self, cube: &Cube) -> Option<f64> {
        let slack = cube.radius * 3.0f64.sqrt();
        let d = cube.center - self.origin;
        let t_center = d.dot(self.direction);
        if t_center + slack < 0.0 {
            return None;
        }
        let perp = (d.length_squared() - t_center * t_center).max(0.0).sqrt();
        let allowed = (t_center + slack).max(0.0) * self.tan_half_angle + slack;
        if perp > allowed {
            return None;
        }
        let entry = (t_center - slack).max(0.0);
        (entry < self.best_t).then_some(entry)
    }
}
