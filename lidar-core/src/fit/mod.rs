//! Least-squares fitting of primitives to selected points.
//!
//! Every fitter consumes plain positions and returns a [`Primitive`] whose
//! `rms` is the root-mean-square perpendicular distance of the points to the
//! fitted shape.
mod cylinder;
mod line;
pub mod lm;
pub mod pca;
mod plane;
mod sphere;

pub use cylinder::fit_cylinder;
pub use line::fit_line;
pub(crate) use line::centered_segment;
pub use plane::{fit_brunton, fit_plane};
pub use sphere::fit_sphere;

use crate::error::FitError;
use crate::primitive::Primitive;
use glam::DVec3;

/// Kinds of primitives that can be fitted to points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitKind {
    Plane,
    Brunton,
    Line,
    Sphere,
    Cylinder,
}

impl FitKind {
    /// Minimum number of points a fit of this kind accepts.
    pub fn min_points(self) -> usize {
        match self {
            FitKind::Plane | FitKind::Brunton => 3,
            FitKind::Line => 2,
            FitKind::Sphere => 4,
            FitKind::Cylinder => 6,
        }
    }
}

/// Fits a primitive of `kind` to `points`.
pub fn fit<I>(kind: FitKind, points: I) -> Result<Primitive, FitError>
where
    I: IntoIterator<Item = DVec3>,
{
    match kind {
        FitKind::Plane => fit_plane(points),
        FitKind::Brunton => fit_brunton(points),
        FitKind::Line => fit_line(points),
        FitKind::Sphere => fit_sphere(points),
        FitKind::Cylinder => fit_cylinder(points),
    }
}

pub(crate) fn collect_points<I>(points: I, needed: usize) -> Result<Vec<DVec3>, FitError>
where
    I: IntoIterator<Item = DVec3>,
{
    let points: Vec<DVec3> = points.into_iter().collect();
    if points.len() < needed {
        return Err(FitError::InsufficientPoints {
            needed,
            found: points.len(),
        });
    }
    Ok(points)
}

pub(crate) fn rms(sum_sq: f64, count: usize) -> f64 {
    (sum_sq / count as f64).sqrt()
}

/// Smallest and largest projection of `points` onto `axis` through `origin`.
pub(crate) fn axial_range(points: &[DVec3], origin: DVec3, axis: DVec3) -> [f64; 2] {
    points.iter().fold([f64::MAX, f64::MIN], |[lo, hi], p| {
        let t = (p - origin).dot(axis);
        [lo.min(t), hi.max(t)]
    })
}
