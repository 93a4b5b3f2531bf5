use super::line::centered_segment;
use super::lm::{minimize, LeastSquares};
use super::{axial_range, collect_points, rms};
use crate::error::FitError;
use crate::primitive::{CylinderShape, Primitive, PrimitiveKind};
use glam::DVec3;
use nalgebra::DVector;
use tracing::{debug, info};

/// Cylinder parameterised around a fixed frame `(u, v, w)` through `base`:
/// the axis is `normalize(w + alpha u + beta v)` and passes through
/// `base + px u + py v`. Parameters are `[px, py, alpha, beta, r]`.
struct CylinderProblem<'a> {
    points: &'a [DVec3],
    base: DVec3,
    frame: [DVec3; 3],
}

impl CylinderProblem<'_> {
    fn axis_point(&self, params: &DVector<f64>) -> DVec3 {
        self.base + self.frame[0] * params[0] + self.frame[1] * params[1]
    }

    fn axis(&self, params: &DVector<f64>) -> DVec3 {
        (self.frame[2] + self.frame[0] * params[2] + self.frame[1] * params[3]).normalize()
    }
}

impl LeastSquares for CylinderProblem<'_> {
    fn num_params(&self) -> usize {
        5
    }

    fn num_residuals(&self) -> usize {
        self.points.len()
    }

    fn residuals(&self, params: &DVector<f64>, out: &mut DVector<f64>) {
        let c = self.axis_point(params);
        let a = self.axis(params);
        for (i, p) in self.points.iter().enumerate() {
            let d = *p - c;
            out[i] = (d - a * d.dot(a)).length() - params[4];
        }
    }
}

/// Cylinder minimising squared distances to the mantle, tried from each world axis.
pub fn fit_cylinder<I>(points: I) -> Result<Primitive, FitError>
where
    I: IntoIterator<Item = DVec3>,
{
    let points = collect_points(points, 6)?;
    let centroid = points.iter().copied().sum::<DVec3>() / points.len() as f64;

    let mut best: Option<(f64, DVec3, DVec3, f64)> = None;
    for k in 0..3 {
        let w = DVec3::AXES[k];
        let frame = [DVec3::AXES[(k + 1) % 3], DVec3::AXES[(k + 2) % 3], w];
        let initial_radius = points
            .iter()
            .map(|p| {
                let d = *p - centroid;
                (d - w * d.dot(w)).length()
            })
            .sum::<f64>()
            / points.len() as f64;

        let problem = CylinderProblem {
            points: &points,
            base: centroid,
            frame,
        };
        let min = minimize(&problem, DVector::from_vec(vec![0.0, 0.0, 0.0, 0.0, initial_radius]));
        debug!(
            "cylinder fit from axis {k}: residual {} after {} iterations",
            min.sum_sq, min.iterations
        );
        if !min.sum_sq.is_finite() {
            continue;
        }
        if best.is_none_or(|(sum_sq, ..)| min.sum_sq < sum_sq) {
            best = Some((
                min.sum_sq,
                problem.axis_point(&min.params),
                problem.axis(&min.params),
                min.params[4].abs(),
            ));
        }
    }

    let Some((sum_sq, axis_point, axis, radius)) = best else {
        return Err(FitError::Degenerate("cylinder fit did not converge"));
    };
    if !(radius > 0.0 && axis.is_finite()) {
        return Err(FitError::Degenerate("cylinder fit did not converge"));
    }

    let mut shape = CylinderShape {
        line: centered_segment(axis_point, axis, axial_range(&points, axis_point, axis)),
        radius,
        num_lines: [0, 0],
    };
    shape.update_num_lines();
    let primitive = Primitive::new(PrimitiveKind::Cylinder(shape), points.len() as u64, rms(sum_sq, points.len()));
    info!("{}", primitive.describe(DVec3::ZERO));
    Ok(primitive)
}
