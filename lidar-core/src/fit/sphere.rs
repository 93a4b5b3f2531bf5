use super::lm::{minimize, LeastSquares};
use super::{collect_points, rms};
use crate::error::FitError;
use crate::primitive::{Primitive, PrimitiveKind, SphereShape};
use glam::DVec3;
use nalgebra::{DMatrix, DVector};
use tracing::info;

/// Residuals `|p - c| - r` over parameters `[cx, cy, cz, r]`.
struct SphereProblem<'a> {
    points: &'a [DVec3],
}

impl LeastSquares for SphereProblem<'_> {
    fn num_params(&self) -> usize {
        4
    }

    fn num_residuals(&self) -> usize {
        self.points.len()
    }

    fn residuals(&self, params: &DVector<f64>, out: &mut DVector<f64>) {
        let center = DVec3::new(params[0], params[1], params[2]);
        for (i, p) in self.points.iter().enumerate() {
            out[i] = p.distance(center) - params[3];
        }
    }

    fn jacobian(&self, params: &DVector<f64>, out: &mut DMatrix<f64>) {
        let center = DVec3::new(params[0], params[1], params[2]);
        for (i, p) in self.points.iter().enumerate() {
            let d = center - *p;
            let len = d.length();
            let g = if len > 0.0 { d / len } else { DVec3::ZERO };
            out[(i, 0)] = g.x;
            out[(i, 1)] = g.y;
            out[(i, 2)] = g.z;
            out[(i, 3)] = -1.0;
        }
    }
}

/// Sphere minimising the squared radial distances, started at the centroid.
pub fn fit_sphere<I>(points: I) -> Result<Primitive, FitError>
where
    I: IntoIterator<Item = DVec3>,
{
    let points = collect_points(points, 4)?;
    let n = points.len() as f64;
    let centroid = points.iter().copied().sum::<DVec3>() / n;
    let mean_radius = points.iter().map(|p| p.distance(centroid)).sum::<f64>() / n;
    if mean_radius <= 0.0 {
        return Err(FitError::Degenerate("all points coincide"));
    }

    let problem = SphereProblem { points: &points };
    let initial = DVector::from_vec(vec![centroid.x, centroid.y, centroid.z, mean_radius]);
    let min = minimize(&problem, initial);
    let center = DVec3::new(min.params[0], min.params[1], min.params[2]);
    let radius = min.params[3].abs();
    if !center.is_finite() || !radius.is_finite() {
        return Err(FitError::Degenerate("sphere fit did not converge"));
    }

    let primitive = Primitive::new(
        PrimitiveKind::Sphere(SphereShape { center, radius }),
        points.len() as u64,
        rms(min.sum_sq, points.len()),
    );
    info!("{}", primitive.describe(DVec3::ZERO));
    Ok(primitive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sphere_of(p: &Primitive) -> SphereShape {
        match p.kind {
            PrimitiveKind::Sphere(s) => s,
            _ => unreachable!(),
        }
    }

    #[test]
    fn six_axis_points_give_unit_sphere() {
        let points = [DVec3::X, -DVec3::X, DVec3::Y, -DVec3::Y, DVec3::Z, -DVec3::Z];
        let p = fit_sphere(points).unwrap();
        let s = sphere_of(&p);
        assert!(s.center.abs_diff_eq(DVec3::ZERO, 1e-9));
        assert_relative_eq!(s.radius, 1.0, epsilon = 1e-9);
        assert!(p.rms <= 1e-6);
    }

    #[test]
    fn off_centre_cap_converges() {
        // Points on the upper half of a sphere so the centroid starts off-centre.
        let center = DVec3::new(10.0, -4.0, 2.0);
        let mut points = Vec::new();
        for i in 0..8 {
            for j in 1..5 {
                let theta = i as f64 * std::f64::consts::TAU / 8.0;
                let phi = j as f64 * 0.35;
                let dir = DVec3::new(phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos());
                points.push(center + dir * 3.0);
            }
        }
        let s = sphere_of(&fit_sphere(points).unwrap());
        assert!(s.center.abs_diff_eq(center, 1e-6));
        assert_relative_eq!(s.radius, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn point_on_the_sphere_does_not_raise_rms() {
        let mut points: Vec<DVec3> = (0..24)
            .map(|i| {
                let t = i as f64 * 0.7;
                let r = if i % 2 == 0 { 1.02 } else { 0.98 };
                DVec3::new(t.cos() * (t * 0.3).cos(), t.sin() * (t * 0.3).cos(), (t * 0.3).sin()) * r
            })
            .collect();
        let first = fit_sphere(points.clone()).unwrap();
        let s = sphere_of(&first);
        points.push(s.center + DVec3::new(0.0, 0.6, 0.8) * s.radius);
        let second = fit_sphere(points).unwrap();
        assert!(second.rms <= first.rms + 1e-9);
    }
}
