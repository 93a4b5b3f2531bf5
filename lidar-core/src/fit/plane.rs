use super::pca::Pca;
use super::{collect_points, rms};
use crate::error::FitError;
use crate::primitive::{PlaneShape, Primitive, PrimitiveKind};
use glam::DVec3;
use tracing::info;

/// Relative padding added on each side of the fitted rectangle.
const RECTANGLE_PADDING: f64 = 0.1;

/// Least-squares plane with an oriented bounding rectangle of the points.
pub fn fit_plane<I>(points: I) -> Result<Primitive, FitError>
where
    I: IntoIterator<Item = DVec3>,
{
    let points = collect_points(points, 3)?;
    let (shape, sum_sq) = plane_shape(&points)?;
    let primitive = Primitive::new(PrimitiveKind::Plane(shape), points.len() as u64, rms(sum_sq, points.len()));
    info!("{}", primitive.describe(DVec3::ZERO));
    Ok(primitive)
}

/// A plane fit reporting strike and dip.
pub fn fit_brunton<I>(points: I) -> Result<Primitive, FitError>
where
    I: IntoIterator<Item = DVec3>,
{
    let points = collect_points(points, 3)?;
    let (shape, sum_sq) = plane_shape(&points)?;
    let primitive = Primitive::new(PrimitiveKind::Brunton(shape), points.len() as u64, rms(sum_sq, points.len()));
    info!("{}", primitive.describe(DVec3::ZERO));
    Ok(primitive)
}

fn plane_shape(points: &[DVec3]) -> Result<(PlaneShape, f64), FitError> {
    let pca = Pca::new(points);
    if pca.eigenvalues[1] <= pca.eigenvalues[0] * 1.0e-12 {
        return Err(FitError::Degenerate("points are collinear"));
    }

    let mut normal = pca.minor_axis();
    if normal.z < 0.0 {
        normal = -normal;
    }
    let axis0 = pca.major_axis();
    let axis1 = normal.cross(axis0).normalize();

    let mut lo = [f64::MAX; 2];
    let mut hi = [f64::MIN; 2];
    let mut sum_sq = 0.0;
    for p in points {
        let d = p - pca.centroid;
        for (i, axis) in [axis0, axis1].into_iter().enumerate() {
            let t = d.dot(axis);
            lo[i] = lo[i].min(t);
            hi[i] = hi[i].max(t);
        }
        let off_plane = d.dot(normal);
        sum_sq += off_plane * off_plane;
    }

    let pad = (hi[0] - lo[0]).max(hi[1] - lo[1]) * RECTANGLE_PADDING;
    let mut shape = PlaneShape {
        center: pca.centroid,
        normal,
        axes: [axis0, axis1],
        extents: [[lo[0] - pad, hi[0] + pad], [lo[1] - pad, hi[1] + pad]],
        num_lines: [0, 0],
    };
    shape.update_num_lines();
    Ok((shape, sum_sq))
}
