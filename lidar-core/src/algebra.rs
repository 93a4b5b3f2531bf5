//! Lines and points derived by intersecting fitted primitives.
use crate::error::AlgebraError;
use crate::fit::centered_segment;
use crate::primitive::{LineShape, PlaneShape, PointShape, Primitive, PrimitiveKind};
use glam::DVec3;
use tracing::info;

/// Singular values below this fraction of the largest count as zero.
const RANK_EPSILON: f64 = 1.0e-10;

/// Point count and RMS of a primitive derived from `sources`, combining their
/// residuals as a point-count weighted quadratic mean.
fn combined_residual<'a, I>(sources: I) -> (u64, f64)
where
    I: IntoIterator<Item = &'a Primitive>,
{
    let (count, sum) = sources.into_iter().fold((0u64, 0.0), |(count, sum), p| {
        (count + p.num_points, sum + p.rms * p.rms * p.num_points as f64)
    });
    if count == 0 {
        (0, 0.0)
    } else {
        (count, (sum / count as f64).sqrt())
    }
}

fn plane(p: &Primitive) -> Option<&PlaneShape> {
    match &p.kind {
        PrimitiveKind::Plane(shape) | PrimitiveKind::Brunton(shape) => Some(shape),
        _ => None,
    }
}

fn line(p: &Primitive) -> Option<&LineShape> {
    match &p.kind {
        PrimitiveKind::Line(shape) => Some(shape),
        PrimitiveKind::Cylinder(shape) => Some(&shape.line),
        _ => None,
    }
}

fn to_na(v: DVec3) -> nalgebra::Vector3<f64> {
    nalgebra::Vector3::new(v.x, v.y, v.z)
}

fn from_na(v: &nalgebra::Vector3<f64>) -> DVec3 {
    DVec3::new(v[0], v[1], v[2])
}

/// Rows of plane normals and right-hand sides, conditioned around the centres' centroid.
fn plane_system(planes: &[&PlaneShape]) -> (nalgebra::Matrix3<f64>, nalgebra::Vector3<f64>, DVec3) {
    let centroid = planes.iter().map(|p| p.center).sum::<DVec3>() / planes.len() as f64;
    let mut a = nalgebra::Matrix3::zeros();
    let mut b = nalgebra::Vector3::zeros();
    for (i, p) in planes.iter().enumerate() {
        a.set_row(i, &to_na(p.normal).transpose());
        b[i] = (p.center - centroid).dot(p.normal);
    }
    (a, b, centroid)
}

/// Line along which two planes meet, clipped to the span of both rectangles.
pub fn intersect_planes(a: &Primitive, b: &Primitive) -> Result<Primitive, AlgebraError> {
    let (Some(pa), Some(pb)) = (plane(a), plane(b)) else {
        return Err(AlgebraError::MismatchedSelection);
    };
    let (matrix, rhs, centroid) = plane_system(&[pa, pb]);

    let svd = nalgebra::linalg::SVD::new(matrix, true, true);
    let largest = svd.singular_values.max();
    let rank = svd
        .singular_values
        .iter()
        .filter(|&&s| s > largest * RANK_EPSILON)
        .count();
    if rank != 2 {
        return Err(AlgebraError::ParallelPlanes);
    }
    let particular = svd
        .solve(&rhs, largest * RANK_EPSILON)
        .map_err(|_| AlgebraError::ParallelPlanes)?;
    let origin = centroid + from_na(&particular);
    let axis = pa.normal.cross(pb.normal).normalize();

    let range = (0..4)
        .flat_map(|i| [pa.corner(i), pb.corner(i)])
        .fold([f64::MAX, f64::MIN], |[lo, hi], corner| {
            let t = (corner - origin).dot(axis);
            [lo.min(t), hi.max(t)]
        });
    let (num_points, rms) = combined_residual([a, b]);
    let primitive = Primitive::new(
        PrimitiveKind::Line(centered_segment(origin, axis, range)),
        num_points,
        rms,
    );
    info!("Line intersecting two planes\n{}", primitive.describe(DVec3::ZERO));
    Ok(primitive)
}

/// Point where three planes meet.
pub fn intersect_three_planes(a: &Primitive, b: &Primitive, c: &Primitive) -> Result<Primitive, AlgebraError> {
    let (Some(pa), Some(pb), Some(pc)) = (plane(a), plane(b), plane(c)) else {
        return Err(AlgebraError::MismatchedSelection);
    };
    let (matrix, rhs, centroid) = plane_system(&[pa, pb, pc]);
    let lu = matrix.full_piv_lu();
    if !lu.is_invertible() {
        return Err(AlgebraError::SingularSystem);
    }
    let solution = lu.solve(&rhs).ok_or(AlgebraError::SingularSystem)?;
    let point = centroid + from_na(&solution);
    if !point.is_finite() {
        return Err(AlgebraError::SingularSystem);
    }

    let (num_points, rms) = combined_residual([a, b, c]);
    let primitive = Primitive::new(PrimitiveKind::Point(PointShape { point }), num_points, rms);
    info!("Point intersecting three planes\n{}", primitive.describe(DVec3::ZERO));
    Ok(primitive)
}

/// Point where a line (or a cylinder's axis) pierces a plane.
pub fn intersect_plane_line(plane_primitive: &Primitive, line_primitive: &Primitive) -> Result<Primitive, AlgebraError> {
    let (Some(p), Some(l)) = (plane(plane_primitive), line(line_primitive)) else {
        return Err(AlgebraError::MismatchedSelection);
    };
    let denominator = l.axis.dot(p.normal);
    if denominator == 0.0 {
        return Err(AlgebraError::NoIntersection);
    }
    let lambda = (p.center - l.center).dot(p.normal) / denominator;
    let point = l.center + l.axis * lambda;

    let (num_points, rms) = combined_residual([plane_primitive, line_primitive]);
    let primitive = Primitive::new(PrimitiveKind::Point(PointShape { point }), num_points, rms);
    info!("Point intersecting one plane and one line\n{}", primitive.describe(DVec3::ZERO));
    Ok(primitive)
}

/// Intersects a selection of primitives: two planes, three planes, or one plane and one line.
pub fn intersect_selection(selection: &[&Primitive]) -> Result<Primitive, AlgebraError> {
    let planes: Vec<&Primitive> = selection.iter().copied().filter(|p| plane(p).is_some()).collect();
    let lines: Vec<&Primitive> = selection.iter().copied().filter(|p| line(p).is_some()).collect();
    if planes.len() + lines.len() != selection.len() {
        return Err(AlgebraError::MismatchedSelection);
    }
    match (planes.as_slice(), lines.as_slice()) {
        ([a, b], []) => intersect_planes(a, b),
        ([a, b, c], []) => intersect_three_planes(a, b, c),
        ([p], [l]) => intersect_plane_line(p, l),
        _ => Err(AlgebraError::MismatchedSelection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane_primitive(center: DVec3, normal: DVec3, axes: [DVec3; 2], extents: [[f64; 2]; 2], n: u64, rms: f64) -> Primitive {
        Primitive::new(
            PrimitiveKind::Plane(PlaneShape {
                center,
                normal,
                axes,
                extents,
                num_lines: [10, 10],
            }),
            n,
            rms,
        )
    }

    fn line_of(p: &Primitive) -> LineShape {
        match p.kind {
            PrimitiveKind::Line(l) => l,
            _ => unreachable!(),
        }
    }

    fn point_of(p: &Primitive) -> DVec3 {
        match p.kind {
            PrimitiveKind::Point(s) => s.point,
            _ => unreachable!(),
        }
    }

    #[test]
    fn floor_and_wall_meet_on_the_y_axis() {
        let floor = plane_primitive(
            DVec3::new(2.0, 0.5, 0.0),
            DVec3::Z,
            [DVec3::X, DVec3::Y],
            [[-1.0, 1.0], [-1.5, 1.5]],
            100,
            0.0,
        );
        let wall = plane_primitive(
            DVec3::new(0.0, 0.0, 3.0),
            DVec3::X,
            [DVec3::Y, DVec3::Z],
            [[-4.0, 4.0], [-1.0, 1.0]],
            50,
            0.0,
        );
        let l = line_of(&intersect_planes(&floor, &wall).unwrap());
        assert_relative_eq!(l.axis.y.abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(l.center.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(l.center.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(l.length, 8.0 * 1.1, epsilon = 1e-9);
        assert_relative_eq!(l.extents[1], 4.4, epsilon = 1e-9);
    }

    #[test]
    fn parallel_planes_do_not_meet() {
        let a = plane_primitive(DVec3::ZERO, DVec3::Z, [DVec3::X, DVec3::Y], [[-1.0, 1.0]; 2], 3, 0.0);
        let b = plane_primitive(DVec3::Z, DVec3::Z, [DVec3::X, DVec3::Y], [[-1.0, 1.0]; 2], 3, 0.0);
        assert_eq!(intersect_planes(&a, &b).unwrap_err(), AlgebraError::ParallelPlanes);
    }

    #[test]
    fn three_planes_meet_in_a_corner() {
        let unit = [[-1.0, 1.0]; 2];
        let a = plane_primitive(DVec3::new(1.0, 5.0, 5.0), DVec3::X, [DVec3::Y, DVec3::Z], unit, 10, 0.1);
        let b = plane_primitive(DVec3::new(5.0, 2.0, 5.0), DVec3::Y, [DVec3::Z, DVec3::X], unit, 30, 0.2);
        let c = plane_primitive(DVec3::new(5.0, 5.0, 3.0), DVec3::Z, [DVec3::X, DVec3::Y], unit, 0, 0.0);
        let p = intersect_three_planes(&a, &b, &c).unwrap();
        assert!(point_of(&p).abs_diff_eq(DVec3::new(1.0, 2.0, 3.0), 1e-12));
        assert_eq!(p.num_points, 40);
        assert_relative_eq!(p.rms, ((0.01 * 10.0 + 0.04 * 30.0) / 40.0f64).sqrt(), epsilon = 1e-12);

        let d = plane_primitive(DVec3::ZERO, DVec3::X, [DVec3::Y, DVec3::Z], unit, 1, 0.0);
        assert_eq!(intersect_three_planes(&a, &b, &d).unwrap_err(), AlgebraError::SingularSystem);
    }

    #[test]
    fn line_pierces_plane() {
        let floor = plane_primitive(DVec3::new(0.0, 0.0, 2.0), DVec3::Z, [DVec3::X, DVec3::Y], [[-1.0, 1.0]; 2], 4, 0.0);
        let line = Primitive::new(
            PrimitiveKind::Line(LineShape {
                center: DVec3::new(1.0, 1.0, 0.0),
                axis: DVec3::new(1.0, 0.0, 1.0).normalize(),
                length: 1.0,
                extents: [-0.5, 0.5],
            }),
            2,
            0.0,
        );
        let p = intersect_selection(&[&line, &floor]).unwrap();
        assert!(point_of(&p).abs_diff_eq(DVec3::new(3.0, 1.0, 2.0), 1e-12));

        let level = Primitive::new(
            PrimitiveKind::Line(LineShape {
                center: DVec3::ZERO,
                axis: DVec3::X,
                length: 1.0,
                extents: [-0.5, 0.5],
            }),
            2,
            0.0,
        );
        assert_eq!(intersect_plane_line(&floor, &level).unwrap_err(), AlgebraError::NoIntersection);
        assert_eq!(intersect_selection(&[&line, &level]).unwrap_err(), AlgebraError::MismatchedSelection);
    }
}
