use super::pca::Pca;
use super::{axial_range, collect_points, rms};
use crate::error::FitError;
use crate::primitive::{LineShape, Primitive, PrimitiveKind};
use glam::DVec3;
use tracing::info;

/// Growth applied to the covered interval along a fitted axis.
pub(crate) const LENGTH_PADDING: f64 = 1.1;

/// Least-squares line through the points, trimmed to their padded extent.
pub fn fit_line<I>(points: I) -> Result<Primitive, FitError>
where
    I: IntoIterator<Item = DVec3>,
{
    let points = collect_points(points, 2)?;
    let pca = Pca::new(&points);
    if pca.eigenvalues[0] <= 0.0 {
        return Err(FitError::Degenerate("all points coincide"));
    }
    let axis = pca.major_axis();

    let sum_sq: f64 = points
        .iter()
        .map(|p| {
            let d = p - pca.centroid;
            (d - axis * d.dot(axis)).length_squared()
        })
        .sum();

    let line = centered_segment(pca.centroid, axis, axial_range(&points, pca.centroid, axis));
    let primitive = Primitive::new(PrimitiveKind::Line(line), points.len() as u64, rms(sum_sq, points.len()));
    info!("{}", primitive.describe(DVec3::ZERO));
    Ok(primitive)
}

/// Segment covering `range` along `axis` from `origin`, padded and re-centred so its extents are symmetric.
pub(crate) fn centered_segment(origin: DVec3, axis: DVec3, range: [f64; 2]) -> LineShape {
    let length = (range[1] - range[0]) * LENGTH_PADDING;
    LineShape {
        center: origin + axis * ((range[0] + range[1]) * 0.5),
        axis,
        length,
        extents: [-length * 0.5, length * 0.5],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn segment_is_padded_and_recentred() {
        let points = (0..11).map(|i| DVec3::new(2.0, i as f64, -1.0));
        let p = fit_line(points).unwrap();
        let PrimitiveKind::Line(line) = p.kind else {
            unreachable!()
        };
        assert_relative_eq!(line.axis.y.abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(line.length, 11.0, epsilon = 1e-9);
        assert_relative_eq!(line.extents[0], -5.5, epsilon = 1e-9);
        assert_relative_eq!(line.extents[1], 5.5, epsilon = 1e-9);
        assert!(line.center.abs_diff_eq(DVec3::new(2.0, 5.0, -1.0), 1e-9));
        assert_relative_eq!(p.rms, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn coincident_points_are_degenerate() {
        let points = [DVec3::ONE, DVec3::ONE, DVec3::ONE];
        assert!(matches!(fit_line(points), Err(FitError::Degenerate(_))));
    }
}
