//! Principal component analysis of a point set.
use glam::DVec3;

/// Centroid and principal axes, sorted by decreasing variance.
#[derive(Debug, Clone, Copy)]
pub struct Pca {
    pub centroid: DVec3,
    pub eigenvalues: [f64; 3],
    /// Unit eigenvectors matching `eigenvalues`.
    pub axes: [DVec3; 3],
}

impl Pca {
    pub fn new(points: &[DVec3]) -> Self {
        let n = points.len().max(1) as f64;
        let centroid = points.iter().copied().sum::<DVec3>() / n;

        let mut covariance = nalgebra::Matrix3::<f64>::zeros();
        for p in points {
            let d = p - centroid;
            let d = nalgebra::Vector3::new(d.x, d.y, d.z);
            covariance += d * d.transpose();
        }
        covariance /= n;

        let eigen = nalgebra::linalg::SymmetricEigen::new(covariance);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let column = |i: usize| {
            let c = eigen.eigenvectors.column(i);
            DVec3::new(c[0], c[1], c[2]).normalize_or_zero()
        };
        Self {
            centroid,
            eigenvalues: order.map(|i| eigen.eigenvalues[i].max(0.0)),
            axes: order.map(column),
        }
    }

    /// Direction of largest spread.
    pub fn major_axis(&self) -> DVec3 {
        self.axes[0]
    }

    /// Direction of least spread.
    pub fn minor_axis(&self) -> DVec3 {
        self.axes[2]
    }
}
