use nalgebra::{Matrix2, Vector2};
use std::ops::Index;

/// Six-coefficient affine transform in the GDAL convention:
///
/// ```text
/// x' = c[0] + x * c[1] + y * c[2]
/// y' = c[3] + x * c[4] + y * c[5]
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    pub fn new(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }

    pub fn coefficients(&self) -> &[f64; 6] {
        &self.0
    }

    /// Apply the transform to a single point
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let c = &self.0;
        (c[0] + x * c[1] + y * c[2], c[3] + x * c[4] + y * c[5])
    }

    /// True when the transform has no rotation/shear terms
    pub fn is_axis_aligned(&self) -> bool {
        self.0[2] == 0.0 && self.0[4] == 0.0
    }

    /// Compute the inverse transform, or `None` if the linear part is singular
    pub fn invert(&self) -> Option<GeoTransform> {
        let c = &self.0;

        if self.is_axis_aligned() && c[1] != 0.0 && c[5] != 0.0 {
            return Some(GeoTransform([
                -c[0] / c[1],
                1.0 / c[1],
                0.0,
                -c[3] / c[5],
                0.0,
                1.0 / c[5],
            ]));
        }

        let linear = Matrix2::new(c[1], c[2], c[4], c[5]);
        let det = linear.determinant();
        let magnitude = c[1].abs().max(c[2].abs()).max(c[4].abs()).max(c[5].abs());
        // Also rejects NaN and the all-zero matrix
        if !(det.abs() > 1e-10 * magnitude * magnitude) {
            return None;
        }

        let inverse = linear.try_inverse()?;
        let origin = -(inverse * Vector2::new(c[0], c[3]));

        Some(GeoTransform([
            origin.x,
            inverse[(0, 0)],
            inverse[(0, 1)],
            origin.y,
            inverse[(1, 0)],
            inverse[(1, 1)],
        ]))
    }
}

impl Index<usize> for GeoTransform {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }
}
