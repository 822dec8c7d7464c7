//! 2x3 partial-affine (similarity) transform.

use serde::{Deserialize, Serialize};

/// A 4-DOF similarity stored as a 2x3 matrix `[[a, -b, tx], [b, a, ty]]`.
///
/// `a = s·cos θ` and `b = s·sin θ`, so the linear part is a rotation by θ
/// scaled uniformly by `s`. Points are mapped as `p' = M · [x, y, 1]ᵀ`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub matrix: [[f64; 3]; 2],
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        }
    }

    /// Build from rotation (radians), uniform scale and translation.
    pub fn from_similarity(rotation: f64, scale: f64, tx: f64, ty: f64) -> Self {
        let (sin, cos) = rotation.sin_cos();
        Self::from_params(scale * cos, scale * sin, tx, ty)
    }

    /// Build from the raw parameters `a`, `b`, `tx`, `ty`.
    pub fn from_params(a: f64, b: f64, tx: f64, ty: f64) -> Self {
        Self {
            matrix: [[a, -b, tx], [b, a, ty]],
        }
    }

    pub fn translation_only(tx: f64, ty: f64) -> Self {
        Self::from_params(1.0, 0.0, tx, ty)
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.matrix;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }

    /// Rotation angle in radians, in `(-π, π]`.
    pub fn rotation(&self) -> f64 {
        self.matrix[1][0].atan2(self.matrix[0][0])
    }

    pub fn rotation_degrees(&self) -> f64 {
        self.rotation().to_degrees()
    }

    pub fn scale(&self) -> f64 {
        self.matrix[0][0].hypot(self.matrix[1][0])
    }

    pub fn translation(&self) -> (f64, f64) {
        (self.matrix[0][2], self.matrix[1][2])
    }

    /// Inverse transform, `None` when the scale is zero.
    pub fn inverse(&self) -> Option<Self> {
        let a = self.matrix[0][0];
        let b = self.matrix[1][0];
        let det = a * a + b * b;
        if det <= f64::EPSILON || !det.is_finite() {
            return None;
        }
        let (ia, ib) = (a / det, -b / det);
        let (tx, ty) = self.translation();
        Some(Self::from_params(
            ia,
            ib,
            -(ia * tx - ib * ty),
            -(ib * tx + ia * ty),
        ))
    }

    /// Composition `self ∘ other`: applies `other` first.
    pub fn compose(&self, other: &Transform) -> Self {
        let (a1, b1) = (self.matrix[0][0], self.matrix[1][0]);
        let (a2, b2) = (other.matrix[0][0], other.matrix[1][0]);
        let (tx, ty) = self.apply(other.matrix[0][2], other.matrix[1][2]);
        Self::from_params(a1 * a2 - b1 * b2, a1 * b2 + b1 * a2, tx, ty)
    }

    pub fn is_finite(&self) -> bool {
        self.matrix.iter().flatten().all(|v| v.is_finite())
    }

    /// Largest absolute element-wise difference to another transform.
    pub fn max_abs_diff(&self, other: &Transform) -> f64 {
        self.matrix
            .iter()
            .flatten()
            .zip(other.matrix.iter().flatten())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_6;

    #[test]
    fn test_similarity_decomposition() {
        let t = Transform::from_similarity(FRAC_PI_6, 1.5, 4.0, -2.0);
        assert!((t.rotation() - FRAC_PI_6).abs() < 1e-12);
        assert!((t.rotation_degrees() - 30.0).abs() < 1e-9);
        assert!((t.scale() - 1.5).abs() < 1e-12);
        assert_eq!(t.translation(), (4.0, -2.0));
        assert_eq!(t.matrix[0][1], -t.matrix[1][0]);
        assert_eq!(t.matrix[0][0], t.matrix[1][1]);
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = Transform::from_similarity(-0.4, 0.8, 12.0, 3.5);
        let inv = t.inverse().unwrap();
        let (x, y) = t.apply(17.0, -5.0);
        let (bx, by) = inv.apply(x, y);
        assert!((bx - 17.0).abs() < 1e-9 && (by + 5.0).abs() < 1e-9);
        assert!(t.compose(&inv).max_abs_diff(&Transform::identity()) < 1e-12);
    }

    #[test]
    fn test_degenerate_has_no_inverse() {
        let t = Transform::from_params(0.0, 0.0, 1.0, 1.0);
        assert!(t.inverse().is_none());
    }

    #[test]
    fn test_serialization_shape() {
        let value = serde_json::to_value(Transform::translation_only(2.0, 3.0)).unwrap();
        let rows = value["matrix"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].as_array().unwrap().len(), 3);
        assert_eq!(rows[1][2].as_f64(), Some(3.0));
    }
}
