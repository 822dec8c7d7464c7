//! Deterministic synthetic images for tests and benchmarks.
//!
//! A [`BlobPattern`] is a set of anisotropic Gaussian blobs rendered
//! analytically, so a transformed copy can be rendered exactly instead of
//! being resampled from pixels.

use crate::transform::Transform;
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BACKGROUND: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    pub x: f64,
    pub y: f64,
    pub sigma_u: f64,
    pub sigma_v: f64,
    /// Orientation of the `u` axis in radians.
    pub theta: f64,
    /// Signed peak intensity relative to the mid-grey background.
    pub amplitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlobPattern {
    pub blobs: Vec<Blob>,
}

impl BlobPattern {
    /// `count` random blobs inside a `width` x `height` frame.
    pub fn random(seed: u64, count: usize, width: u32, height: u32) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let margin = 4.0;
        let blobs = (0..count)
            .map(|_| {
                let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                Blob {
                    x: rng.gen_range(margin..(width as f64 - margin).max(margin + 1.0)),
                    y: rng.gen_range(margin..(height as f64 - margin).max(margin + 1.0)),
                    sigma_u: rng.gen_range(1.5..4.5),
                    sigma_v: rng.gen_range(1.5..4.5),
                    theta: rng.gen_range(0.0..std::f64::consts::PI),
                    amplitude: sign * rng.gen_range(0.25..0.6),
                }
            })
            .collect();
        Self { blobs }
    }

    /// The same pattern moved by `transform`.
    pub fn transformed(&self, transform: &Transform) -> Self {
        let rotation = transform.rotation();
        let scale = transform.scale();
        let blobs = self
            .blobs
            .iter()
            .map(|b| {
                let (x, y) = transform.apply(b.x, b.y);
                Blob {
                    x,
                    y,
                    sigma_u: b.sigma_u * scale,
                    sigma_v: b.sigma_v * scale,
                    theta: b.theta + rotation,
                    ..*b
                }
            })
            .collect();
        Self { blobs }
    }

    pub fn intensity(&self, x: f64, y: f64) -> f64 {
        let value: f64 = self
            .blobs
            .iter()
            .map(|b| {
                let (dx, dy) = (x - b.x, y - b.y);
                let reach = 4.0 * b.sigma_u.max(b.sigma_v);
                if dx * dx + dy * dy > reach * reach {
                    return 0.0;
                }
                let (s, c) = b.theta.sin_cos();
                let u = c * dx + s * dy;
                let v = -s * dx + c * dy;
                let e = u * u / (2.0 * b.sigma_u * b.sigma_u) + v * v / (2.0 * b.sigma_v * b.sigma_v);
                b.amplitude * (-e).exp()
            })
            .sum();
        (BACKGROUND + value).clamp(0.0, 1.0)
    }

    pub fn render(&self, width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([(self.intensity(x as f64, y as f64) * 255.0).round() as u8])
        })
    }
}

/// Uniform per-pixel noise.
pub fn noise(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    GrayImage::from_fn(width, height, |_, _| Luma([rng.gen()]))
}

/// Rotation by `angle` radians about `(cx, cy)`.
pub fn rotation_about(angle: f64, cx: f64, cy: f64) -> Transform {
    let r = Transform::from_similarity(angle, 1.0, 0.0, 0.0);
    let (rx, ry) = r.apply(cx, cy);
    Transform::from_similarity(angle, 1.0, cx - rx, cy - ry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_is_deterministic() {
        assert_eq!(BlobPattern::random(1, 10, 64, 64), BlobPattern::random(1, 10, 64, 64));
        assert_ne!(BlobPattern::random(1, 10, 64, 64), BlobPattern::random(2, 10, 64, 64));
        assert_eq!(noise(16, 16, 3), noise(16, 16, 3));
    }

    #[test]
    fn test_transformed_pattern_moves_intensity() {
        let pattern = BlobPattern::random(4, 12, 80, 80);
        let t = rotation_about(0.5, 40.0, 40.0).compose(&Transform::translation_only(3.0, -2.0));
        let moved = pattern.transformed(&t);
        for &(x, y) in &[(20.0, 30.0), (41.5, 52.25), (60.0, 12.0)] {
            let (tx, ty) = t.apply(x, y);
            assert!((pattern.intensity(x, y) - moved.intensity(tx, ty)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rotation_about_fixes_centre() {
        let t = rotation_about(1.1, 10.0, -4.0);
        let (x, y) = t.apply(10.0, -4.0);
        assert!((x - 10.0).abs() < 1e-12 && (y + 4.0).abs() < 1e-12);
    }
}
