//! 128-value SIFT descriptors.

use super::keypoint::{Keypoint, DESCRIPTOR_SIZE};
use super::scale_space::ScaleSpace;
use ndarray::Array2;
use rayon::prelude::*;
use std::f32::consts::PI;

/// Spatial cells per side.
const DESCR_WIDTH: usize = 4;
/// Orientation bins per cell.
const DESCR_HIST_BINS: usize = 8;
/// Cell width in units of the keypoint sigma.
const DESCR_SCL_FCTR: f32 = 3.0;
const DESCR_MAG_THR: f32 = 0.2;

/// Compute one descriptor row per keypoint.
pub fn compute_descriptors(space: &ScaleSpace, keypoints: &[Keypoint]) -> Array2<f32> {
    let rows: Vec<[f32; DESCRIPTOR_SIZE]> = keypoints
        .par_iter()
        .map(|kp| {
            let step = space.octave_step(kp.octave);
            let img = &space.gaussians[kp.octave][kp.layer];
            describe(img, kp.x / step, kp.y / step, kp.angle, kp.size / step)
        })
        .collect();

    Array2::from_shape_fn((rows.len(), DESCRIPTOR_SIZE), |(i, j)| rows[i][j])
}

/// Descriptor of the patch around `(x, y)` (octave pixels) rotated by `-angle`.
pub(crate) fn describe(img: &Array2<f32>, x: f32, y: f32, angle: f32, scl: f32) -> [f32; DESCRIPTOR_SIZE] {
    let (rows, cols) = img.dim();
    let d = DESCR_WIDTH;
    let n = DESCR_HIST_BINS;
    let (px, py) = (x.round() as isize, y.round() as isize);

    let bins_per_rad = n as f32 / (2.0 * PI);
    let exp_scale = -1.0 / (d as f32 * d as f32 * 0.5);
    let hist_width = DESCR_SCL_FCTR * scl;
    let max_radius = ((rows * rows + cols * cols) as f32).sqrt();
    let radius = (hist_width * std::f32::consts::SQRT_2 * (d as f32 + 1.0) * 0.5)
        .round()
        .min(max_radius) as isize;
    let cos_t = angle.cos() / hist_width;
    let sin_t = angle.sin() / hist_width;

    // Padded so trilinear spill-over needs no bounds checks.
    let mut hist = vec![0.0f32; (d + 2) * (d + 2) * (n + 2)];

    for i in -radius..=radius {
        for j in -radius..=radius {
            let c_rot = j as f32 * cos_t + i as f32 * sin_t;
            let r_rot = -(j as f32) * sin_t + i as f32 * cos_t;
            let rbin = r_rot + d as f32 / 2.0 - 0.5;
            let cbin = c_rot + d as f32 / 2.0 - 0.5;
            let r = py + i;
            let c = px + j;

            if rbin <= -1.0
                || rbin >= d as f32
                || cbin <= -1.0
                || cbin >= d as f32
                || r <= 0
                || r >= rows as isize - 1
                || c <= 0
                || c >= cols as isize - 1
            {
                continue;
            }

            let (r, c) = (r as usize, c as usize);
            let dx = img[[r, c + 1]] - img[[r, c - 1]];
            let dy = img[[r + 1, c]] - img[[r - 1, c]];
            let mag = (dx * dx + dy * dy).sqrt() * ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();

            let mut ori = dy.atan2(dx) - angle;
            ori = ori.rem_euclid(2.0 * PI);
            let obin = ori * bins_per_rad;

            let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
            let (fr, fc, fo) = (rbin - r0, cbin - c0, obin - o0);
            let o0 = (o0 as isize).rem_euclid(n as isize) as usize;
            let (r0, c0) = ((r0 as isize + 1) as usize, (c0 as isize + 1) as usize);

            let v_r1 = mag * fr;
            let v_r0 = mag - v_r1;
            let v_rc11 = v_r1 * fc;
            let v_rc10 = v_r1 - v_rc11;
            let v_rc01 = v_r0 * fc;
            let v_rc00 = v_r0 - v_rc01;

            let idx = (r0 * (d + 2) + c0) * (n + 2) + o0;
            let row = (d + 2) * (n + 2);
            let col = n + 2;
            for (base, v) in [
                (idx, v_rc00),
                (idx + col, v_rc01),
                (idx + row, v_rc10),
                (idx + row + col, v_rc11),
            ] {
                let v1 = v * fo;
                hist[base] += v - v1;
                hist[base + 1] += v1;
            }
        }
    }

    let mut descriptor = [0.0f32; DESCRIPTOR_SIZE];
    for i in 0..d {
        for j in 0..d {
            let idx = ((i + 1) * (d + 2) + (j + 1)) * (n + 2);
            hist[idx] += hist[idx + n];
            hist[idx + 1] += hist[idx + n + 1];
            for k in 0..n {
                descriptor[(i * d + j) * n + k] = hist[idx + k];
            }
        }
    }

    normalize(&mut descriptor);
    descriptor
}

/// L2-normalise, clamp large components, renormalise.
fn normalize(descriptor: &mut [f32; DESCRIPTOR_SIZE]) {
    let norm = descriptor.iter().map(|v| v * v).sum::<f32>().sqrt();
    let threshold = norm * DESCR_MAG_THR;
    descriptor.iter_mut().for_each(|v| *v = v.min(threshold));

    let norm = descriptor.iter().map(|v| v * v).sum::<f32>().sqrt();
    let scale = 1.0 / norm.max(f32::EPSILON);
    descriptor.iter_mut().for_each(|v| *v *= scale);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_patch(angle: f32) -> Array2<f32> {
        // Off-centre bright spot plus an elongated dark bar, rotated by `angle`.
        let (s, c) = angle.sin_cos();
        Array2::from_shape_fn((61, 61), |(y, x)| {
            let (dx, dy) = (x as f32 - 30.0, y as f32 - 30.0);
            let u = c * dx + s * dy;
            let v = -s * dx + c * dy;
            let spot = (-((u - 4.0).powi(2) + (v + 2.0).powi(2)) / 18.0).exp();
            let bar = (-((u + 3.0).powi(2) / 60.0 + (v - 5.0).powi(2) / 6.0)).exp();
            0.5 + 0.4 * spot - 0.3 * bar
        })
    }

    fn distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
    }

    #[test]
    fn test_descriptor_is_unit_length_and_clamped() {
        let img = blob_patch(0.0);
        let desc = describe(&img, 30.0, 30.0, 0.0, 2.5);
        let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!(desc.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_descriptor_rotation_invariance() {
        let angle = 0.6f32;
        let upright = describe(&blob_patch(0.0), 30.0, 30.0, 0.0, 2.5);
        let rotated = describe(&blob_patch(angle), 30.0, 30.0, angle, 2.5);
        let other = describe(&blob_patch(0.0), 30.0, 30.0, 1.9, 2.5);

        let same = distance(&upright, &rotated);
        let different = distance(&upright, &other);
        assert!(same < 0.3, "rotated copy too far: {same}");
        assert!(same < different * 0.7, "same={same} different={different}");
    }

    #[test]
    fn test_flat_patch_yields_zero_descriptor() {
        let img = Array2::from_elem((40, 40), 0.5f32);
        let desc = describe(&img, 20.0, 20.0, 0.0, 2.0);
        assert!(desc.iter().all(|v| *v == 0.0));
    }
}
