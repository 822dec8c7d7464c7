//! Scale-space extrema detection and orientation assignment.

use super::keypoint::Keypoint;
use super::scale_space::ScaleSpace;
use crate::config::SiftConfig;
use ndarray::Array2;
use rayon::prelude::*;
use std::f32::consts::PI;

/// Width of the border in which extrema are ignored.
pub(crate) const IMG_BORDER: usize = 5;
const MAX_INTERP_STEPS: usize = 5;
const ORI_HIST_BINS: usize = 36;
const ORI_SIG_FCTR: f32 = 1.5;
const ORI_RADIUS: f32 = 3.0 * ORI_SIG_FCTR;
const ORI_PEAK_RATIO: f32 = 0.8;

/// Sub-pixel refined DoG extremum in octave coordinates.
#[derive(Debug, Clone, Copy)]
struct Extremum {
    layer: usize,
    r: usize,
    c: usize,
    /// Offsets `(x, y, scale)` from the integer sample.
    offset: [f64; 3],
    contrast: f64,
}

/// Detect oriented keypoints over all octaves.
pub fn detect(space: &ScaleSpace, config: &SiftConfig) -> Vec<Keypoint> {
    let per_octave: Vec<Vec<Keypoint>> = (0..space.octaves())
        .into_par_iter()
        .map(|octave| detect_octave(space, config, octave))
        .collect();

    per_octave.into_iter().flatten().collect()
}

fn detect_octave(space: &ScaleSpace, config: &SiftConfig, octave: usize) -> Vec<Keypoint> {
    let dogs = &space.dogs[octave];
    let layers = space.layers;
    let (height, width) = dogs[0].dim();
    if height <= 2 * IMG_BORDER || width <= 2 * IMG_BORDER {
        return Vec::new();
    }

    let threshold = 0.5 * config.contrast_threshold / layers as f32;
    let mut extrema = Vec::new();

    for layer in 1..=layers {
        let (prev, cur, next) = (&dogs[layer - 1], &dogs[layer], &dogs[layer + 1]);
        for r in IMG_BORDER..height - IMG_BORDER {
            for c in IMG_BORDER..width - IMG_BORDER {
                let val = cur[[r, c]];
                if val.abs() <= threshold || !is_extremum([prev, cur, next], r, c, val) {
                    continue;
                }
                if let Some(e) = interpolate_extremum(dogs, layers, layer, r, c, config) {
                    extrema.push(e);
                }
            }
        }
    }

    // Neighbouring candidates can converge on the same sample.
    extrema.sort_by_key(|e| (e.layer, e.r, e.c));
    extrema.dedup_by_key(|e| (e.layer, e.r, e.c));

    let step = space.octave_step(octave);
    let mut keypoints = Vec::with_capacity(extrema.len());
    for e in extrema {
        let scl_octv =
            space.sigma * 2f32.powf((e.layer as f32 + e.offset[2] as f32) / layers as f32);
        let hist = orientation_histogram(
            &space.gaussians[octave][e.layer],
            e.r,
            e.c,
            (ORI_RADIUS * scl_octv).round() as isize,
            ORI_SIG_FCTR * scl_octv,
        );

        let base = Keypoint {
            x: (e.c as f32 + e.offset[0] as f32) * step,
            y: (e.r as f32 + e.offset[1] as f32) * step,
            size: scl_octv * step,
            angle: 0.0,
            response: e.contrast.abs() as f32,
            octave,
            layer: e.layer,
        };
        keypoints.extend(
            dominant_orientations(&hist)
                .into_iter()
                .map(|angle| Keypoint { angle, ..base }),
        );
    }

    keypoints
}

fn is_extremum(images: [&Array2<f32>; 3], r: usize, c: usize, val: f32) -> bool {
    for img in images {
        for y in r - 1..=r + 1 {
            for x in c - 1..=c + 1 {
                let v = img[[y, x]];
                if (val > 0.0 && v > val) || (val < 0.0 && v < val) {
                    return false;
                }
            }
        }
    }
    true
}

/// Gradient and Hessian of the DoG at `(layer, r, c)`, ordered `(x, y, s)`.
fn derivatives(dogs: &[Array2<f32>], layer: usize, r: usize, c: usize) -> ([f64; 3], [[f64; 3]; 3]) {
    let img = |l: usize, y: usize, x: usize| dogs[l][[y, x]] as f64;
    let (p, n) = (layer - 1, layer + 1);

    let gradient = [
        (img(layer, r, c + 1) - img(layer, r, c - 1)) * 0.5,
        (img(layer, r + 1, c) - img(layer, r - 1, c)) * 0.5,
        (img(n, r, c) - img(p, r, c)) * 0.5,
    ];

    let v2 = img(layer, r, c) * 2.0;
    let dxx = img(layer, r, c + 1) + img(layer, r, c - 1) - v2;
    let dyy = img(layer, r + 1, c) + img(layer, r - 1, c) - v2;
    let dss = img(n, r, c) + img(p, r, c) - v2;
    let dxy = (img(layer, r + 1, c + 1) - img(layer, r + 1, c - 1) - img(layer, r - 1, c + 1)
        + img(layer, r - 1, c - 1))
        * 0.25;
    let dxs = (img(n, r, c + 1) - img(n, r, c - 1) - img(p, r, c + 1) + img(p, r, c - 1)) * 0.25;
    let dys = (img(n, r + 1, c) - img(n, r - 1, c) - img(p, r + 1, c) + img(p, r - 1, c)) * 0.25;

    (
        gradient,
        [[dxx, dxy, dxs], [dxy, dyy, dys], [dxs, dys, dss]],
    )
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Solve `h · x = b` by Cramer's rule.
fn solve3(h: &[[f64; 3]; 3], b: &[f64; 3]) -> Option<[f64; 3]> {
    let det = det3(h);
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let mut x = [0.0; 3];
    for (col, out) in x.iter_mut().enumerate() {
        let mut m = *h;
        for row in 0..3 {
            m[row][col] = b[row];
        }
        *out = det3(&m) / det;
    }
    Some(x)
}

/// Quadratic sub-pixel refinement followed by contrast and edge rejection.
fn interpolate_extremum(
    dogs: &[Array2<f32>],
    layers: usize,
    mut layer: usize,
    mut r: usize,
    mut c: usize,
    config: &SiftConfig,
) -> Option<Extremum> {
    let (height, width) = dogs[0].dim();
    let mut offset = [0.0; 3];
    let mut converged = false;

    for _ in 0..MAX_INTERP_STEPS {
        let (gradient, hessian) = derivatives(dogs, layer, r, c);
        let x = solve3(&hessian, &gradient)?;
        offset = [-x[0], -x[1], -x[2]];

        if offset.iter().all(|v| v.abs() < 0.5) {
            converged = true;
            break;
        }
        if offset.iter().any(|v| v.abs() > (i32::MAX / 3) as f64) {
            return None;
        }

        let nc = c as i64 + offset[0].round() as i64;
        let nr = r as i64 + offset[1].round() as i64;
        let nl = layer as i64 + offset[2].round() as i64;
        let border = IMG_BORDER as i64;
        if nl < 1
            || nl > layers as i64
            || nc < border
            || nc >= width as i64 - border
            || nr < border
            || nr >= height as i64 - border
        {
            return None;
        }
        c = nc as usize;
        r = nr as usize;
        layer = nl as usize;
    }

    if !converged {
        return None;
    }

    let (gradient, hessian) = derivatives(dogs, layer, r, c);
    let t: f64 = gradient.iter().zip(&offset).map(|(g, o)| g * o).sum();
    let contrast = dogs[layer][[r, c]] as f64 + t * 0.5;
    if contrast.abs() * (layers as f64) < config.contrast_threshold as f64 {
        return None;
    }

    let (dxx, dyy, dxy) = (hessian[0][0], hessian[1][1], hessian[0][1]);
    let tr = dxx + dyy;
    let det = dxx * dyy - dxy * dxy;
    let edge = config.edge_threshold as f64;
    if det <= 0.0 || tr * tr * edge >= (edge + 1.0) * (edge + 1.0) * det {
        return None;
    }

    Some(Extremum {
        layer,
        r,
        c,
        offset,
        contrast,
    })
}

/// Smoothed 36-bin histogram of gradient orientations around `(r, c)`.
pub(crate) fn orientation_histogram(
    img: &Array2<f32>,
    r: usize,
    c: usize,
    radius: isize,
    sigma: f32,
) -> [f32; ORI_HIST_BINS] {
    let (height, width) = img.dim();
    let n = ORI_HIST_BINS;
    let expf_scale = -1.0 / (2.0 * sigma * sigma);
    let mut raw = [0.0f32; ORI_HIST_BINS];

    for i in -radius..=radius {
        let y = r as isize + i;
        if y <= 0 || y >= height as isize - 1 {
            continue;
        }
        for j in -radius..=radius {
            let x = c as isize + j;
            if x <= 0 || x >= width as isize - 1 {
                continue;
            }
            let (y, x) = (y as usize, x as usize);
            let dx = img[[y, x + 1]] - img[[y, x - 1]];
            let dy = img[[y + 1, x]] - img[[y - 1, x]];
            let weight = (((i * i + j * j) as f32) * expf_scale).exp();
            let mag = (dx * dx + dy * dy).sqrt();

            let mut ori = dy.atan2(dx);
            if ori < 0.0 {
                ori += 2.0 * PI;
            }
            let bin = ((n as f32 / (2.0 * PI)) * ori).round() as usize % n;
            raw[bin] += weight * mag;
        }
    }

    let mut hist = [0.0f32; ORI_HIST_BINS];
    for (i, h) in hist.iter_mut().enumerate() {
        let at = |k: isize| raw[(i as isize + k).rem_euclid(n as isize) as usize];
        *h = (at(-2) + at(2)) * (1.0 / 16.0) + (at(-1) + at(1)) * (4.0 / 16.0) + at(0) * (6.0 / 16.0);
    }
    hist
}

/// Angles (radians, `[0, 2π)`) of every local histogram peak within
/// `ORI_PEAK_RATIO` of the maximum, refined by parabolic interpolation.
pub(crate) fn dominant_orientations(hist: &[f32; ORI_HIST_BINS]) -> Vec<f32> {
    let n = ORI_HIST_BINS;
    let max = hist.iter().cloned().fold(0.0f32, f32::max);
    let threshold = max * ORI_PEAK_RATIO;

    let mut angles = Vec::new();
    for j in 0..n {
        let l = hist[(j + n - 1) % n];
        let r = hist[(j + 1) % n];
        let v = hist[j];
        if v > l && v > r && v >= threshold {
            let mut bin = j as f32 + 0.5 * (l - r) / (l - 2.0 * v + r);
            if bin < 0.0 {
                bin += n as f32;
            } else if bin >= n as f32 {
                bin -= n as f32;
            }
            angles.push(bin * 2.0 * PI / n as f32);
        }
    }
    angles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve3() {
        let h = [[2.0, 0.0, 0.0], [0.0, 4.0, 1.0], [0.0, 1.0, 3.0]];
        let x = solve3(&h, &[2.0, 5.0, 4.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
        assert!((x[2] - 1.0).abs() < 1e-12);
        assert!(solve3(&[[0.0; 3]; 3], &[1.0, 1.0, 1.0]).is_none());
    }

    #[test]
    fn test_orientation_of_horizontal_ramp() {
        // Intensity grows with x, so gradients point along +x.
        let img = Array2::from_shape_fn((31, 31), |(_, x)| x as f32 / 30.0);
        let hist = orientation_histogram(&img, 15, 15, 6, 2.0);
        let angles = dominant_orientations(&hist);
        assert_eq!(angles.len(), 1);
        let a = angles[0];
        assert!(a < 0.05 || (2.0 * PI - a) < 0.05, "angle {a}");
    }

    #[test]
    fn test_orientation_of_vertical_ramp() {
        // Intensity grows downwards: +y in image coordinates is +90°.
        let img = Array2::from_shape_fn((31, 31), |(y, _)| y as f32 / 30.0);
        let hist = orientation_histogram(&img, 15, 15, 6, 2.0);
        let angles = dominant_orientations(&hist);
        assert_eq!(angles.len(), 1);
        assert!((angles[0] - PI / 2.0).abs() < 0.05);
    }

    #[test]
    fn test_flat_histogram_has_no_peaks() {
        let img = Array2::from_elem((20, 20), 0.3f32);
        let hist = orientation_histogram(&img, 10, 10, 5, 2.0);
        assert!(dominant_orientations(&hist).is_empty());
    }
}
