//! Gaussian and difference-of-Gaussians pyramids.

use image::GrayImage;
use ndarray::{Array2, ArrayView2, Zip};
use rayon::prelude::*;

/// Blur already present in a camera image.
const INIT_SIGMA: f32 = 0.5;

/// Octaves stop once the shorter side would drop below this.
const MIN_OCTAVE_SIDE: usize = 16;

pub fn to_float(image: &GrayImage) -> Array2<f32> {
    let (width, height) = image.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        image.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
    })
}

/// Reflect-101 border: `... 2 1 | 0 1 2 ... n-1 | n-2 ...`.
#[inline]
pub(crate) fn reflect101(mut i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let last = n as isize - 1;
    while i < 0 || i > last {
        if i < 0 {
            i = -i;
        }
        if i > last {
            i = 2 * last - i;
        }
    }
    i as usize
}

fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = ((4.0 * sigma).ceil() as usize).max(1);
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= sum);
    kernel
}

/// Separable Gaussian blur with reflect-101 borders.
pub fn gaussian_blur(input: ArrayView2<f32>, sigma: f32) -> Array2<f32> {
    let (height, width) = input.dim();
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;

    let mut temp = Array2::<f32>::zeros((height, width));
    Zip::indexed(&mut temp).par_for_each(|(y, x), out| {
        *out = kernel
            .iter()
            .enumerate()
            .map(|(k, w)| {
                let sx = reflect101(x as isize + k as isize - radius, width);
                input[[y, sx]] * w
            })
            .sum();
    });

    let mut result = Array2::<f32>::zeros((height, width));
    Zip::indexed(&mut result).par_for_each(|(y, x), out| {
        *out = kernel
            .iter()
            .enumerate()
            .map(|(k, w)| {
                let sy = reflect101(y as isize + k as isize - radius, height);
                temp[[sy, x]] * w
            })
            .sum();
    });

    result
}

/// Bilinear 2x upsampling; output pixel `u` samples input position `u / 2`.
pub fn upsample2x(input: ArrayView2<f32>) -> Array2<f32> {
    let (height, width) = input.dim();
    let mut out = Array2::<f32>::zeros((height * 2, width * 2));
    Zip::indexed(&mut out).par_for_each(|(y, x), v| {
        let (y0, fy) = (y / 2, (y % 2) as f32 * 0.5);
        let (x0, fx) = (x / 2, (x % 2) as f32 * 0.5);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);
        let top = input[[y0, x0]] * (1.0 - fx) + input[[y0, x1]] * fx;
        let bottom = input[[y1, x0]] * (1.0 - fx) + input[[y1, x1]] * fx;
        *v = top * (1.0 - fy) + bottom * fy;
    });
    out
}

/// Nearest-neighbour decimation: output pixel `u` is input pixel `2u`.
pub fn downsample2x(input: ArrayView2<f32>) -> Array2<f32> {
    let (height, width) = input.dim();
    Array2::from_shape_fn((height / 2, width / 2), |(y, x)| input[[2 * y, 2 * x]])
}

/// Gaussian scale space plus its difference-of-Gaussians layers.
pub struct ScaleSpace {
    /// `gaussians[o]` holds `layers + 3` progressively blurred images.
    pub gaussians: Vec<Vec<Array2<f32>>>,
    /// `dogs[o][i] = gaussians[o][i + 1] - gaussians[o][i]`.
    pub dogs: Vec<Vec<Array2<f32>>>,
    pub layers: usize,
    pub sigma: f32,
    /// Size of one octave-0 pixel in input pixels (0.5 when upscaled).
    pub base_step: f32,
}

impl ScaleSpace {
    pub fn build(image: ArrayView2<f32>, layers: usize, sigma: f32, upscale: bool) -> Self {
        let (base, base_step) = if upscale {
            let up = upsample2x(image);
            let sig_diff = (sigma * sigma - 4.0 * INIT_SIGMA * INIT_SIGMA).max(0.01).sqrt();
            (gaussian_blur(up.view(), sig_diff), 0.5)
        } else {
            let sig_diff = (sigma * sigma - INIT_SIGMA * INIT_SIGMA).max(0.01).sqrt();
            (gaussian_blur(image, sig_diff), 1.0)
        };

        let sigmas = layer_sigmas(sigma, layers);
        let mut gaussians: Vec<Vec<Array2<f32>>> = Vec::new();
        let mut octave_base = base;

        loop {
            let mut octave = Vec::with_capacity(layers + 3);
            octave.push(octave_base);
            for sig in sigmas.iter().skip(1) {
                let next = gaussian_blur(octave[octave.len() - 1].view(), *sig);
                octave.push(next);
            }

            let (h, w) = octave[layers].dim();
            let next_base = if h.min(w) / 2 >= MIN_OCTAVE_SIDE {
                Some(downsample2x(octave[layers].view()))
            } else {
                None
            };
            gaussians.push(octave);

            match next_base {
                Some(b) => octave_base = b,
                None => break,
            }
        }

        let dogs = gaussians
            .par_iter()
            .map(|octave| {
                octave
                    .windows(2)
                    .map(|pair| &pair[1] - &pair[0])
                    .collect::<Vec<_>>()
            })
            .collect();

        Self {
            gaussians,
            dogs,
            layers,
            sigma,
            base_step,
        }
    }

    pub fn octaves(&self) -> usize {
        self.gaussians.len()
    }

    /// Size of one pixel of octave `o` in input pixels.
    pub fn octave_step(&self, octave: usize) -> f32 {
        self.base_step * (1u64 << octave) as f32
    }
}

/// Incremental blur between consecutive layers so that layer `i` of every
/// octave carries a total sigma of `sigma * 2^(i / layers)`.
fn layer_sigmas(sigma: f32, layers: usize) -> Vec<f32> {
    let k = 2f32.powf(1.0 / layers as f32);
    let mut sigmas = vec![sigma; layers + 3];
    for (i, s) in sigmas.iter_mut().enumerate().skip(1) {
        let prev = k.powi(i as i32 - 1) * sigma;
        let total = prev * k;
        *s = (total * total - prev * prev).sqrt();
    }
    sigmas
}
