use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Length of a SIFT descriptor: 4x4 spatial cells of 8 orientation bins.
pub const DESCRIPTOR_SIZE: usize = 128;

/// A scale-space keypoint in input-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Gaussian sigma of the detection scale, in input pixels.
    pub size: f32,
    /// Dominant gradient orientation in radians, y axis pointing down.
    pub angle: f32,
    /// Absolute interpolated DoG contrast.
    pub response: f32,
    pub octave: usize,
    pub layer: usize,
}

/// Keypoints of one image together with their descriptors.
///
/// Row `i` of `descriptors` belongs to `keypoints[i]`.
#[derive(Debug, Clone)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Array2<f32>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn point(&self, idx: usize) -> (f64, f64) {
        let kp = &self.keypoints[idx];
        (kp.x as f64, kp.y as f64)
    }
}
