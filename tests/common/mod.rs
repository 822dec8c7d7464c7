#![allow(dead_code)]

use feature_align::features::DESCRIPTOR_SIZE;
use feature_align::synthetic::BlobPattern;
use feature_align::{AlignResult, FeatureExtractor, Features, Keypoint};
use image::GrayImage;
use ndarray::Array2;

pub const SIZE: u32 = 160;

pub fn pattern() -> BlobPattern {
    BlobPattern::random(7, 70, SIZE, SIZE)
}

pub fn render(pattern: &BlobPattern) -> GrayImage {
    pattern.render(SIZE, SIZE)
}

/// Extractor that ignores pixels and returns fixed points, each with a
/// unique one-hot descriptor, so every point matches itself across images.
pub struct FixedPointExtractor {
    pub points: Vec<(f32, f32)>,
}

impl FixedPointExtractor {
    pub fn new(points: Vec<(f32, f32)>) -> Self {
        assert!(points.len() <= DESCRIPTOR_SIZE);
        Self { points }
    }
}

impl FeatureExtractor for FixedPointExtractor {
    fn name(&self) -> &str {
        "fixed"
    }

    fn extract(&self, _image: &GrayImage) -> AlignResult<Features> {
        let keypoints = self
            .points
            .iter()
            .map(|&(x, y)| Keypoint {
                x,
                y,
                size: 2.0,
                angle: 0.0,
                response: 1.0,
                octave: 0,
                layer: 1,
            })
            .collect();
        let descriptors =
            Array2::from_shape_fn((self.points.len(), DESCRIPTOR_SIZE), |(i, j)| (i == j) as u8 as f32);
        Ok(Features {
            keypoints,
            descriptors,
        })
    }
}
