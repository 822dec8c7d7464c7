//! Scale- and rotation-invariant feature extraction (SIFT).

pub mod descriptor;
pub mod detector;
pub mod keypoint;
pub mod scale_space;

use crate::config::{AlignConfig, SiftConfig};
use crate::error::{AlignError, AlignResult};
use image::GrayImage;
use std::cmp::Ordering;

pub use keypoint::{Features, Keypoint, DESCRIPTOR_SIZE};
use scale_space::ScaleSpace;

/// Produces keypoints and descriptors for one image.
///
/// Implementations must be deterministic and must return descriptors of
/// [`DESCRIPTOR_SIZE`] values, one row per keypoint.
pub trait FeatureExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, image: &GrayImage) -> AlignResult<Features>;
}

/// SIFT keypoint detector and descriptor.
#[derive(Debug, Clone)]
pub struct SiftExtractor {
    pub config: SiftConfig,
    /// Keep only the strongest `max_features` keypoints; `0` keeps all.
    pub max_features: usize,
}

impl Default for SiftExtractor {
    fn default() -> Self {
        Self::new(SiftConfig::default(), 0)
    }
}

impl SiftExtractor {
    pub fn new(config: SiftConfig, max_features: usize) -> Self {
        Self {
            config,
            max_features,
        }
    }

    pub fn from_config(config: &AlignConfig) -> Self {
        Self::new(config.sift.clone(), config.max_features)
    }
}

impl FeatureExtractor for SiftExtractor {
    fn name(&self) -> &str {
        "SIFT"
    }

    fn extract(&self, image: &GrayImage) -> AlignResult<Features> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(AlignError::InvalidImage { width, height });
        }

        let pixels = scale_space::to_float(image);
        let space = ScaleSpace::build(
            pixels.view(),
            self.config.n_octave_layers,
            self.config.sigma,
            self.config.upscale_input,
        );

        let mut keypoints = detector::detect(&space, &self.config);
        let detected = keypoints.len();
        retain_best(&mut keypoints, self.max_features);

        let descriptors = descriptor::compute_descriptors(&space, &keypoints);
        tracing::trace!(
            width,
            height,
            octaves = space.octaves(),
            detected,
            kept = keypoints.len(),
            "SIFT extraction"
        );

        Ok(Features {
            keypoints,
            descriptors,
        })
    }
}

/// Keep the `max` strongest keypoints by response, ties in detection order.
fn retain_best(keypoints: &mut Vec<Keypoint>, max: usize) {
    if max == 0 || keypoints.len() <= max {
        return;
    }
    keypoints.sort_by(|a, b| b.response.partial_cmp(&a.response).unwrap_or(Ordering::Equal));
    keypoints.truncate(max);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::BlobPattern;
    use image::Luma;

    #[test]
    fn test_uniform_image_has_no_features() {
        let flat = GrayImage::from_pixel(64, 64, Luma([128]));
        let features = SiftExtractor::default().extract(&flat).unwrap();
        assert!(features.is_empty());
        assert_eq!(features.descriptors.dim(), (0, DESCRIPTOR_SIZE));
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let empty = GrayImage::new(0, 10);
        let err = SiftExtractor::default().extract(&empty).unwrap_err();
        assert_eq!(err, AlignError::InvalidImage { width: 0, height: 10 });
    }

    #[test]
    fn test_blob_features_are_within_bounds() {
        let image = BlobPattern::random(3, 30, 96, 96).render(96, 96);
        let features = SiftExtractor::default().extract(&image).unwrap();
        assert!(features.len() > 10, "only {} keypoints", features.len());
        assert_eq!(features.descriptors.nrows(), features.len());
        for kp in &features.keypoints {
            assert!(kp.x >= 0.0 && kp.x < 96.0 && kp.y >= 0.0 && kp.y < 96.0);
            assert!(kp.size > 0.0 && kp.response > 0.0);
        }
    }

    #[test]
    fn test_max_features_keeps_strongest() {
        let image = BlobPattern::random(5, 30, 96, 96).render(96, 96);
        let all = SiftExtractor::default().extract(&image).unwrap();
        let capped = SiftExtractor::new(SiftConfig::default(), 8).extract(&image).unwrap();
        assert_eq!(capped.len(), 8.min(all.len()));

        let mut responses: Vec<f32> = all.keypoints.iter().map(|k| k.response).collect();
        responses.sort_by(|a, b| b.partial_cmp(a).unwrap());
        let weakest_kept = capped.keypoints.iter().map(|k| k.response).fold(f32::MAX, f32::min);
        assert!(weakest_kept >= responses[capped.len() - 1]);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let image = BlobPattern::random(9, 25, 80, 80).render(80, 80);
        let extractor = SiftExtractor::default();
        let a = extractor.extract(&image).unwrap();
        let b = extractor.extract(&image).unwrap();
        assert_eq!(a.keypoints, b.keypoints);
        assert_eq!(a.descriptors, b.descriptors);
    }
}
