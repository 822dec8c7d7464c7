//! Feature-based partial-affine image alignment.
//!
//! SIFT keypoints are matched with a randomized kd-forest, filtered with
//! Lowe's ratio test and fed to a RANSAC similarity estimator. The result is
//! a 2x3 [`Transform`] mapping the second image onto the first.

pub mod config;
pub mod error;
pub mod estimation;
pub mod features;
pub mod logging;
pub mod matching;
pub mod pipeline;
pub mod synthetic;
pub mod transform;

pub use config::AlignConfig;
pub use error::{AlignError, AlignResult};
pub use features::{FeatureExtractor, Features, Keypoint, SiftExtractor};
pub use pipeline::{Aligner, Alignment};
pub use transform::Transform;

use image::GrayImage;

/// Align `image_to_transform` onto `base_image` with the default
/// configuration.
pub fn align(base_image: &GrayImage, image_to_transform: &GrayImage) -> AlignResult<Transform> {
    Aligner::new(AlignConfig::default())?.align(base_image, image_to_transform)
}
