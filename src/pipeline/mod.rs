//! Alignment pipeline: extract, match, filter, estimate.

pub mod types;

use crate::config::AlignConfig;
use crate::error::{AlignError, AlignResult};
use crate::estimation::{Point, RansacEstimator};
use crate::features::{FeatureExtractor, Features, SiftExtractor};
use crate::logging::AlignmentSpan;
use crate::matching::{FlannMatcher, RatioFilter};
use crate::transform::Transform;
use image::GrayImage;
use std::time::Instant;
use tracing::{debug, info};

pub use types::{Alignment, StageTime};

/// Neighbours requested per descriptor for the ratio test.
const KNN: usize = 2;

/// Aligns an image onto a base image with a fixed configuration.
///
/// An `Aligner` holds no per-run state and can be shared across threads.
pub struct Aligner {
    config: AlignConfig,
    extractor: Box<dyn FeatureExtractor>,
    matcher: FlannMatcher,
    filter: RatioFilter,
    estimator: RansacEstimator,
}

impl Aligner {
    /// Validate `config` and build a SIFT-based aligner.
    pub fn new(config: AlignConfig) -> AlignResult<Self> {
        let extractor = Box::new(SiftExtractor::from_config(&config));
        Self::with_extractor(config, extractor)
    }

    /// Like [`Aligner::new`] with a custom feature extractor.
    pub fn with_extractor(
        config: AlignConfig,
        extractor: Box<dyn FeatureExtractor>,
    ) -> AlignResult<Self> {
        config.validate().map_err(AlignError::InvalidConfig)?;

        Ok(Self {
            matcher: FlannMatcher::new(config.matcher.clone()),
            filter: RatioFilter::new(config.ratio_threshold, config.min_matches),
            estimator: RansacEstimator::from_config(&config),
            extractor,
            config,
        })
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    /// Transform mapping `image_to_transform` onto `base`.
    pub fn align(&self, base: &GrayImage, image_to_transform: &GrayImage) -> AlignResult<Transform> {
        self.align_with_report(base, image_to_transform)
            .map(|report| report.transform)
    }

    /// Run the whole pipeline and report per-stage statistics.
    pub fn align_with_report(
        &self,
        base: &GrayImage,
        image_to_transform: &GrayImage,
    ) -> AlignResult<Alignment> {
        let span = AlignmentSpan::new(
            self.extractor.name(),
            base.dimensions(),
            image_to_transform.dimensions(),
        );
        let _guard = span.span().enter();

        match self.run(&span, base, image_to_transform) {
            Ok(report) => {
                span.record_success(report.rotation_degrees, report.scale, report.translation);
                Ok(report)
            }
            Err(e) => {
                span.record_failure(&e);
                Err(e)
            }
        }
    }

    fn run(
        &self,
        span: &AlignmentSpan,
        base: &GrayImage,
        image_to_transform: &GrayImage,
    ) -> AlignResult<Alignment> {
        for img in [base, image_to_transform] {
            let (width, height) = img.dimensions();
            if width == 0 || height == 0 {
                return Err(AlignError::InvalidImage { width, height });
            }
        }

        let mut timings = Vec::with_capacity(4);

        let start = Instant::now();
        let (base_features, image_features) = rayon::join(
            || self.extractor.extract(base),
            || self.extractor.extract(image_to_transform),
        );
        let (base_features, image_features) = (base_features?, image_features?);
        timings.push(stage_time("extraction", start));
        span.record_feature_detection(base_features.len(), image_features.len());

        if base_features.is_empty() || image_features.is_empty() {
            return Err(AlignError::InsufficientMatches {
                found: 0,
                required: self.config.min_matches,
            });
        }

        let start = Instant::now();
        let knn = self.matcher.knn_match(
            &base_features.descriptors,
            &image_features.descriptors,
            KNN,
        );
        timings.push(stage_time("matching", start));

        let start = Instant::now();
        let good = self.filter.apply(&knn);
        timings.push(stage_time("filtering", start));
        span.record_matching(knn.len(), good.len());
        debug!(
            raw_matches = knn.len(),
            good_matches = good.len(),
            ratio = self.config.ratio_threshold,
            "ratio test applied"
        );
        self.filter.ensure_enough(good.len())?;

        let (src, dst) = correspondences(&image_features, &base_features, &good);

        let start = Instant::now();
        let estimate = self.estimator.estimate(&src, &dst)?;
        timings.push(stage_time("estimation", start));
        span.record_ransac(estimate.iterations, estimate.inlier_count, estimate.rms_error);

        let transform = estimate.transform;
        let total_time_ms = span.elapsed_ms();
        info!(
            inliers = estimate.inlier_count,
            good_matches = good.len(),
            total_time_ms,
            "alignment estimated"
        );

        Ok(Alignment {
            correlation_id: span.correlation_id(),
            extractor: self.extractor.name().to_string(),
            transform,
            rotation_degrees: transform.rotation_degrees(),
            scale: transform.scale(),
            translation: transform.translation(),
            base_keypoints: base_features.len(),
            image_keypoints: image_features.len(),
            raw_matches: knn.len(),
            good_matches: good.len(),
            inliers: estimate.inlier_count,
            ransac_iterations: estimate.iterations,
            rms_error: estimate.rms_error,
            stage_timings: timings,
            total_time_ms,
        })
    }
}

/// Source points from the transformed image, destination points from the base.
fn correspondences(
    image_features: &Features,
    base_features: &Features,
    matches: &[crate::matching::Match],
) -> (Vec<Point>, Vec<Point>) {
    matches
        .iter()
        .map(|m| (image_features.point(m.train_idx), base_features.point(m.query_idx)))
        .unzip()
}

fn stage_time(name: &str, start: Instant) -> StageTime {
    StageTime {
        stage_name: name.to_string(),
        duration_ms: start.elapsed().as_secs_f64() * 1000.0,
    }
}
