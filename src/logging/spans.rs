//! Span wrapper for one alignment run

use std::time::Instant;
use tracing::{field::Empty, span, Level, Span};
use uuid::Uuid;

/// Span covering a single `base` / `image_to_transform` alignment.
///
/// Fields start empty and are filled in as the stages complete, so a JSON
/// subscriber sees the whole run summarised on span close.
pub struct AlignmentSpan {
    span: Span,
    start_time: Instant,
    correlation_id: Uuid,
}

impl AlignmentSpan {
    pub fn new(extractor: &str, base_size: (u32, u32), image_size: (u32, u32)) -> Self {
        let correlation_id = Uuid::new_v4();
        let span = span!(
            Level::INFO,
            "alignment",
            correlation_id = %correlation_id,
            extractor = extractor,
            base_width = base_size.0,
            base_height = base_size.1,
            image_width = image_size.0,
            image_height = image_size.1,
            base_keypoints = Empty,
            image_keypoints = Empty,
            raw_matches = Empty,
            filtered_matches = Empty,
            ransac_iterations = Empty,
            ransac_inliers = Empty,
            ransac_error = Empty,
            success = Empty,
            execution_time_ms = Empty,
        );

        Self {
            span,
            start_time: Instant::now(),
            correlation_id,
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Record feature detection results
    pub fn record_feature_detection(&self, base_keypoints: usize, image_keypoints: usize) {
        self.span.record("base_keypoints", base_keypoints);
        self.span.record("image_keypoints", image_keypoints);
        tracing::debug!(
            parent: &self.span,
            base_keypoints,
            image_keypoints,
            "Feature detection completed"
        );
    }

    /// Record matching results
    pub fn record_matching(&self, raw_matches: usize, filtered_matches: usize) {
        self.span.record("raw_matches", raw_matches);
        self.span.record("filtered_matches", filtered_matches);
        tracing::debug!(
            parent: &self.span,
            raw_matches,
            filtered_matches,
            "Feature matching completed"
        );
    }

    /// Record RANSAC estimation results
    pub fn record_ransac(&self, iterations: usize, inliers: usize, rms_error: f64) {
        self.span.record("ransac_iterations", iterations);
        self.span.record("ransac_inliers", inliers);
        self.span.record("ransac_error", rms_error);
        tracing::debug!(
            parent: &self.span,
            iterations,
            inliers,
            rms_error,
            "RANSAC estimation completed"
        );
    }

    pub fn record_success(&self, rotation_deg: f64, scale: f64, translation: (f64, f64)) {
        let elapsed_ms = self.elapsed_ms();
        self.span.record("success", true);
        self.span.record("execution_time_ms", elapsed_ms);
        tracing::info!(
            parent: &self.span,
            translation = format!("({:.2}, {:.2})", translation.0, translation.1),
            rotation = format!("{:.2}°", rotation_deg),
            scale = format!("{:.3}x", scale),
            execution_time_ms = elapsed_ms,
            "Alignment completed"
        );
    }

    pub fn record_failure(&self, error: &dyn std::error::Error) {
        let elapsed_ms = self.elapsed_ms();
        self.span.record("success", false);
        self.span.record("execution_time_ms", elapsed_ms);
        tracing::warn!(
            parent: &self.span,
            error = %error,
            execution_time_ms = elapsed_ms,
            "Alignment failed"
        );
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() * 1000.0
    }

    /// Get the underlying span for manual instrumentation
    pub fn span(&self) -> &Span {
        &self.span
    }
}
