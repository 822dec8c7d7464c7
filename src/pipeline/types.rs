use crate::transform::Transform;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Full report of one successful alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alignment {
    pub correlation_id: Uuid,
    pub extractor: String,
    /// Maps points of the transformed image onto the base image.
    pub transform: Transform,
    pub rotation_degrees: f64,
    pub scale: f64,
    pub translation: (f64, f64),
    pub base_keypoints: usize,
    pub image_keypoints: usize,
    pub raw_matches: usize,
    pub good_matches: usize,
    pub inliers: usize,
    pub ransac_iterations: usize,
    pub rms_error: f64,
    pub stage_timings: Vec<StageTime>,
    pub total_time_ms: f64,
}

impl Alignment {
    /// Share of ratio-test survivors that agree with the transform.
    pub fn inlier_ratio(&self) -> f64 {
        if self.good_matches == 0 {
            0.0
        } else {
            self.inliers as f64 / self.good_matches as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTime {
    pub stage_name: String,
    pub duration_ms: f64,
}
