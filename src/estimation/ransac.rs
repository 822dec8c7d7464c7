use super::similarity::{degeneracy, fit_similarity, reprojection_error, Point};
use crate::config::{AlignConfig, RansacConfig};
use crate::error::{AlignError, AlignResult};
use crate::transform::Transform;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::Serialize;

/// Outcome of a robust fit.
#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    pub transform: Transform,
    /// `inliers[i]` is true when pair `i` agrees with `transform`.
    pub inliers: Vec<bool>,
    pub inlier_count: usize,
    pub iterations: usize,
    /// Root-mean-square reprojection error over the inliers, in pixels.
    pub rms_error: f64,
}

/// RANSAC estimator for 4-DOF similarity transforms.
#[derive(Debug, Clone)]
pub struct RansacEstimator {
    pub inlier_tolerance: f64,
    pub config: RansacConfig,
}

struct Hypothesis {
    transform: Transform,
    inliers: usize,
    residual: f64,
}

impl RansacEstimator {
    pub fn new(inlier_tolerance: f64, config: RansacConfig) -> Self {
        Self {
            inlier_tolerance,
            config,
        }
    }

    pub fn from_config(config: &AlignConfig) -> Self {
        Self::new(config.inlier_tolerance, config.ransac.clone())
    }

    /// Fit the similarity that maps `src` onto `dst`.
    pub fn estimate(&self, src: &[Point], dst: &[Point]) -> AlignResult<Estimate> {
        if src.len() != dst.len() {
            return Err(AlignError::estimation(format!(
                "point sets differ in length ({} vs {})",
                src.len(),
                dst.len()
            )));
        }
        if src.len() < 2 {
            return Err(AlignError::estimation(format!(
                "need at least 2 correspondences, got {}",
                src.len()
            )));
        }
        if let Some(reason) = degeneracy(src).or_else(|| degeneracy(dst)) {
            return Err(AlignError::estimation(format!("degenerate correspondences: {reason}")));
        }

        let n = src.len();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut best: Option<Hypothesis> = None;
        let mut needed = self.config.max_iterations;
        let mut iterations = 0;

        while iterations < needed {
            iterations += 1;

            let sample = index::sample(&mut rng, n, 2);
            let (i, j) = (sample.index(0), sample.index(1));
            if coincident(src[i], src[j]) || coincident(dst[i], dst[j]) {
                continue;
            }
            let Some(model) = fit_similarity(&[src[i], src[j]], &[dst[i], dst[j]]) else {
                continue;
            };

            let (inliers, residual) = self.score(&model, src, dst);
            let improves = match &best {
                None => inliers > 0,
                Some(b) => inliers > b.inliers || (inliers == b.inliers && residual < b.residual),
            };
            if improves {
                needed = needed.min(self.adaptive_iterations(inliers, n));
                best = Some(Hypothesis {
                    transform: model,
                    inliers,
                    residual,
                });
            }
        }

        let best = match best {
            Some(b) if b.inliers >= self.config.min_inliers => b,
            Some(b) => {
                return Err(AlignError::estimation(format!(
                    "best model has {} inliers, need {}",
                    b.inliers, self.config.min_inliers
                )))
            }
            None => return Err(AlignError::estimation("no valid minimal sample")),
        };

        let (transform, inliers) = self.refine(best.transform, src, dst);
        let inlier_count = inliers.iter().filter(|&&v| v).count();

        let inlier_src: Vec<Point> = select(src, &inliers);
        if let Some(reason) = degeneracy(&inlier_src) {
            return Err(AlignError::estimation(format!("degenerate inlier set: {reason}")));
        }
        if !transform.is_finite() || transform.scale() <= f64::EPSILON {
            return Err(AlignError::estimation("estimated transform is singular"));
        }

        let sq_sum: f64 = src
            .iter()
            .zip(dst)
            .zip(&inliers)
            .filter(|(_, &inlier)| inlier)
            .map(|((s, d), _)| reprojection_error(&transform, *s, *d).powi(2))
            .sum();
        let rms_error = (sq_sum / inlier_count.max(1) as f64).sqrt();

        tracing::trace!(
            iterations,
            inliers = inlier_count,
            total = n,
            rms_error,
            "RANSAC finished"
        );

        Ok(Estimate {
            transform,
            inliers,
            inlier_count,
            iterations,
            rms_error,
        })
    }

    fn score(&self, model: &Transform, src: &[Point], dst: &[Point]) -> (usize, f64) {
        src.iter()
            .zip(dst)
            .map(|(s, d)| reprojection_error(model, *s, *d))
            .filter(|err| *err < self.inlier_tolerance)
            .fold((0, 0.0), |(count, sum), err| (count + 1, sum + err))
    }

    fn inlier_mask(&self, model: &Transform, src: &[Point], dst: &[Point]) -> Vec<bool> {
        src.iter()
            .zip(dst)
            .map(|(s, d)| reprojection_error(model, *s, *d) < self.inlier_tolerance)
            .collect()
    }

    /// Iterations needed to draw one all-inlier pair with the configured
    /// confidence, given the current inlier ratio.
    fn adaptive_iterations(&self, inliers: usize, total: usize) -> usize {
        let w = inliers as f64 / total as f64;
        let p_fail = (1.0 - w * w).max(f64::EPSILON);
        if p_fail >= 1.0 {
            return self.config.max_iterations;
        }
        let k = (1.0 - self.config.confidence).ln() / p_fail.ln();
        if !k.is_finite() || k >= self.config.max_iterations as f64 {
            self.config.max_iterations
        } else {
            (k.ceil() as usize).max(1)
        }
    }

    /// Least-squares refits on the inlier set until it stops changing.
    fn refine(&self, model: Transform, src: &[Point], dst: &[Point]) -> (Transform, Vec<bool>) {
        let mut model = model;
        let mut mask = self.inlier_mask(&model, src, dst);

        for _ in 0..self.config.refine_iterations {
            let Some(refined) = fit_similarity(&select(src, &mask), &select(dst, &mask)) else {
                break;
            };
            let refined_mask = self.inlier_mask(&refined, src, dst);
            if count(&refined_mask) < count(&mask) {
                break;
            }
            model = refined;
            if refined_mask == mask {
                break;
            }
            mask = refined_mask;
        }

        (model, mask)
    }
}

fn coincident(a: Point, b: Point) -> bool {
    (a.0 - b.0).hypot(a.1 - b.1) < 1e-9
}

fn count(mask: &[bool]) -> usize {
    mask.iter().filter(|&&v| v).count()
}

fn select(points: &[Point], mask: &[bool]) -> Vec<Point> {
    points
        .iter()
        .zip(mask)
        .filter(|(_, &keep)| keep)
        .map(|(p, _)| *p)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn grid(n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| ((i % 10) as f64 * 13.0 + 5.0, (i / 10) as f64 * 9.0 + 3.0))
            .collect()
    }

    fn estimator() -> RansacEstimator {
        RansacEstimator::new(3.0, RansacConfig::default())
    }

    #[test]
    fn test_recovers_transform_with_outliers() {
        let truth = Transform::from_similarity(0.4, 1.1, -20.0, 35.0);
        let src = grid(60);
        let dst: Vec<Point> = src
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let (x, y) = truth.apply(p.0, p.1);
                if i % 3 == 0 {
                    (x + 40.0 + i as f64, y - 25.0)
                } else {
                    (x, y)
                }
            })
            .collect();

        let estimate = estimator().estimate(&src, &dst).unwrap();
        assert!(estimate.transform.max_abs_diff(&truth) < 1e-6);
        assert!(estimate.inlier_count >= 40);
        assert!(estimate.inliers.iter().enumerate().all(|(i, &v)| v || i % 3 == 0));
        assert!(estimate.rms_error < 1e-6);
    }

    #[test]
    fn test_perfect_data_stops_early() {
        let truth = Transform::translation_only(4.0, -2.5);
        let src = grid(30);
        let dst: Vec<Point> = src.iter().map(|p| truth.apply(p.0, p.1)).collect();
        let estimate = estimator().estimate(&src, &dst).unwrap();
        assert_eq!(estimate.iterations, 1);
        assert_eq!(estimate.inlier_count, 30);
    }

    #[test]
    fn test_collinear_points_fail() {
        let src: Vec<Point> = (0..20).map(|i| (i as f64 * 3.0, 10.0)).collect();
        let dst: Vec<Point> = src.iter().map(|p| (p.0 + 5.0, p.1 + 1.0)).collect();
        let err = estimator().estimate(&src, &dst).unwrap_err();
        assert!(matches!(err, AlignError::EstimationFailure { .. }));
    }

    #[test]
    fn test_too_few_points_fail() {
        let err = estimator().estimate(&[(0.0, 0.0)], &[(1.0, 1.0)]).unwrap_err();
        assert!(matches!(err, AlignError::EstimationFailure { .. }));
        let err = estimator().estimate(&[(0.0, 0.0)], &[]).unwrap_err();
        assert!(matches!(err, AlignError::EstimationFailure { .. }));
    }

    #[test]
    fn test_random_pairs_do_not_reach_min_inliers() {
        let mut rng = StdRng::seed_from_u64(5);
        let src: Vec<Point> = (0..4)
            .map(|_| (rng.gen_range(0.0..500.0), rng.gen_range(0.0..500.0)))
            .collect();
        let dst: Vec<Point> = (0..4)
            .map(|_| (rng.gen_range(0.0..500.0), rng.gen_range(0.0..500.0)))
            .collect();
        let config = RansacConfig {
            min_inliers: 4,
            ..RansacConfig::default()
        };
        let err = RansacEstimator::new(0.5, config).estimate(&src, &dst).unwrap_err();
        assert!(matches!(err, AlignError::EstimationFailure { .. }));
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let truth = Transform::from_similarity(-0.2, 0.95, 3.0, 8.0);
        let src = grid(40);
        let dst: Vec<Point> = src
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let (x, y) = truth.apply(p.0, p.1);
                if i % 4 == 0 { (y, x) } else { (x + 0.3, y - 0.2) }
            })
            .collect();
        let a = estimator().estimate(&src, &dst).unwrap();
        let b = estimator().estimate(&src, &dst).unwrap();
        assert_eq!(a.transform, b.transform);
        assert_eq!(a.iterations, b.iterations);
    }
}
