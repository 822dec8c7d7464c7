use super::matcher::KnnMatch;
use crate::error::{AlignError, AlignResult};
use serde::Serialize;

/// A correspondence that survived the ratio test.
///
/// `query_idx` indexes the base image features, `train_idx` the features of
/// the image being transformed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// Lowe's ratio test followed by a minimum-count check.
#[derive(Debug, Clone, Copy)]
pub struct RatioFilter {
    pub ratio: f32,
    pub min_matches: usize,
}

impl RatioFilter {
    pub fn new(ratio: f32, min_matches: usize) -> Self {
        Self { ratio, min_matches }
    }

    /// Keep entries whose best distance is below `ratio` times the second
    /// best. Order follows the input; entries without two neighbours are
    /// dropped.
    pub fn apply(&self, knn: &[KnnMatch]) -> Vec<Match> {
        knn.iter()
            .filter_map(|m| match m.neighbors.as_slice() {
                [best, second, ..] if best.distance < self.ratio * second.distance => Some(Match {
                    query_idx: m.query_idx,
                    train_idx: best.train_idx,
                    distance: best.distance,
                }),
                _ => None,
            })
            .collect()
    }

    /// [`apply`](Self::apply), failing when fewer than `min_matches` remain.
    pub fn filter(&self, knn: &[KnnMatch]) -> AlignResult<Vec<Match>> {
        let good = self.apply(knn);
        self.ensure_enough(good.len())?;
        Ok(good)
    }

    pub fn ensure_enough(&self, found: usize) -> AlignResult<()> {
        if found < self.min_matches {
            return Err(AlignError::InsufficientMatches {
                found,
                required: self.min_matches,
            });
        }
        Ok(())
    }
}
