use super::kdtree::KdForest;
use crate::config::MatcherConfig;
use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;

/// One neighbour of a query descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub train_idx: usize,
    /// Euclidean descriptor distance.
    pub distance: f32,
}

/// The nearest train descriptors of one query descriptor, closest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnnMatch {
    pub query_idx: usize,
    pub neighbors: Vec<Neighbor>,
}

/// Approximate k-nearest-neighbour matcher backed by a randomized kd-forest.
#[derive(Debug, Clone)]
pub struct FlannMatcher {
    pub config: MatcherConfig,
}

impl Default for FlannMatcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

impl FlannMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// For every row of `query`, its `k` nearest rows of `train`.
    ///
    /// Always returns one entry per query row; entries hold fewer than `k`
    /// neighbours when `train` has fewer than `k` rows.
    pub fn knn_match(&self, query: &Array2<f32>, train: &Array2<f32>, k: usize) -> Vec<KnnMatch> {
        let forest = KdForest::build(
            train.view(),
            self.config.trees,
            self.config.leaf_size,
            self.config.seed,
        );

        (0..query.nrows())
            .into_par_iter()
            .map(|query_idx| {
                let neighbors = forest
                    .knn(query.row(query_idx), k, self.config.checks)
                    .into_iter()
                    .map(|(train_idx, dist_sq)| Neighbor {
                        train_idx,
                        distance: dist_sq.sqrt(),
                    })
                    .collect();
                KnnMatch {
                    query_idx,
                    neighbors,
                }
            })
            .collect()
    }
}
