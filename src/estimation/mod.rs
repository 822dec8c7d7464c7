//! Robust 4-DOF transform estimation.

pub mod ransac;
pub mod similarity;

pub use ransac::{Estimate, RansacEstimator};
pub use similarity::{degeneracy, fit_similarity, Point};
