//! Descriptor matching and ratio-test filtering.

pub mod filter;
pub mod kdtree;
pub mod matcher;

pub use filter::{Match, RatioFilter};
pub use kdtree::KdForest;
pub use matcher::{FlannMatcher, KnnMatch, Neighbor};
