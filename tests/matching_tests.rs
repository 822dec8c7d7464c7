mod common;

use common::{pattern, render};
use feature_align::config::MatcherConfig;
use feature_align::matching::{FlannMatcher, RatioFilter};
use feature_align::synthetic::rotation_about;
use feature_align::{FeatureExtractor, SiftExtractor, Transform};

#[test]
fn test_raising_ratio_never_loses_matches() {
    let source = pattern();
    let base = render(&source.transformed(&rotation_about(0.3, 80.0, 80.0)));
    let image = render(&source);

    let extractor = SiftExtractor::default();
    let base_features = extractor.extract(&base).unwrap();
    let image_features = extractor.extract(&image).unwrap();
    let knn = FlannMatcher::default().knn_match(&base_features.descriptors, &image_features.descriptors, 2);

    let counts: Vec<usize> = [0.3, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]
        .iter()
        .map(|&ratio| RatioFilter::new(ratio, 0).apply(&knn).len())
        .collect();

    assert!(counts.windows(2).all(|w| w[0] <= w[1]), "counts {:?}", counts);
    assert!(counts[3] >= 10, "too few matches at 0.7: {:?}", counts);
}

#[test]
fn test_surviving_matches_point_at_the_same_blob() {
    let source = pattern();
    let truth = Transform::translation_only(9.0, 4.0);
    let base = render(&source.transformed(&truth));
    let image = render(&source);

    let extractor = SiftExtractor::default();
    let base_features = extractor.extract(&base).unwrap();
    let image_features = extractor.extract(&image).unwrap();
    let knn = FlannMatcher::default().knn_match(&base_features.descriptors, &image_features.descriptors, 2);
    let good = RatioFilter::new(0.7, 10).filter(&knn).unwrap();

    let correct = good
        .iter()
        .filter(|m| {
            let (x, y) = image_features.point(m.train_idx);
            let (tx, ty) = truth.apply(x, y);
            let (bx, by) = base_features.point(m.query_idx);
            (tx - bx).hypot(ty - by) < 3.0
        })
        .count();
    assert!(
        correct * 10 >= good.len() * 8,
        "only {correct} of {} matches are geometrically correct",
        good.len()
    );
}

#[test]
fn test_matcher_seed_controls_output() {
    let image = render(&pattern());
    let features = SiftExtractor::default().extract(&image).unwrap();

    let matcher = FlannMatcher::new(MatcherConfig {
        checks: 16,
        ..MatcherConfig::default()
    });
    let a = matcher.knn_match(&features.descriptors, &features.descriptors, 2);
    let b = matcher.knn_match(&features.descriptors, &features.descriptors, 2);
    assert_eq!(a, b);
    assert_eq!(a.len(), features.len());
    for m in &a {
        assert_eq!(m.neighbors.len(), 2);
        assert!(m.neighbors[0].distance <= m.neighbors[1].distance);
    }
}
