use criterion::{black_box, criterion_group, criterion_main, Criterion};
use feature_align::synthetic::{rotation_about, BlobPattern};
use feature_align::{AlignConfig, Aligner, FeatureExtractor, SiftExtractor};

fn bench_alignment(c: &mut Criterion) {
    let pattern = BlobPattern::random(11, 120, 256, 256);
    let image = pattern.render(256, 256);
    let base = pattern
        .transformed(&rotation_about(0.25, 128.0, 128.0))
        .render(256, 256);

    let extractor = SiftExtractor::default();
    c.bench_function("sift_extract_256", |b| {
        b.iter(|| extractor.extract(black_box(&image)))
    });

    let aligner = match Aligner::new(AlignConfig::default()) {
        Ok(aligner) => aligner,
        Err(e) => panic!("default configuration rejected: {e}"),
    };
    c.bench_function("align_256", |b| {
        b.iter(|| aligner.align(black_box(&base), black_box(&image)))
    });
}

criterion_group!(benches, bench_alignment);
criterion_main!(benches);
