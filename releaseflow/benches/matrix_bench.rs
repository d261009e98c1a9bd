//! Benchmarks for matrix expansion and pattern matching.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use releaseflow::config::{MatrixConfig, MatrixExclude};
use releaseflow::matrix::BuildMatrix;
use releaseflow::trigger::{TagFilter, TriggerEvent};
use releaseflow::utils::GlobPattern;

fn matrix_benchmark(c: &mut Criterion) {
    let config = MatrixConfig {
        os: ["ubuntu-latest", "ubuntu-24.04-arm", "windows-latest", "macos-13", "macos-14"]
            .into_iter()
            .map(String::from)
            .collect(),
        runtime: ["cp39", "cp310", "cp311", "cp312", "cp313", "pp310"]
            .into_iter()
            .map(String::from)
            .collect(),
        exclude: vec![MatrixExclude {
            os: "macos-14".to_string(),
            runtime: "cp39".to_string(),
        }],
        fail_fast: true,
    };

    c.bench_function("matrix_expand_5x6", |b| {
        b.iter(|| BuildMatrix::expand(black_box(&config), black_box("cibw-")))
    });
}

fn glob_benchmark(c: &mut Criterion) {
    let filter = TagFilter::from_patterns(["v*", "release-*"]).expect("valid patterns");
    let event = TriggerEvent::new("refs/tags/v1.24.3");
    c.bench_function("tag_filter_evaluate", |b| {
        b.iter(|| filter.evaluate(black_box(&event)))
    });

    let prefix = GlobPattern::prefix("cibw-").expect("valid prefix");
    let keys: Vec<String> = (0..64)
        .map(|i| format!("cibw-wheels-ubuntu-latest-{i}"))
        .collect();
    c.bench_function("artifact_prefix_match_64", |b| {
        b.iter(|| keys.iter().filter(|k| prefix.is_match(black_box(k))).count())
    });
}

criterion_group!(benches, matrix_benchmark, glob_benchmark);
criterion_main!(benches);
