/// ルート単位・地域単位のクラスタリング性能ベンチマーク。
use std::num::NonZeroUsize;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use label_consensus::analysis::{synthetic_rows, with_invalid_longitudes};
use label_consensus::pipeline::ingest::{IngestStage, LabelValidationStage};
use label_consensus::pipeline::mode::PointScope;
use label_consensus::pipeline::{
    ConsensusEngine, DistanceMatrix, EngineSettings, ExclusiveAnnotator, ModeResolver, RunMode,
};

fn bench_route_run(c: &mut Criterion) {
    let rows = synthetic_rows(400, 5, 42);
    let plan = ModeResolver::default()
        .resolve(&RunMode::Route {
            annotators: NonZeroUsize::new(5).expect("non-zero"),
        })
        .expect("plan");
    let engine = ConsensusEngine::new(plan, EngineSettings::default());

    c.bench_function("route_run_400_features_5_annotators", |b| {
        b.iter(|| {
            let result = engine.run(rows.clone()).expect("run");
            black_box(result.clusters.len());
        });
    });
}

fn bench_distance_matrix(c: &mut Criterion) {
    let rows = synthetic_rows(600, 3, 42);
    let points = LabelValidationStage::new()
        .ingest(rows, &PointScope::All)
        .points;

    c.bench_function("distance_matrix_exclusive", |b| {
        b.iter(|| {
            let matrix = DistanceMatrix::build(&points, &ExclusiveAnnotator);
            black_box(matrix.len());
        });
    });
}

fn bench_validation(c: &mut Criterion) {
    let rows = with_invalid_longitudes(synthetic_rows(2000, 3, 11), 25);
    let stage = LabelValidationStage::new();

    c.bench_function("validate_rows_with_invalid_longitudes", |b| {
        b.iter(|| {
            let ingested = stage.ingest(rows.clone(), &PointScope::All);
            black_box(ingested.dropped_invalid_coordinate);
        });
    });
}

fn bench_region_run(c: &mut Criterion) {
    let rows = synthetic_rows(1500, 2, 7);
    let plan = ModeResolver::default()
        .resolve(&RunMode::RegionWide)
        .expect("plan");
    let engine = ConsensusEngine::new(plan, EngineSettings::default());

    c.bench_function("region_run_1500_features", |b| {
        b.iter(|| {
            let result = engine.run(rows.clone()).expect("run");
            black_box(result.labels.len());
        });
    });
}

criterion_group!(
    benches,
    bench_route_run,
    bench_distance_matrix,
    bench_validation,
    bench_region_run
);
criterion_main!(benches);
