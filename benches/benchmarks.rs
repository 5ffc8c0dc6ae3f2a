use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use factor_pipeline::prelude::*;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::sync::Arc;

fn benchmark_plan_compilation(c: &mut Criterion) {
    c.bench_function("compile_plan_64_terms", |b| {
        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        b.iter(|| {
            let mut pipeline = Pipeline::with_domain(Domain::us_equities());
            let leaf = pipeline.column(&close);
            for window in 2..66 {
                let mean = pipeline
                    .computed(Computation::WindowMean, &[leaf], window)
                    .unwrap();
                pipeline.add_output(format!("mean_{}", window), mean).unwrap();
            }
            black_box(ExecutionPlan::compile(&pipeline).unwrap())
        });
    });
}

fn benchmark_window_traversal(c: &mut Criterion) {
    c.bench_function("traverse_252x500_window_20", |b| {
        let base = Array2::from_shape_fn((252, 500), |(r, col)| (r * col) as f64);
        let mut adjustments = BTreeMap::new();
        for col in (0..500).step_by(25) {
            adjustments.insert(
                col,
                vec![Adjustment {
                    first_row: 0,
                    last_row: 100,
                    first_col: col,
                    last_col: col,
                    value: 0.5,
                    kind: AdjustmentKind::Multiply,
                }],
            );
        }
        let adjusted = AdjustedArray::new(base, adjustments, f64::NAN).unwrap();
        b.iter(|| {
            let mut iter = adjusted.traverse(20).unwrap();
            let mut checksum = 0.0;
            while let Some(window) = iter.next_window() {
                checksum += window[[0, 0]];
            }
            black_box(checksum)
        });
    });
}

fn benchmark_pipeline_run(c: &mut Criterion) {
    c.bench_function("run_pipeline_60_sessions_100_assets", |b| {
        let first = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let last = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let calendars = StaticCalendarProvider::with_default_calendars(first, last);
        let sessions = calendars
            .get_calendar("NYSE")
            .unwrap()
            .sessions()
            .to_vec();
        let assets: Vec<AssetId> = (1..=100).collect();

        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        let mut loader = InMemoryLoader::new(sessions.clone(), assets.clone());
        loader
            .set_column(
                &close,
                Array2::from_shape_fn((sessions.len(), assets.len()), |(r, col)| {
                    ((r * 3 + col) % 97) as f64 + 1.0
                }),
            )
            .unwrap();
        let engine = PipelineEngine::new(Arc::new(loader), Arc::new(calendars), assets);

        let mut pipeline = Pipeline::with_domain(Domain::us_equities());
        let leaf = pipeline.column(&close);
        let mean = pipeline
            .computed(Computation::WindowMean, &[leaf], 20)
            .unwrap();
        let momentum = pipeline
            .computed(Computation::PercentChange, &[leaf], 10)
            .unwrap();
        pipeline.add_output("mean20", mean).unwrap();
        pipeline.add_output("momentum10", momentum).unwrap();

        let start = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 24).unwrap();
        b.iter(|| black_box(engine.run_pipeline(&pipeline, start, end).unwrap()));
    });
}

criterion_group!(
    benches,
    benchmark_plan_compilation,
    benchmark_window_traversal,
    benchmark_pipeline_run
);
criterion_main!(benches);
