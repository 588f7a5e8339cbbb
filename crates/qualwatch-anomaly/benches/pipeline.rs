//! Benchmark for dedup -> windowing -> detection
//! Run: cargo bench -p qualwatch-anomaly --bench pipeline

use chrono::{Duration, TimeZone, Utc};
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use qualwatch_anomaly::config::DetectionConfig;
use qualwatch_anomaly::detection::AnomalyDetector;
use qualwatch_anomaly::pipeline::Pipeline;
use qualwatch_anomaly::stats;
use qualwatch_anomaly::QualwatchConfig;
use qualwatch_core::QualityEvent;
use std::hint::black_box;

const TEAMS: usize = 20;
const EVENTS: usize = 10_000;

fn events() -> Vec<QualityEvent> {
    let base = Utc.with_ymd_and_hms(2026, 2, 10, 14, 0, 0).unwrap();
    (0..EVENTS)
        .map(|i| {
            let at = base + Duration::milliseconds(i as i64 * 250);
            QualityEvent {
                insert_id: format!("ev-{}", i),
                team_id: format!("team-{}", i % TEAMS),
                report_id: format!("r-{}", i % 97),
                event_time: at,
                overall_score: if i % 500 == 499 { 0.2 } else { 0.9 + (i % 7) as f64 * 0.01 },
                coverage: 0.95,
                gaps: (i % 4) as u32,
                overlaps: 0,
                avg_duration: 2.0,
                source: "stream".to_string(),
                load_time: at,
            }
        })
        .collect()
}

fn bench_pipeline(c: &mut Criterion) {
    let config = QualwatchConfig::default();
    let input = events();
    let end = input[EVENTS - 1].event_time + Duration::hours(1);

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(EVENTS as u64));

    group.bench_function("admit_and_close", |b| {
        b.iter_batched(
            || input.clone(),
            |events| {
                let mut pipeline = Pipeline::new(&config).unwrap();
                for event in events {
                    let now = event.event_time;
                    pipeline.admit(event, now);
                }
                black_box(pipeline.close_due(end))
            },
            BatchSize::LargeInput,
        )
    });

    // half of the input replayed
    group.bench_function("admit_with_duplicates", |b| {
        b.iter_batched(
            || input.iter().chain(input.iter().take(EVENTS / 2)).cloned().collect::<Vec<_>>(),
            |events| {
                let mut pipeline = Pipeline::new(&config).unwrap();
                for event in events {
                    let now = event.event_time;
                    pipeline.admit(event, now);
                }
                black_box(pipeline.drain())
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

fn bench_detection(c: &mut Criterion) {
    let detector = AnomalyDetector::new(DetectionConfig::default());
    let latest = events().pop().map(|e| QualityEvent { overall_score: 0.2, ..e });
    let scores: Vec<f64> = (0..1000).map(|i| 0.9 + (i % 7) as f64 * 0.01).collect();

    let mut group = c.benchmark_group("detection");
    if let Some(latest) = latest {
        group.bench_function("evaluate_1000", |b| {
            b.iter(|| detector.evaluate(black_box(&scores), &latest))
        });
    }
    group.bench_function("mad_1000", |b| {
        b.iter(|| stats::median_absolute_deviation(black_box(&scores)))
    });
    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_detection);
criterion_main!(benches);
