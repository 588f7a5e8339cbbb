//! Benchmark for message normalization
//! Run: cargo bench -p qualwatch-core --bench normalize

use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use qualwatch_core::backfill::convert_export;
use qualwatch_core::Normalizer;
use std::collections::HashMap;
use std::hint::black_box;

const STREAM_MESSAGE: &str = r#"{"insert_id":"7f1c2a","team_id":"team-a","report_id":"r-1","event_ts":"2026-02-10T14:30:45.123Z","overallScore":0.91,"coverage":0.97,"gaps":2,"overlaps":1,"avgDur":2.5,"source":"stream"}"#;
const COERCED_MESSAGE: &str = r#"{"insert_id":42,"team_id":"team-a","report_id":"r-1","event_ts":"2026-02-10 14:30:45","overallScore":"0.91","coverage":"0.97","gaps":"2"}"#;
const BAD_MESSAGE: &str = r#"{"insert_id":"7f1c2a","team_id":"team-a","report_id":"r-1","event_ts":"2026-02-10T14:30:45Z","coverage":1.7}"#;

const EXPORT_DOC: &str = r#"{
    "name": "projects/p/databases/(default)/documents/teams/team-7/reports/rep-42/qualityReports/1735689600000",
    "fields": {
        "metrics": {"mapValue": {"fields": {
            "overallScore": {"doubleValue": 0.87},
            "coverage": {"doubleValue": 0.93},
            "gaps": {"integerValue": "4"}
        }}},
        "createdAt": {"timestampValue": "2025-01-01T00:00:00.000000Z"}
    }
}"#;

fn bench_normalize(c: &mut Criterion) {
    let normalizer = Normalizer::default();
    let attrs = HashMap::new();

    let mut group = c.benchmark_group("normalize");
    group.throughput(Throughput::Elements(1));

    group.bench_function("valid", |b| {
        b.iter(|| normalizer.normalize(black_box(STREAM_MESSAGE.as_bytes()), &attrs))
    });

    group.bench_function("coerced", |b| {
        b.iter(|| normalizer.normalize(black_box(COERCED_MESSAGE.as_bytes()), &attrs))
    });

    group.bench_function("out_of_range", |b| {
        b.iter(|| normalizer.normalize(black_box(BAD_MESSAGE.as_bytes()), &attrs))
    });

    group.finish();
}

fn bench_export(c: &mut Criterion) {
    let normalizer = Normalizer::default();
    let docs: Vec<&str> = std::iter::repeat(EXPORT_DOC).take(1000).collect();
    let export = format!(r#"{{"documents": [{}]}}"#, docs.join(","));
    let now = Utc::now();

    let mut group = c.benchmark_group("backfill");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("convert_1000_docs", |b| {
        b.iter(|| convert_export(black_box(&export), &normalizer, now))
    });
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_export);
criterion_main!(benches);
