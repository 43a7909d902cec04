use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use tasker_batch::{partition, partition_records, BackoffPolicy, PressureMonitor};

fn benchmark_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    for total in [10_000u64, 1_000_000] {
        group.bench_with_input(BenchmarkId::from_parameter(total), &total, |b, &total| {
            b.iter(|| partition(black_box(total), black_box(500)))
        });
    }
    group.finish();
}

fn benchmark_partition_records(c: &mut Criterion) {
    let ids: Vec<String> = (0..50_000).map(|n| format!("record-{n}")).collect();
    c.bench_function("partition_records_50k", |b| {
        b.iter(|| partition_records(black_box(ids.clone()), 500))
    });
}

fn benchmark_backoff_schedule(c: &mut Criterion) {
    let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(60), 2.0);
    c.bench_function("backoff_schedule_25", |b| {
        b.iter(|| policy.schedule(black_box(25)))
    });
}

fn benchmark_pressure_advice(c: &mut Criterion) {
    let monitor = PressureMonitor::default();
    c.bench_function("pressure_record_and_advise", |b| {
        b.iter(|| {
            monitor.record_latency("ack", Duration::from_millis(3));
            monitor.advice(black_box(500))
        })
    });
}

criterion_group!(
    benches,
    benchmark_partition,
    benchmark_partition_records,
    benchmark_backoff_schedule,
    benchmark_pressure_advice
);
criterion_main!(benches);
