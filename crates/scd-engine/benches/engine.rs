use std::hint::black_box;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use scd_engine::Engine;
use scd_models::{tables, Job};
use scd_store::InMemoryStore;
use scd_types::{BusinessKey, ManualClock};

fn engine() -> Engine<InMemoryStore, Arc<ManualClock>> {
    let store = Arc::new(InMemoryStore::with_schema(&tables()));
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Engine::with_clock(store, Arc::new(ManualClock::starting_at(start)))
}

fn key(i: usize) -> BusinessKey {
    BusinessKey::new(format!("job-{i}")).unwrap()
}

fn job(i: usize) -> Job {
    Job::new(key(i), "Bench job", "company-1", "contractor-1", 50.0)
}

/// An engine holding `keys` jobs with `versions` versions each.
fn seeded(keys: usize, versions: usize) -> Engine<InMemoryStore, Arc<ManualClock>> {
    let engine = engine();
    for i in 0..keys {
        engine.create(job(i)).unwrap();
        for v in 1..versions {
            engine
                .update(&key(i), |j: &mut Job| j.update_rate(50.0 + v as f64))
                .unwrap();
        }
    }
    engine
}

fn bench_create(c: &mut Criterion) {
    c.bench_function("create", |b| {
        b.iter_batched(
            engine,
            |engine| {
                for i in 0..100 {
                    black_box(engine.create(job(i)).unwrap());
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_update(c: &mut Criterion) {
    c.bench_function("update", |b| {
        b.iter_batched(
            || seeded(1, 1),
            |engine| {
                for v in 0..50 {
                    black_box(
                        engine
                            .update(&key(0), |j: &mut Job| j.update_rate(v as f64))
                            .unwrap(),
                    );
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_reads(c: &mut Criterion) {
    let engine = seeded(100, 10);
    let mid = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();

    c.bench_function("get_latest", |b| {
        b.iter(|| black_box(engine.get_latest::<Job>(&key(42)).unwrap()))
    });
    c.bench_function("get_as_of", |b| {
        b.iter(|| black_box(engine.get_as_of::<Job>(&key(42), mid).ok()))
    });
    c.bench_function("get_all_versions", |b| {
        b.iter(|| black_box(engine.get_all_versions::<Job>(&key(42)).unwrap()))
    });
}

criterion_group!(benches, bench_create, bench_update, bench_reads);
criterion_main!(benches);
