//! Reconcile and frame benchmarks for the aquarium sync client
//!
//! Run with: cargo bench --bench reconcile

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use aquarium_sync::net::session::SessionIdentity;
use aquarium_sync::world::cursor::CursorRegistry;
use aquarium_sync::world::entity::{EntityKind, ServerRecord};
use aquarium_sync::world::registry::EntityRegistry;
use aquarium_sync::world::scheduler::{Frame, RenderSink, UpdateScheduler};
use rand::Rng;
use serde_json::json;

const KINDS: [&str; 4] = ["Fish", "Food", "Coin", "Bubble"];

/// Snapshot of `count` randomly placed, moving entities
fn random_snapshot(count: usize) -> Vec<ServerRecord> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let value = json!({
                "id": format!("thing-{}", i),
                "kind": KINDS[rng.gen_range(0..KINDS.len())],
                "x": rng.gen_range(0.0..960.0),
                "y": rng.gen_range(0.0..540.0),
                "destination_x": rng.gen_range(0.0..960.0),
                "destination_y": rng.gen_range(0.0..540.0),
                "speed": rng.gen_range(0.0..120.0),
                "hunger": rng.gen_range(0.0..100.0),
                "width": 40,
                "height": 30,
            });
            ServerRecord::from_value(value).unwrap()
        })
        .collect()
}

struct NullSink;

impl RenderSink for NullSink {
    fn paint(&mut self, frame: &Frame) {
        black_box(frame.entities.len());
    }
}

/// Full sync into an empty registry, and into one that already holds half
fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    group.sample_size(50);

    for count in [100, 500, 1000, 5000] {
        let snapshot = random_snapshot(count);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("cold", count), &snapshot, |b, snapshot| {
            b.iter(|| {
                let mut registry = EntityRegistry::new();
                black_box(registry.reconcile(snapshot.clone(), 0))
            });
        });

        group.bench_with_input(BenchmarkId::new("churn", count), &snapshot, |b, snapshot| {
            b.iter(|| {
                let mut registry = EntityRegistry::new();
                registry.reconcile(snapshot[count / 2..].to_vec(), 0);
                black_box(registry.reconcile(snapshot.clone(), 1))
            });
        });
    }

    group.finish();
}

/// One frame over a populated registry
fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");

    for count in [100, 1000, 5000] {
        let mut registry = EntityRegistry::new();
        registry.reconcile(random_snapshot(count), 0);
        let mut cursors = CursorRegistry::new(SessionIdentity::new("bench"), 400);
        let mut scheduler = UpdateScheduler::new(60);
        let mut now = 0u64;

        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(BenchmarkId::new("tick", count), |b| {
            b.iter(|| {
                now += 16;
                black_box(scheduler.tick(&registry, &mut cursors, now, &mut NullSink))
            });
        });
    }

    group.finish();
}

/// Hit testing against the topmost collectible
fn bench_hit_test(c: &mut Criterion) {
    let mut registry = EntityRegistry::new();
    registry.reconcile(random_snapshot(1000), 0);
    let mut rng = rand::thread_rng();
    let points: Vec<_> = (0..64)
        .map(|_| aquarium_sync::util::vec2::Vec2::new(rng.gen_range(0.0..960.0), rng.gen_range(0.0..540.0)))
        .collect();

    c.bench_function("hit_test_1000", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % points.len();
            black_box(registry.hit_test(points[i], 500).map(|e| e.kind == EntityKind::Coin))
        });
    });
}

criterion_group!(benches, bench_reconcile, bench_frame, bench_hit_test);
criterion_main!(benches);
