//! Entity store benchmarks using criterion for historical comparison.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use strata_ecs::{Entity, EntityStore, ParallelJobRunner};

#[derive(Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

fn spawn_positions(store: &mut EntityStore, count: u64) -> Vec<Entity> {
    (0..count)
        .map(|i| {
            let e = store.create_entity();
            store
                .add_component(e, Position {
                    x: i as f32,
                    y: 0.0,
                    z: 0.0,
                })
                .unwrap();
            e
        })
        .collect()
}

fn spawn_moving(store: &mut EntityStore, count: u64) -> Vec<Entity> {
    let entities = spawn_positions(store, count);
    for &e in &entities {
        store
            .add_component(e, Velocity {
                x: 1.0,
                y: 0.5,
                z: 0.0,
            })
            .unwrap();
    }
    entities
}

fn create_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");

    for count in [1, 100, 1000, 10000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("empty", count), &count, |b, &count| {
            b.iter(|| {
                let mut store = EntityStore::new();
                for _ in 0..count {
                    black_box(store.create_entity());
                }
            });
        });

        group.bench_with_input(
            BenchmarkId::new("with_position", count),
            &count,
            |b, &count| {
                b.iter(|| {
                    let mut store = EntityStore::new();
                    black_box(spawn_positions(&mut store, count));
                });
            },
        );
    }

    group.finish();
}

fn component_access_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("component_access");

    for count in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("get", count), &count, |b, &count| {
            let mut store = EntityStore::new();
            let entities = spawn_positions(&mut store, count);

            b.iter(|| {
                for &entity in &entities {
                    let _ = black_box(store.get::<Position>(entity));
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("get_mut", count), &count, |b, &count| {
            let mut store = EntityStore::new();
            let entities = spawn_positions(&mut store, count);

            b.iter(|| {
                for &entity in &entities {
                    if let Ok(pos) = store.get_mut::<Position>(entity) {
                        pos.x += 1.0;
                    }
                }
            });
        });
    }

    group.finish();
}

fn archetype_change_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("archetype_change");

    for count in [100, 1000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(
            BenchmarkId::new("add_component", count),
            &count,
            |b, &count| {
                b.iter(|| {
                    let mut store = EntityStore::new();
                    black_box(spawn_moving(&mut store, count));
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("remove_component", count),
            &count,
            |b, &count| {
                b.iter_batched(
                    || {
                        let mut store = EntityStore::new();
                        let entities = spawn_moving(&mut store, count);
                        (store, entities)
                    },
                    |(mut store, entities)| {
                        for entity in entities {
                            let _ = store.remove_component::<Velocity>(entity);
                        }
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

fn query_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let runner = ParallelJobRunner::new(4).unwrap();

    for count in [1000, 100_000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(
            BenchmarkId::new("chunk2_integrate", count),
            &count,
            |b, &count| {
                let mut store = EntityStore::new();
                spawn_moving(&mut store, count);
                let mut query = store.query::<(Position, Velocity)>().unwrap();

                b.iter(|| {
                    query.for_each_chunk2_mut::<Position, Velocity, _>(
                        &mut store,
                        |_, mut pos, vel| {
                            for (p, v) in pos.iter_mut().zip(vel.as_slice()) {
                                p.x += v.x;
                                p.y += v.y;
                                p.z += v.z;
                            }
                        },
                    );
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("par_chunk", count),
            &count,
            |b, &count| {
                let mut store = EntityStore::new();
                spawn_moving(&mut store, count);
                let mut query = store.query::<(Position,)>().unwrap();

                b.iter(|| {
                    query
                        .par_for_each_chunk_mut::<Position, _>(&mut store, &runner, |_, mut pos| {
                            for p in pos.iter_mut() {
                                p.x = black_box(p.x * 0.5);
                            }
                        })
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    create_benchmarks,
    component_access_benchmarks,
    archetype_change_benchmarks,
    query_benchmarks,
);

criterion_main!(benches);
