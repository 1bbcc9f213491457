//! Benchmarks for core runtime operations
//!
//! Run with: cargo bench
//!
//! Measures entity creation, component writes, and query iteration over
//! the columnar storage.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use weft_ecs::{ComponentDef, FieldSpec, Query, Schema, Value, World};

fn position() -> ComponentDef {
    ComponentDef::new(
        "Position",
        Schema::builder()
            .field("x", FieldSpec::f32())
            .field("y", FieldSpec::f32())
            .build()
            .unwrap(),
    )
}

fn velocity() -> ComponentDef {
    ComponentDef::new(
        "Velocity",
        Schema::builder()
            .field("dx", FieldSpec::f32())
            .field("dy", FieldSpec::f32())
            .build()
            .unwrap(),
    )
}

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");

    group.bench_function("create_1k_with_component", |b| {
        let position = position();
        b.iter(|| {
            let world = World::builder()
                .max_entities(2_048)
                .register(&position)
                .build();
            let ctx = world.context();
            for i in 0..1_000 {
                let e = ctx.create_entity().unwrap();
                ctx.add_component(e, &position, &[("x", Value::F32(i as f32))])
                    .unwrap();
            }
            black_box(ctx.alive_count())
        });
    });

    group.finish();
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    let position = position();
    let world = World::builder()
        .max_entities(2_048)
        .register(&position)
        .build();
    let ctx = world.context();
    let eids: Vec<_> = (0..1_000)
        .map(|_| {
            let e = ctx.create_entity().unwrap();
            ctx.add_component(e, &position, &[]).unwrap();
            e
        })
        .collect();

    group.bench_function("write_1k_field_values", |b| {
        b.iter(|| {
            for &e in &eids {
                position
                    .write(&ctx, e)
                    .unwrap()
                    .set("x", Value::F32(e as f32))
                    .unwrap();
            }
        });
    });

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    let position = position();
    let velocity = velocity();
    let world = World::builder()
        .max_entities(16_384)
        .register(&position)
        .register(&velocity)
        .build();
    let ctx = world.context();
    for i in 0..10_000u32 {
        let e = ctx.create_entity().unwrap();
        ctx.add_component(e, &position, &[]).unwrap();
        if i % 2 == 0 {
            ctx.add_component(e, &velocity, &[]).unwrap();
        }
    }

    let q = Query::new().with(&[&position, &velocity]);

    group.bench_function("iterate_10k_half_matching", |b| {
        b.iter(|| {
            world.advance_tick();
            let mut sum = 0u64;
            for e in q.current(&ctx).unwrap() {
                sum += e as u64;
            }
            black_box(sum)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_create, bench_write, bench_query);
criterion_main!(benches);
