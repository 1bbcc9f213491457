//! Reactive query cache behavior across ticks: added/removed deltas,
//! deduplication, snapshot isolation, and overflow recovery.

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

#[test]
fn added_and_removed_follow_membership_transitions() {
    let position = position();
    let velocity = velocity();
    let world = World::builder()
        .max_entities(128)
        .register(&position)
        .register(&velocity)
        .build();
    let ctx = world.context();
    let q = Query::new().with(&[&position, &velocity]);
    // Baseline without freezing this tick's current snapshot.
    assert!(q.added(&ctx).unwrap().is_empty());

    let e1 = ctx.create_entity().unwrap();
    ctx.add_component(e1, &position, &[]).unwrap();
    ctx.add_component(e1, &velocity, &[]).unwrap();
    assert_eq!(q.added(&ctx).unwrap(), vec![e1]);
    assert_eq!(q.current(&ctx).unwrap(), vec![e1]);

    world.advance_tick();
    assert!(q.added(&ctx).unwrap().is_empty());
    assert_eq!(q.current(&ctx).unwrap(), vec![e1]);

    world.advance_tick();
    ctx.remove_component(e1, &velocity).unwrap();
    assert_eq!(q.removed(&ctx).unwrap(), vec![e1]);
    assert!(q.current(&ctx).unwrap().is_empty());

    world.advance_tick();
    assert!(q.added(&ctx).unwrap().is_empty());
    assert!(q.removed(&ctx).unwrap().is_empty());
}

#[test]
fn flapping_membership_dedupes_within_a_tick() {
    let position = position();
    let world = World::builder().max_entities(32).register(&position).build();
    let ctx = world.context();
    let q = Query::new().with(&[&position]);
    assert!(q.current(&ctx).unwrap().is_empty());

    // Interleave observations so each membership flip is seen as its own
    // transition; the delta buffers still report the entity once apiece.
    let e = ctx.create_entity().unwrap();
    ctx.add_component(e, &position, &[]).unwrap();
    assert_eq!(q.added(&ctx).unwrap(), vec![e]);

    ctx.remove_component(e, &position).unwrap();
    assert_eq!(q.removed(&ctx).unwrap(), vec![e]);

    ctx.add_component(e, &position, &[]).unwrap();
    assert_eq!(q.added(&ctx).unwrap(), vec![e]);

    ctx.remove_component(e, &position).unwrap();
    assert_eq!(q.removed(&ctx).unwrap(), vec![e]);

    ctx.add_component(e, &position, &[]).unwrap();
    assert_eq!(q.added(&ctx).unwrap(), vec![e]);
}

#[test]
fn snapshot_is_stable_within_a_tick() {
    let position = position();
    let world = World::builder().max_entities(32).register(&position).build();
    let ctx = world.context();
    let q = Query::new().with(&[&position]);

    let e1 = ctx.create_entity().unwrap();
    ctx.add_component(e1, &position, &[]).unwrap();
    let first = q.current(&ctx).unwrap();
    assert_eq!(first, vec![e1]);

    let e2 = ctx.create_entity().unwrap();
    ctx.add_component(e2, &position, &[]).unwrap();
    ctx.remove_entity(e1).unwrap();

    // Same tick: identical result regardless of interleaved mutations.
    assert_eq!(q.current(&ctx).unwrap(), first);

    world.advance_tick();
    assert_eq!(q.current(&ctx).unwrap(), vec![e2]);
}

#[test]
fn entity_removal_lands_in_removed() {
    let position = position();
    let world = World::builder().max_entities(32).register(&position).build();
    let ctx = world.context();
    let q = Query::new().with(&[&position]);

    let e = ctx.create_entity().unwrap();
    ctx.add_component(e, &position, &[]).unwrap();
    assert_eq!(q.current(&ctx).unwrap(), vec![e]);

    world.advance_tick();
    ctx.remove_entity(e).unwrap();
    assert_eq!(q.removed(&ctx).unwrap(), vec![e]);
    // The outgoing value is still readable this tick.
    assert_eq!(
        position.read(&ctx, e).unwrap().get("x").unwrap(),
        Value::F32(0.0)
    );

    world.advance_tick();
    assert!(q.removed(&ctx).unwrap().is_empty());
}

#[test]
fn lagging_cursor_recovers_by_rescan() {
    let position = position();
    let world = World::builder()
        .max_entities(256)
        .max_events(8)
        .register(&position)
        .build();
    let ctx = world.context();
    let q = Query::new().with(&[&position]);
    assert!(q.current(&ctx).unwrap().is_empty());

    // Far more events than the ring holds before the query looks again.
    let mut expected = Vec::new();
    for _ in 0..50 {
        let e = ctx.create_entity().unwrap();
        ctx.add_component(e, &position, &[]).unwrap();
        expected.push(e);
    }
    world.advance_tick();

    let mut current = q.current(&ctx).unwrap();
    current.sort_unstable();
    assert_eq!(current, expected);

    // Steady state afterwards: incremental updates work again.
    world.advance_tick();
    let e = ctx.create_entity().unwrap();
    ctx.add_component(e, &position, &[]).unwrap();
    assert_eq!(q.added(&ctx).unwrap(), vec![e]);
}

#[test]
fn two_queries_keep_independent_cursors() {
    let position = position();
    let velocity = velocity();
    let world = World::builder()
        .max_entities(64)
        .register(&position)
        .register(&velocity)
        .build();
    let ctx = world.context();

    let q_pos = Query::new().with(&[&position]);
    let q_both = Query::new().with(&[&position, &velocity]);
    assert!(q_pos.current(&ctx).unwrap().is_empty());

    let e = ctx.create_entity().unwrap();
    ctx.add_component(e, &position, &[]).unwrap();
    assert_eq!(q_pos.added(&ctx).unwrap(), vec![e]);

    // The second query primes later and sees the entity as baseline, not
    // as a delta.
    assert!(q_both.added(&ctx).unwrap().is_empty());
    ctx.add_component(e, &velocity, &[]).unwrap();
    assert_eq!(q_both.added(&ctx).unwrap(), vec![e]);
    assert_eq!(q_pos.added(&ctx).unwrap(), vec![e]);
}
