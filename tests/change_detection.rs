//! Change-detection behavior through the public API: write coalescing,
//! tracking clauses, and singleton watches.

use weft_ecs::{ComponentDef, FieldSpec, Query, Schema, SingletonDef, Value, World};

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

#[test]
fn many_writes_one_change_record() {
    let position = position();
    let world = World::builder().max_entities(64).register(&position).build();
    let ctx = world.context();
    let q = Query::new().with(&[&position]).tracking(&[&position]);

    let e = ctx.create_entity().unwrap();
    ctx.add_component(e, &position, &[]).unwrap();
    assert_eq!(q.current(&ctx).unwrap(), vec![e]);

    world.advance_tick();
    for i in 0..10 {
        position
            .write(&ctx, e)
            .unwrap()
            .set("x", Value::F32(i as f32))
            .unwrap();
    }

    world.advance_tick();
    assert_eq!(q.changed(&ctx).unwrap(), vec![e]);
    world.advance_tick();
    assert_eq!(q.changed(&ctx).unwrap(), Vec::<u32>::new());
}

#[test]
fn writes_in_consecutive_ticks_each_surface() {
    let position = position();
    let world = World::builder().max_entities(64).register(&position).build();
    let ctx = world.context();
    let q = Query::new().with(&[&position]).tracking(&[&position]);

    let e = ctx.create_entity().unwrap();
    ctx.add_component(e, &position, &[]).unwrap();
    assert_eq!(q.current(&ctx).unwrap(), vec![e]);

    for round in 0..3 {
        world.advance_tick();
        position
            .write(&ctx, e)
            .unwrap()
            .set("y", Value::F32(round as f32))
            .unwrap();
        world.advance_tick();
        assert_eq!(q.changed(&ctx).unwrap(), vec![e], "round {round}");
    }
}

#[test]
fn changes_only_surface_for_current_matches() {
    let position = position();
    let marker = ComponentDef::new("Marker", Schema::empty());
    let world = World::builder()
        .max_entities(64)
        .register(&position)
        .register(&marker)
        .build();
    let ctx = world.context();

    // Tracks position changes but only for marked entities.
    let q = Query::new().with(&[&marker]).tracking(&[&position]);

    let unmarked = ctx.create_entity().unwrap();
    ctx.add_component(unmarked, &position, &[]).unwrap();
    assert_eq!(q.current(&ctx).unwrap(), Vec::<u32>::new());

    world.advance_tick();
    position
        .write(&ctx, unmarked)
        .unwrap()
        .set("x", Value::F32(1.0))
        .unwrap();
    world.advance_tick();
    assert_eq!(q.changed(&ctx).unwrap(), Vec::<u32>::new());
}

#[test]
fn singleton_watch_tracks_writes() {
    let input = SingletonDef::new(
        "PointerState",
        Schema::builder()
            .field("x", FieldSpec::f64())
            .field("y", FieldSpec::f64())
            .field("down", FieldSpec::boolean())
            .build()
            .unwrap(),
    );
    let world = World::builder().register_singleton(&input).build();
    let ctx = world.context();

    let mut watch = input.watch(&ctx).unwrap();
    assert!(!watch.changed(&ctx).unwrap());

    world.advance_tick();
    let mut writer = input.write(&ctx).unwrap();
    writer.set("x", Value::F64(120.0)).unwrap();
    writer.set("down", Value::Bool(true)).unwrap();
    drop(writer);

    assert!(watch.changed(&ctx).unwrap());
    assert_eq!(
        input.read(&ctx).unwrap().get("down").unwrap(),
        Value::Bool(true)
    );

    watch.mark_seen(&ctx);
    assert!(!watch.changed(&ctx).unwrap());
}
