// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! World: shared columnar buffers plus per-thread contexts.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::component::{ComponentDef, ComponentInstance, DefId};
use crate::entity::{Eid, EntityBuffer};
use crate::error::{EcsError, Result};
use crate::event::{DirtyMap, EventBuffer, EventKind};
use crate::field::{FieldKind, Value, NULL_REF};
use crate::pool::Pool;
use crate::query::QueryState;
use crate::singleton::SingletonDef;

const DEFAULT_MAX_ENTITIES: u32 = 16_384;
const DEFAULT_MAX_EVENTS: u32 = 8_192;

/// Component ids are packed into 24 bits on the event ring.
const MAX_COMPONENTS: usize = 1 << 24;

/// World-scoped shared state: every buffer lives here, allocated once by
/// the builder on the main thread and referenced by all contexts.
pub(crate) struct Shared {
    pub(crate) entities: EntityBuffer,
    pub(crate) events: EventBuffer,
    pub(crate) pool: Pool,
    pub(crate) dirty: DirtyMap,
    instances: Vec<ComponentInstance>,
    by_def: AHashMap<DefId, u32>,
    tick: AtomicU32,
    alive_count: AtomicU32,
    max_entities: u32,
    max_events: u32,
}

impl Shared {
    pub(crate) fn tick(&self) -> u32 {
        self.tick.load(Ordering::Acquire)
    }

    pub(crate) fn cid_of(&self, def_id: DefId, name: &str) -> Result<u32> {
        self.by_def
            .get(&def_id)
            .copied()
            .ok_or_else(|| EcsError::UnregisteredComponent(name.to_string()))
    }

    pub(crate) fn instance_of(&self, def_id: DefId, name: &str) -> Result<&ComponentInstance> {
        let cid = self.cid_of(def_id, name)?;
        Ok(&self.instances[cid as usize])
    }

    pub(crate) fn instances(&self) -> &[ComponentInstance] {
        &self.instances
    }

    pub(crate) fn max_entities(&self) -> u32 {
        self.max_entities
    }

    pub(crate) fn check_eid(&self, eid: Eid) -> Result<()> {
        // Bounds only: dead ids stay readable so removed() consumers can
        // still see outgoing component values.
        if eid >= self.max_entities {
            return Err(EcsError::UnknownEntity(eid));
        }
        Ok(())
    }
}

/// Builder collecting world geometry and component registrations.
///
/// Component ids are assigned in registration order; all buffers are sized
/// from `max_entities`/`max_events` and never relocated afterwards.
pub struct WorldBuilder {
    max_entities: u32,
    max_events: u32,
    defs: Vec<(ComponentDef, bool)>,
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self {
            max_entities: DEFAULT_MAX_ENTITIES,
            max_events: DEFAULT_MAX_EVENTS,
            defs: Vec::new(),
        }
    }
}

impl WorldBuilder {
    pub fn max_entities(mut self, max_entities: u32) -> Self {
        self.max_entities = max_entities;
        self
    }

    pub fn max_events(mut self, max_events: u32) -> Self {
        self.max_events = max_events;
        self
    }

    /// Register a component; its id is the registration index.
    pub fn register(mut self, def: &ComponentDef) -> Self {
        self.defs.push((def.clone(), false));
        self
    }

    /// Register a singleton; it occupies a component id like any other
    /// registration but stores exactly one slot.
    pub fn register_singleton(mut self, def: &SingletonDef) -> Self {
        self.defs.push((def.def().clone(), true));
        self
    }

    /// Allocate every shared buffer and bind registered defs to columns.
    ///
    /// # Panics
    /// Panics on nonsensical geometry (zero entities, id range beyond the
    /// 25-bit ref packing) or a def registered twice.
    pub fn build(self) -> World {
        assert!(self.max_entities > 0, "world needs at least one entity id");
        assert!(
            self.max_entities < NULL_REF,
            "max_entities must fit the 25-bit ref id range"
        );
        assert!(self.defs.len() < MAX_COMPONENTS, "component id overflow");

        let mut by_def = AHashMap::with_capacity(self.defs.len());
        let mut instances = Vec::with_capacity(self.defs.len());
        for (cid, (def, is_singleton)) in self.defs.iter().enumerate() {
            let previous = by_def.insert(def.def_id(), cid as u32);
            assert!(
                previous.is_none(),
                "component {} registered twice",
                def.name()
            );
            let slots = if *is_singleton { 1 } else { self.max_entities };
            instances.push(ComponentInstance::new(def, cid as u32, slots, *is_singleton));
        }

        debug!(
            max_entities = self.max_entities,
            max_events = self.max_events,
            components = instances.len(),
            "world built"
        );

        World {
            shared: Arc::new(Shared {
                entities: EntityBuffer::new(self.max_entities, instances.len()),
                events: EventBuffer::new(self.max_events),
                pool: Pool::new(self.max_entities),
                dirty: DirtyMap::new(self.max_entities, instances.len()),
                instances,
                by_def,
                // Tick 0 is reserved so "never written" singleton stamps
                // and never-snapshotted queries are distinguishable.
                tick: AtomicU32::new(1),
                alive_count: AtomicU32::new(0),
                max_entities: self.max_entities,
                max_events: self.max_events,
            }),
        }
    }
}

/// Owner of the shared world state. The driver holds the world, advances
/// its tick once per frame, and hands out contexts.
pub struct World {
    shared: Arc<Shared>,
}

impl World {
    pub fn builder() -> WorldBuilder {
        WorldBuilder::default()
    }

    /// Main-thread context (single-threaded shape: partition 0 of 1).
    pub fn context(&self) -> Context {
        Context::new(Arc::clone(&self.shared), 0, 1)
    }

    /// Cloneable handle for booting workers; each worker derives its own
    /// partitioned context from it.
    pub fn handle(&self) -> WorldHandle {
        WorldHandle(Arc::clone(&self.shared))
    }

    pub fn tick(&self) -> u32 {
        self.shared.tick()
    }

    /// Frame boundary: bump the tick, reset per-tick change coalescing,
    /// and recycle ids of entities removed before this boundary.
    ///
    /// # Panics
    /// Panics on tick overflow - wraparound would break change detection.
    pub fn advance_tick(&self) {
        let tick = self.shared.tick.load(Ordering::Acquire);
        if tick == u32::MAX {
            panic!("World tick overflow at {tick}");
        }
        self.shared.tick.store(tick + 1, Ordering::Release);
        self.shared.dirty.clear();
        self.shared.pool.drain_graveyard(&self.shared.entities);
    }
}

/// Shareable reference to a built world's buffers; the worker init message
/// carries one. Its component table is the transfer map: for every cid, the
/// bound columns, schema, and singleton flag.
#[derive(Clone)]
pub struct WorldHandle(Arc<Shared>);

impl WorldHandle {
    /// Build the context for one worker partition.
    ///
    /// # Panics
    /// Panics if `thread_index` is out of range or `thread_count` is zero.
    pub fn context(&self, thread_index: u32, thread_count: u32) -> Context {
        assert!(thread_count > 0, "thread_count must be nonzero");
        assert!(thread_index < thread_count, "thread_index out of range");
        Context::new(Arc::clone(&self.0), thread_index, thread_count)
    }

    pub fn component_count(&self) -> usize {
        self.0.instances.len()
    }
}

/// Per-thread view of the world: the shared buffers plus this thread's
/// partition coordinates and its private query states.
///
/// Contexts are `Send` (each worker owns one) but deliberately not `Sync`;
/// query caches and event cursors are thread-local.
pub struct Context {
    shared: Arc<Shared>,
    thread_index: u32,
    thread_count: u32,
    pub(crate) queries: RefCell<FxHashMap<u64, QueryState>>,
}

impl Context {
    fn new(shared: Arc<Shared>, thread_index: u32, thread_count: u32) -> Self {
        Self {
            shared,
            thread_index,
            thread_count,
            queries: RefCell::new(FxHashMap::default()),
        }
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    pub fn tick(&self) -> u32 {
        self.shared.tick()
    }

    pub fn thread_index(&self) -> u32 {
        self.thread_index
    }

    pub fn thread_count(&self) -> u32 {
        self.thread_count
    }

    pub fn max_entities(&self) -> u32 {
        self.shared.max_entities
    }

    pub fn max_events(&self) -> u32 {
        self.shared.max_events
    }

    pub fn component_count(&self) -> usize {
        self.shared.instances.len()
    }

    pub fn alive(&self, eid: Eid) -> bool {
        eid < self.shared.max_entities && self.shared.entities.alive(eid)
    }

    pub fn alive_count(&self) -> u32 {
        self.shared.alive_count.load(Ordering::Relaxed)
    }

    /// Highest id ever allocated; scans cover `0..high_water`.
    pub fn high_water(&self) -> u32 {
        self.shared.pool.high_water()
    }

    /// Allocate an id, mark it alive with an empty membership mask, and
    /// record `EntityAdded`.
    pub fn create_entity(&self) -> Result<Eid> {
        let eid = self.shared.pool.allocate(&self.shared.entities)?;
        self.shared.entities.set_alive(eid);
        self.shared.alive_count.fetch_add(1, Ordering::Relaxed);
        self.shared.events.push(EventKind::EntityAdded, eid, 0);
        trace!(eid, "entity created");
        Ok(eid)
    }

    /// Clear the alive bit and record `EntityRemoved`. Membership bits and
    /// column data survive until the id is recycled at a tick boundary, so
    /// `removed()` consumers can still read the outgoing values.
    pub fn remove_entity(&self, eid: Eid) -> Result<()> {
        self.shared.check_eid(eid)?;
        if !self.shared.entities.alive(eid) {
            return Err(EcsError::UnknownEntity(eid));
        }
        self.shared.entities.clear_alive(eid);
        self.shared.alive_count.fetch_sub(1, Ordering::Relaxed);
        self.shared.events.push(EventKind::EntityRemoved, eid, 0);
        self.shared.pool.release(eid);
        trace!(eid, "entity removed");
        Ok(())
    }

    /// Write every schema field (caller data, declared default, or type
    /// zero), set the membership bit, and record `ComponentAdded`.
    ///
    /// Adding a component the entity already carries is a full overwrite:
    /// all fields are rewritten and `ComponentAdded` is recorded again.
    pub fn add_component(
        &self,
        eid: Eid,
        def: &ComponentDef,
        partial: &[(&str, Value)],
    ) -> Result<()> {
        self.shared.check_eid(eid)?;
        if !self.shared.entities.alive(eid) {
            return Err(EcsError::UnknownEntity(eid));
        }
        let instance = self.shared.instance_of(def.def_id(), def.name())?;
        instance.fill_slot(eid, partial)?;
        self.shared.entities.set_membership_bit(eid, instance.cid());
        self.shared
            .events
            .push(EventKind::ComponentAdded, eid, instance.cid());
        trace!(eid, component = def.name(), "component added");
        Ok(())
    }

    /// Clear the membership bit and record `ComponentRemoved`. Removing a
    /// component the entity does not carry is a no-op.
    pub fn remove_component(&self, eid: Eid, def: &ComponentDef) -> Result<()> {
        self.shared.check_eid(eid)?;
        if !self.shared.entities.alive(eid) {
            return Err(EcsError::UnknownEntity(eid));
        }
        let instance = self.shared.instance_of(def.def_id(), def.name())?;
        if !self.shared.entities.has_membership_bit(eid, instance.cid()) {
            return Ok(());
        }
        self.shared
            .entities
            .clear_membership_bit(eid, instance.cid());
        self.shared
            .events
            .push(EventKind::ComponentRemoved, eid, instance.cid());
        trace!(eid, component = def.name(), "component removed");
        Ok(())
    }

    pub fn has_component(&self, eid: Eid, def: &ComponentDef) -> Result<bool> {
        self.shared.check_eid(eid)?;
        if !self.shared.entities.alive(eid) {
            return Err(EcsError::UnknownEntity(eid));
        }
        let instance = self.shared.instance_of(def.def_id(), def.name())?;
        Ok(self.shared.entities.has_membership_bit(eid, instance.cid()))
    }

    /// Every alive entity carrying `def` whose ref field stores `target`.
    /// There is no back-reference index; this is a linear scan over the
    /// column masked by the component's membership bits.
    pub fn backrefs(&self, target: Eid, def: &ComponentDef, field: &str) -> Result<Vec<Eid>> {
        let instance = self.shared.instance_of(def.def_id(), def.name())?;
        let (index, spec) = instance
            .schema()
            .get(field)
            .ok_or_else(|| EcsError::UnknownField(field.to_string()))?;
        if !matches!(spec.kind(), FieldKind::Ref) {
            return Err(EcsError::ValueTypeMismatch {
                field: field.to_string(),
                expected: "ref",
            });
        }
        let column = instance.column(index);
        let mut out = Vec::new();
        for eid in 0..self.shared.pool.high_water() {
            if self.shared.entities.alive(eid)
                && self.shared.entities.has_membership_bit(eid, instance.cid())
                && column.read_ref_raw(eid) == target
            {
                out.push(eid);
            }
        }
        Ok(out)
    }
}
