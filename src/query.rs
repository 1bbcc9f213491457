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

//! Queries over component membership with reactive per-tick deltas.
//!
//! A query compiles its clauses into membership-mask tests per world, keeps
//! a sparse-set cache of matching entities per context, and derives
//! `added`/`removed`/`changed` views by replaying the structural event ring
//! from its own cursor.

use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::warn;

use crate::component::{ComponentDef, DefId};
use crate::entity::{Eid, Mask};
use crate::error::{EcsError, Result};
use crate::event::{Event, EventKind};
use crate::sparse::SparseSet;
use crate::world::{Context, Shared};

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
struct ClauseRef {
    def_id: DefId,
    name: String,
}

fn clause_refs(defs: &[&ComponentDef]) -> SmallVec<[ClauseRef; 4]> {
    defs.iter()
        .map(|def| ClauseRef {
            def_id: def.def_id(),
            name: def.name().to_string(),
        })
        .collect()
}

/// Compositional predicate over component presence.
///
/// At most one clause of each kind; empty clauses are identities (an empty
/// `with` matches every alive entity, an empty `any` is satisfied). The
/// query object is immutable and may be shared across contexts; each
/// context keeps its own cache and event cursor for it.
pub struct Query {
    qid: u64,
    with: SmallVec<[ClauseRef; 4]>,
    without: SmallVec<[ClauseRef; 4]>,
    any: SmallVec<[ClauseRef; 4]>,
    tracking: SmallVec<[ClauseRef; 4]>,
    with_set: bool,
    without_set: bool,
    any_set: bool,
    tracking_set: bool,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    pub fn new() -> Self {
        Self {
            qid: NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed),
            with: SmallVec::new(),
            without: SmallVec::new(),
            any: SmallVec::new(),
            tracking: SmallVec::new(),
            with_set: false,
            without_set: false,
            any_set: false,
            tracking_set: false,
        }
    }

    /// Entities must carry all listed components.
    ///
    /// # Panics
    /// Panics if the clause is provided twice.
    pub fn with(mut self, defs: &[&ComponentDef]) -> Self {
        assert!(!self.with_set, "with clause provided twice");
        self.with = clause_refs(defs);
        self.with_set = true;
        self
    }

    /// Entities must carry none of the listed components.
    ///
    /// # Panics
    /// Panics if the clause is provided twice.
    pub fn without(mut self, defs: &[&ComponentDef]) -> Self {
        assert!(!self.without_set, "without clause provided twice");
        self.without = clause_refs(defs);
        self.without_set = true;
        self
    }

    /// Entities must carry at least one of the listed components.
    ///
    /// # Panics
    /// Panics if the clause is provided twice.
    pub fn any(mut self, defs: &[&ComponentDef]) -> Self {
        assert!(!self.any_set, "any clause provided twice");
        self.any = clause_refs(defs);
        self.any_set = true;
        self
    }

    /// Subscribe `changed()` to these components' change events.
    ///
    /// # Panics
    /// Panics if the clause is provided twice.
    pub fn tracking(mut self, defs: &[&ComponentDef]) -> Self {
        assert!(!self.tracking_set, "tracking clause provided twice");
        self.tracking = clause_refs(defs);
        self.tracking_set = true;
        self
    }

    /// All currently matching entities in this context's partition.
    ///
    /// The result is snapshotted at the first call of each tick; repeated
    /// calls within one tick replay the identical set even if mutations
    /// happen in between.
    pub fn current(&self, ctx: &Context) -> Result<Vec<Eid>> {
        self.with_state(ctx, |state, shared| {
            state.ensure_snapshot(shared, ctx.thread_index(), ctx.thread_count());
            Ok(state.snapshot.clone())
        })
    }

    /// Matching entities in this partition, without materializing the list.
    pub fn count(&self, ctx: &Context) -> Result<usize> {
        self.with_state(ctx, |state, shared| {
            state.ensure_snapshot(shared, ctx.thread_index(), ctx.thread_count());
            Ok(state.snapshot.len())
        })
    }

    /// Entities that transitioned into the query this tick.
    pub fn added(&self, ctx: &Context) -> Result<Vec<Eid>> {
        self.with_state(ctx, |state, _| {
            Ok(partition_filter(
                &state.added,
                ctx.thread_index(),
                ctx.thread_count(),
            ))
        })
    }

    /// Entities that transitioned out of the query this tick. Their column
    /// data is still readable until the next tick boundary.
    pub fn removed(&self, ctx: &Context) -> Result<Vec<Eid>> {
        self.with_state(ctx, |state, _| {
            Ok(partition_filter(
                &state.removed,
                ctx.thread_index(),
                ctx.thread_count(),
            ))
        })
    }

    /// Currently matching entities whose tracked components changed this
    /// tick, coalesced per entity. Always empty without a tracking clause.
    pub fn changed(&self, ctx: &Context) -> Result<Vec<Eid>> {
        self.with_state(ctx, |state, _| {
            Ok(partition_filter(
                &state.changed,
                ctx.thread_index(),
                ctx.thread_count(),
            ))
        })
    }

    fn with_state<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&mut QueryState, &Shared) -> Result<R>,
    ) -> Result<R> {
        let shared = ctx.shared();
        let mut queries = ctx.queries.borrow_mut();
        let state = match queries.entry(self.qid) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(QueryState::compile(self, shared)?)
            }
        };
        state.sync(shared)?;
        f(state, shared)
    }
}

fn partition_filter(eids: &[Eid], thread_index: u32, thread_count: u32) -> Vec<Eid> {
    if thread_count <= 1 {
        return eids.to_vec();
    }
    eids.iter()
        .copied()
        .filter(|eid| eid % thread_count == thread_index)
        .collect()
}

/// Per-context state of one query: compiled masks, the sparse-set cache,
/// this query's event cursor, and the per-tick delta buffers.
pub(crate) struct QueryState {
    with: Mask,
    without: Mask,
    any: Mask,
    tracking: Mask,
    /// Union of with/without/any: component events outside it cannot change
    /// the match result.
    relevant: Mask,
    cache: SparseSet,
    cursor: u64,
    primed: bool,
    delta_tick: u32,
    added: Vec<Eid>,
    removed: Vec<Eid>,
    changed: Vec<Eid>,
    added_seen: FxHashSet<Eid>,
    removed_seen: FxHashSet<Eid>,
    changed_seen: FxHashSet<Eid>,
    snapshot: Vec<Eid>,
    snapshot_tick: u32,
}

impl QueryState {
    fn compile(query: &Query, shared: &Shared) -> Result<QueryState> {
        let bits = shared.instances().len();
        let build = |clauses: &[ClauseRef]| -> Result<Mask> {
            let mut mask = Mask::with_bits(bits);
            for clause in clauses {
                let cid = shared.cid_of(clause.def_id, &clause.name).map_err(|_| {
                    EcsError::InvalidQuery(format!(
                        "component {} not registered with this world",
                        clause.name
                    ))
                })?;
                mask.set(cid as usize);
            }
            Ok(mask)
        };

        let with = build(&query.with)?;
        let without = build(&query.without)?;
        let any = build(&query.any)?;
        let tracking = build(&query.tracking)?;
        let mut relevant = with.clone();
        relevant.or_assign(&without);
        relevant.or_assign(&any);

        Ok(QueryState {
            with,
            without,
            any,
            tracking,
            relevant,
            cache: SparseSet::with_capacity(shared.max_entities()),
            cursor: 0,
            primed: false,
            delta_tick: 0,
            added: Vec::new(),
            removed: Vec::new(),
            changed: Vec::new(),
            added_seen: FxHashSet::default(),
            removed_seen: FxHashSet::default(),
            changed_seen: FxHashSet::default(),
            snapshot: Vec::new(),
            snapshot_tick: 0,
        })
    }

    /// Roll per-tick buffers, then prime or catch up the cache from the
    /// event ring.
    fn sync(&mut self, shared: &Shared) -> Result<()> {
        let tick = shared.tick();
        if self.delta_tick != tick {
            self.added.clear();
            self.removed.clear();
            self.changed.clear();
            self.added_seen.clear();
            self.removed_seen.clear();
            self.changed_seen.clear();
            self.delta_tick = tick;
        }

        if !self.primed {
            // First use: full scan baseline. Pre-baseline events are
            // deliberately skipped - no "everything added" on first call.
            self.cursor = shared.events.write_index();
            for eid in 0..shared.pool.high_water() {
                if shared.entities.matches(eid, &self.with, &self.without, &self.any)
                    && !self.cache.add(eid)
                {
                    return Err(EcsError::QueryCacheFull);
                }
            }
            self.primed = true;
            return Ok(());
        }

        let head = shared.events.write_index();
        if shared.events.overflowed(self.cursor) {
            warn!(
                lag = head - self.cursor,
                capacity = shared.events.capacity(),
                "query cursor lapped, resynchronizing by full rescan"
            );
            self.rescan(shared, head);
            return Ok(());
        }

        while self.cursor < head {
            match shared.events.read(self.cursor) {
                // Unpublished slot: a writer is mid-append. Stop here and
                // pick the event up on the next sync.
                None => break,
                Some(event) => {
                    self.cursor += 1;
                    self.apply(shared, event)?;
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, shared: &Shared, event: Event) -> Result<()> {
        match event.kind {
            EventKind::EntityRemoved => {
                if self.cache.remove(event.eid) && self.removed_seen.insert(event.eid) {
                    self.removed.push(event.eid);
                }
            }
            EventKind::ComponentChanged => {
                if self.tracking.contains(event.cid as usize)
                    && self.cache.contains(event.eid)
                    && self.changed_seen.insert(event.eid)
                {
                    self.changed.push(event.eid);
                }
            }
            EventKind::EntityAdded => self.retest(shared, event.eid)?,
            EventKind::ComponentAdded | EventKind::ComponentRemoved => {
                if self.relevant.contains(event.cid as usize) {
                    self.retest(shared, event.eid)?;
                }
            }
        }
        Ok(())
    }

    fn retest(&mut self, shared: &Shared, eid: Eid) -> Result<()> {
        let was = self.cache.contains(eid);
        let now = shared.entities.matches(eid, &self.with, &self.without, &self.any);
        if !was && now {
            if !self.cache.add(eid) {
                return Err(EcsError::QueryCacheFull);
            }
            if self.added_seen.insert(eid) {
                self.added.push(eid);
            }
        } else if was && !now {
            self.cache.remove(eid);
            if self.removed_seen.insert(eid) {
                self.removed.push(eid);
            }
        }
        Ok(())
    }

    /// Overflow recovery: rebuild the cache from a full scan and emit the
    /// net transitions as deltas. Change deltas for the lapped span are
    /// unrecoverable and dropped.
    fn rescan(&mut self, shared: &Shared, head: u64) {
        let mut fresh = SparseSet::with_capacity(shared.max_entities());
        for eid in 0..shared.pool.high_water() {
            if shared.entities.matches(eid, &self.with, &self.without, &self.any) {
                fresh.add(eid);
            }
        }
        for &eid in fresh.dense() {
            if !self.cache.contains(eid) && self.added_seen.insert(eid) {
                self.added.push(eid);
            }
        }
        for &eid in self.cache.dense() {
            if !fresh.contains(eid) && self.removed_seen.insert(eid) {
                self.removed.push(eid);
            }
        }
        self.cache = fresh;
        self.cursor = head;
    }

    /// Freeze the tick's output: the partition-filtered dense view at the
    /// first accessor call of this tick.
    fn ensure_snapshot(&mut self, shared: &Shared, thread_index: u32, thread_count: u32) {
        let tick = shared.tick();
        if self.snapshot_tick == tick {
            return;
        }
        self.snapshot = partition_filter(self.cache.dense(), thread_index, thread_count);
        self.snapshot_tick = tick;
    }
}
