//! Single-instance components with built-in change tracking.

use crate::component::{ComponentDef, DefId, Reader, Snapshot, Writer};
use crate::error::Result;
use crate::schema::Schema;
use crate::world::Context;

/// A component restricted to exactly one logical instance, stored in a
/// single fixed slot. Schemas work exactly as for regular components;
/// instead of per-entity membership, a singleton carries a monotonic
/// last-written tick for change detection.
#[derive(Debug, Clone)]
pub struct SingletonDef {
    def: ComponentDef,
}

impl SingletonDef {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            def: ComponentDef::new(name, schema),
        }
    }

    pub(crate) fn def(&self) -> &ComponentDef {
        &self.def
    }

    pub fn def_id(&self) -> DefId {
        self.def.def_id()
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn schema(&self) -> &Schema {
        self.def.schema()
    }

    /// Read view over the singleton's fields.
    pub fn read<'a>(&self, ctx: &'a Context) -> Result<Reader<'a>> {
        self.def.read(ctx, 0)
    }

    /// Write view; every write stamps the last-written tick.
    pub fn write<'a>(&self, ctx: &'a Context) -> Result<Writer<'a>> {
        self.def.write(ctx, 0)
    }

    pub fn snapshot(&self, ctx: &Context) -> Result<Snapshot> {
        self.def.snapshot(ctx, 0)
    }

    /// Change-tracking handle baselined at the current tick.
    pub fn watch(&self, ctx: &Context) -> Result<SingletonWatch> {
        // Resolving the instance up front surfaces unregistered defs here
        // rather than on every changed() call.
        let _ = ctx.shared().instance_of(self.def.def_id(), self.def.name())?;
        Ok(SingletonWatch {
            def_id: self.def.def_id(),
            name: self.def.name().to_string(),
            since: ctx.tick(),
        })
    }
}

/// Tracks whether a singleton has been written after the tick recorded at
/// this handle's creation (or its last `mark_seen`).
pub struct SingletonWatch {
    def_id: DefId,
    name: String,
    since: u32,
}

impl SingletonWatch {
    pub fn changed(&self, ctx: &Context) -> Result<bool> {
        let instance = ctx.shared().instance_of(self.def_id, &self.name)?;
        Ok(instance.last_written() > self.since)
    }

    /// Re-baseline at the current tick.
    pub fn mark_seen(&mut self, ctx: &Context) {
        self.since = ctx.tick();
    }
}
