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

//! Component definitions, bound column storage, and field views.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use ahash::AHashMap;

use crate::column::Column;
use crate::entity::Eid;
use crate::error::{EcsError, Result};
use crate::event::EventKind;
use crate::field::{FieldKind, Value, NULL_REF, REF_EID_MASK};
use crate::schema::Schema;
use crate::world::{Context, Shared};

static NEXT_DEF_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique component definition tag. The per-world component id is
/// assigned at registration and carried by the world, never by the def.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefId(u64);

impl DefId {
    fn next() -> Self {
        DefId(NEXT_DEF_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Immutable component descriptor: a name plus an ordered field schema.
///
/// A def may be registered with any number of worlds; each registration
/// binds it to an independent component id and column set.
#[derive(Debug, Clone)]
pub struct ComponentDef {
    def_id: DefId,
    name: String,
    schema: Schema,
}

impl ComponentDef {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            def_id: DefId::next(),
            name: name.into(),
            schema,
        }
    }

    pub fn def_id(&self) -> DefId {
        self.def_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Component id assigned by this world at registration.
    pub fn component_id(&self, ctx: &Context) -> Result<u32> {
        ctx.shared().cid_of(self.def_id, &self.name)
    }

    /// Field view reading from the entity's column slots. Every access
    /// decodes a fresh owned value; nothing aliases the backing buffer.
    pub fn read<'a>(&self, ctx: &'a Context, eid: Eid) -> Result<Reader<'a>> {
        let shared = ctx.shared();
        let instance = shared.instance_of(self.def_id, &self.name)?;
        shared.check_eid(eid)?;
        Ok(Reader {
            shared,
            instance,
            slot: eid,
        })
    }

    /// Field view writing into the entity's column slots. The writer is
    /// rebindable and must not be retained across entities; writes coalesce
    /// to at most one change event per tick.
    pub fn write<'a>(&self, ctx: &'a Context, eid: Eid) -> Result<Writer<'a>> {
        let shared = ctx.shared();
        let instance = shared.instance_of(self.def_id, &self.name)?;
        shared.check_eid(eid)?;
        Ok(Writer {
            shared,
            instance,
            slot: eid,
        })
    }

    /// Owned plain-data copy of the entity's fields, in schema order.
    pub fn snapshot(&self, ctx: &Context, eid: Eid) -> Result<Snapshot> {
        let reader = self.read(ctx, eid)?;
        reader.snapshot()
    }

    /// Verbatim bytes of one field's column across all entity slots.
    pub fn export_column(&self, ctx: &Context, field: &str) -> Result<Vec<u8>> {
        let instance = ctx.shared().instance_of(self.def_id, &self.name)?;
        let (index, _) = instance
            .schema()
            .get(field)
            .ok_or_else(|| EcsError::UnknownField(field.to_string()))?;
        Ok(instance.column(index).to_bytes())
    }
}

/// A def bound to one world: its component id plus one column per field.
pub struct ComponentInstance {
    cid: u32,
    def_id: DefId,
    name: String,
    schema: Schema,
    columns: Vec<Column>,
    field_index: AHashMap<String, usize>,
    is_singleton: bool,
    /// Tick of the most recent singleton write; unused for regular
    /// components (their change tracking runs through the event ring).
    last_written: AtomicU32,
}

impl ComponentInstance {
    pub(crate) fn new(def: &ComponentDef, cid: u32, slots: u32, is_singleton: bool) -> Self {
        let columns: Vec<Column> = def
            .schema()
            .fields()
            .iter()
            .map(|(_, spec)| Column::new(spec.kind(), slots))
            .collect();
        let field_index = def
            .schema()
            .fields()
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        // A singleton's one instance exists from birth, so its slot starts
        // from the declared defaults rather than don't-care bytes.
        if is_singleton {
            for (index, (_, spec)) in def.schema().fields().iter().enumerate() {
                columns[index].write_value(0, spec.kind(), &spec.fill_value());
            }
        }
        Self {
            cid,
            def_id: def.def_id(),
            name: def.name().to_string(),
            schema: def.schema().clone(),
            columns,
            field_index,
            is_singleton,
            last_written: AtomicU32::new(0),
        }
    }

    pub fn cid(&self) -> u32 {
        self.cid
    }

    pub fn def_id(&self) -> DefId {
        self.def_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn is_singleton(&self) -> bool {
        self.is_singleton
    }

    pub(crate) fn last_written(&self) -> u32 {
        self.last_written.load(Ordering::Relaxed)
    }

    pub(crate) fn stamp_written(&self, tick: u32) {
        self.last_written.store(tick, Ordering::Relaxed);
    }

    fn field(&self, name: &str) -> Result<(usize, &FieldKind)> {
        let index = *self
            .field_index
            .get(name)
            .ok_or_else(|| EcsError::UnknownField(name.to_string()))?;
        Ok((index, self.schema.fields()[index].1.kind()))
    }

    pub(crate) fn column(&self, field_index: usize) -> &Column {
        &self.columns[field_index]
    }

    /// Fill every slot field: supplied value first, declared default next,
    /// type zero last. Supplied names and kinds are validated up front so a
    /// bad partial leaves the slot untouched.
    pub(crate) fn fill_slot(&self, slot: u32, partial: &[(&str, Value)]) -> Result<()> {
        for (name, value) in partial {
            let (_, kind) = self.field(name)?;
            if !kind.accepts(value) {
                return Err(EcsError::ValueTypeMismatch {
                    field: name.to_string(),
                    expected: kind.name(),
                });
            }
        }
        for (index, (name, spec)) in self.schema.fields().iter().enumerate() {
            match partial.iter().find(|(n, _)| *n == name.as_str()) {
                Some((_, value)) => self.columns[index].write_value(slot, spec.kind(), value),
                None => self.columns[index].write_value(slot, spec.kind(), &spec.fill_value()),
            }
        }
        Ok(())
    }

    /// Decode one field, lazily repairing dangling refs against the alive
    /// bits: a ref to a dead entity reads as null and the slot is rewritten
    /// to `NULL_REF`.
    fn read_field(&self, shared: &Shared, slot: u32, name: &str) -> Result<Value> {
        let (index, kind) = self.field(name)?;
        let column = &self.columns[index];
        if matches!(kind, FieldKind::Ref) {
            let raw = column.read_ref_raw(slot);
            if raw == NULL_REF {
                return Ok(Value::Ref(None));
            }
            let target = raw & REF_EID_MASK;
            if !shared.entities.alive(target) {
                column.write_ref_raw(slot, NULL_REF);
                return Ok(Value::Ref(None));
            }
            return Ok(Value::Ref(Some(target)));
        }
        Ok(column.read_value(slot, kind))
    }

    fn write_field(&self, slot: u32, name: &str, value: &Value) -> Result<()> {
        let (index, kind) = self.field(name)?;
        if !kind.accepts(value) {
            return Err(EcsError::ValueTypeMismatch {
                field: name.to_string(),
                expected: kind.name(),
            });
        }
        self.columns[index].write_value(slot, kind, value);
        Ok(())
    }
}

/// Read view over one entity's fields. Values are decoded fresh on every
/// access; the view holds no mutable state and may be dropped freely.
pub struct Reader<'a> {
    shared: &'a Shared,
    instance: &'a ComponentInstance,
    slot: u32,
}

impl<'a> Reader<'a> {
    pub fn get(&self, field: &str) -> Result<Value> {
        self.instance.read_field(self.shared, self.slot, field)
    }

    /// Owned copy of all fields in schema order.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let mut fields = Vec::with_capacity(self.instance.schema.len());
        for (name, _) in self.instance.schema.fields() {
            fields.push((name.clone(), self.get(name)?));
        }
        Ok(Snapshot { fields })
    }
}

/// Write view over one entity's fields.
///
/// The first successful `set` in a tick emits the component's single
/// `ComponentChanged` event; further writes to any field of the same
/// `(entity, component)` pair coalesce. Do not retain a writer across
/// entities.
pub struct Writer<'a> {
    shared: &'a Shared,
    instance: &'a ComponentInstance,
    slot: u32,
}

impl<'a> Writer<'a> {
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        self.instance.write_field(self.slot, field, &value)?;
        if self.instance.is_singleton {
            self.instance.stamp_written(self.shared.tick());
        } else if self.shared.dirty.mark(self.slot, self.instance.cid) {
            self.shared
                .events
                .push(EventKind::ComponentChanged, self.slot, self.instance.cid);
        }
        Ok(())
    }

    /// Read back through the same view (fresh value, same slot).
    pub fn get(&self, field: &str) -> Result<Value> {
        self.instance.read_field(self.shared, self.slot, field)
    }
}

/// Owned plain-data record with no backing references.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    fields: Vec<(String, Value)>,
}

impl Snapshot {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Fields in schema order.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }
}
