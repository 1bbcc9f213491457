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

//! Columnar field storage over flat byte buffers.
//!
//! One column per schema field, one fixed-size slot per entity id at
//! `offset = eid * slot_size`. Slots are never relocated. All multi-byte
//! encodings are little-endian; string/binary/array slots start with a
//! 4-byte unsigned length prefix.

use std::cell::UnsafeCell;

use crate::entity::Eid;
use crate::field::{FieldKind, NumWidth, Value, NULL_REF, REF_EID_MASK};

/// A single field's column: `slots` contiguous fixed-size byte slots.
///
/// The buffer is shared across worker threads. Soundness rests on the
/// partition discipline: within a tick, at most one thread writes a given
/// entity's slot (systems only mutate entities their query yielded, and
/// query outputs are disjoint across `eid % thread_count`). Reads copy out;
/// no references into the buffer escape.
pub struct Column {
    slot_size: usize,
    slots: u32,
    data: UnsafeCell<Box<[u8]>>,
}

// SAFETY: concurrent access is entity-local by the partition discipline
// documented above; distinct slots never overlap.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    pub fn new(kind: &FieldKind, slots: u32) -> Self {
        let slot_size = kind.slot_size();
        Self {
            slot_size,
            slots,
            data: UnsafeCell::new(vec![0u8; slot_size * slots as usize].into_boxed_slice()),
        }
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn slots(&self) -> u32 {
        self.slots
    }

    /// # Safety
    /// Caller must ensure no thread is concurrently writing this slot.
    unsafe fn slot(&self, index: u32) -> &[u8] {
        debug_assert!(index < self.slots);
        let base = index as usize * self.slot_size;
        &(&*self.data.get())[base..base + self.slot_size]
    }

    /// # Safety
    /// Caller must ensure this thread is the slot's only writer and no
    /// reader holds a borrow (reads copy out immediately, so none do).
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot_mut(&self, index: u32) -> &mut [u8] {
        debug_assert!(index < self.slots);
        let base = index as usize * self.slot_size;
        &mut (&mut *self.data.get())[base..base + self.slot_size]
    }

    /// Decode the slot into a fresh owned value. Ref slots decode to the
    /// raw stored id; aliveness validation happens at the component layer.
    pub fn read_value(&self, index: u32, kind: &FieldKind) -> Value {
        // SAFETY: entity-local write discipline; see type docs.
        let slot = unsafe { self.slot(index) };
        decode(kind, slot)
    }

    /// Encode a pre-validated value into the slot, truncating
    /// variable-width payloads to their declared max.
    pub fn write_value(&self, index: u32, kind: &FieldKind, value: &Value) {
        // SAFETY: entity-local write discipline; see type docs.
        let slot = unsafe { self.slot_mut(index) };
        encode(kind, value, slot);
    }

    /// Verbatim copy of the whole column buffer. External collaborators can
    /// capture world state this way; replaying the bytes restores exactly
    /// the field values (membership bits live in the entity buffer).
    pub fn to_bytes(&self) -> Vec<u8> {
        // SAFETY: entity-local write discipline; see type docs.
        unsafe { (*self.data.get()).to_vec() }
    }

    /// Raw packed bits of a ref slot.
    pub fn read_ref_raw(&self, index: u32) -> u32 {
        // SAFETY: entity-local write discipline; see type docs.
        let slot = unsafe { self.slot(index) };
        u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]])
    }

    /// Overwrite a ref slot with its packed bits (read-repair writes
    /// `NULL_REF` here).
    pub fn write_ref_raw(&self, index: u32, raw: u32) {
        // SAFETY: entity-local write discipline; see type docs.
        let slot = unsafe { self.slot_mut(index) };
        slot[..4].copy_from_slice(&raw.to_le_bytes());
    }
}

/// Largest prefix of `max` bytes that ends on a char boundary, so stored
/// strings stay valid UTF-8 after truncation.
fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn encode_num(width: NumWidth, value: &Value, out: &mut [u8]) {
    match (width, value) {
        (NumWidth::I8, Value::I8(v)) => out[..1].copy_from_slice(&v.to_le_bytes()),
        (NumWidth::I16, Value::I16(v)) => out[..2].copy_from_slice(&v.to_le_bytes()),
        (NumWidth::I32, Value::I32(v)) => out[..4].copy_from_slice(&v.to_le_bytes()),
        (NumWidth::U8, Value::U8(v)) => out[..1].copy_from_slice(&v.to_le_bytes()),
        (NumWidth::U16, Value::U16(v)) => out[..2].copy_from_slice(&v.to_le_bytes()),
        (NumWidth::U32, Value::U32(v)) => out[..4].copy_from_slice(&v.to_le_bytes()),
        (NumWidth::F32, Value::F32(v)) => out[..4].copy_from_slice(&v.to_le_bytes()),
        (NumWidth::F64, Value::F64(v)) => out[..8].copy_from_slice(&v.to_le_bytes()),
        _ => debug_assert!(false, "value kind validated before encode"),
    }
}

fn decode_num(width: NumWidth, buf: &[u8]) -> Value {
    match width {
        NumWidth::I8 => Value::I8(i8::from_le_bytes([buf[0]])),
        NumWidth::I16 => Value::I16(i16::from_le_bytes([buf[0], buf[1]])),
        NumWidth::I32 => Value::I32(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
        NumWidth::U8 => Value::U8(buf[0]),
        NumWidth::U16 => Value::U16(u16::from_le_bytes([buf[0], buf[1]])),
        NumWidth::U32 => Value::U32(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
        NumWidth::F32 => Value::F32(f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
        NumWidth::F64 => Value::F64(f64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ])),
    }
}

/// Encode a validated value into a slot-sized byte region.
pub(crate) fn encode(kind: &FieldKind, value: &Value, out: &mut [u8]) {
    match (kind, value) {
        (FieldKind::Num(w), v) => encode_num(*w, v, out),
        (FieldKind::Bool, Value::Bool(v)) => out[0] = *v as u8,
        (FieldKind::Str { max }, Value::Str(s)) => {
            let payload = truncate_str(s, *max as usize).as_bytes();
            out[..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
            out[4..4 + payload.len()].copy_from_slice(payload);
        }
        (FieldKind::Bytes { max }, Value::Bytes(b)) => {
            let len = b.len().min(*max as usize);
            out[..4].copy_from_slice(&(len as u32).to_le_bytes());
            out[4..4 + len].copy_from_slice(&b[..len]);
        }
        (FieldKind::Enum { tags }, Value::Enum(tag)) => {
            // Tag membership was validated; a miss would store index 0.
            let index = tags.iter().position(|t| t == tag).unwrap_or(0);
            if tags.len() <= 256 {
                out[0] = index as u8;
            } else {
                out[..2].copy_from_slice(&(index as u16).to_le_bytes());
            }
        }
        (FieldKind::Array { elem, max }, Value::Array(items)) => {
            let count = items.len().min(*max as usize);
            out[..4].copy_from_slice(&(count as u32).to_le_bytes());
            let elem_size = elem.slot_size();
            for (i, item) in items.iter().take(count).enumerate() {
                let start = 4 + i * elem_size;
                encode(elem, item, &mut out[start..start + elem_size]);
            }
        }
        (FieldKind::Tuple { elem, count }, Value::Tuple(items)) => {
            let elem_size = elem.slot_size();
            for (i, item) in items.iter().take(*count as usize).enumerate() {
                let start = i * elem_size;
                encode(elem, item, &mut out[start..start + elem_size]);
            }
        }
        (FieldKind::Ref, Value::Ref(target)) => {
            let raw = match target {
                Some(eid) => *eid & REF_EID_MASK,
                None => NULL_REF,
            };
            out[..4].copy_from_slice(&raw.to_le_bytes());
        }
        _ => debug_assert!(false, "value kind validated before encode"),
    }
}

/// Decode a slot-sized byte region into a fresh owned value.
pub(crate) fn decode(kind: &FieldKind, buf: &[u8]) -> Value {
    match kind {
        FieldKind::Num(w) => decode_num(*w, buf),
        FieldKind::Bool => Value::Bool(buf[0] != 0),
        FieldKind::Str { max } => {
            let len = (u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize)
                .min(*max as usize);
            Value::Str(String::from_utf8_lossy(&buf[4..4 + len]).into_owned())
        }
        FieldKind::Bytes { max } => {
            let len = (u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize)
                .min(*max as usize);
            Value::Bytes(buf[4..4 + len].to_vec())
        }
        FieldKind::Enum { tags } => {
            let index = if tags.len() <= 256 {
                buf[0] as usize
            } else {
                u16::from_le_bytes([buf[0], buf[1]]) as usize
            };
            Value::Enum(tags.get(index).unwrap_or(&tags[0]).clone())
        }
        FieldKind::Array { elem, max } => {
            let count = (u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize)
                .min(*max as usize);
            let elem_size = elem.slot_size();
            Value::Array(
                (0..count)
                    .map(|i| {
                        let start = 4 + i * elem_size;
                        decode(elem, &buf[start..start + elem_size])
                    })
                    .collect(),
            )
        }
        FieldKind::Tuple { elem, count } => {
            let elem_size = elem.slot_size();
            Value::Tuple(
                (0..*count as usize)
                    .map(|i| {
                        let start = i * elem_size;
                        decode(elem, &buf[start..start + elem_size])
                    })
                    .collect(),
            )
        }
        FieldKind::Ref => {
            let raw = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
            Value::Ref(if raw == NULL_REF {
                None
            } else {
                Some((raw & REF_EID_MASK) as Eid)
            })
        }
    }
}
