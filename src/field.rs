//! Field descriptors and field values.
//!
//! Schemas are data: a component field is described by a closed sum of
//! descriptor kinds, and every stored value round-trips through the closed
//! [`Value`] sum. No runtime reflection is involved.

use serde::{Deserialize, Serialize};

use crate::entity::Eid;
use crate::error::{EcsError, Result};

/// Stored bits of an absent ref: all ones in the 25 entity-id bits.
pub const NULL_REF: u32 = (1 << 25) - 1;

/// Mask extracting the entity-id bits of a packed ref slot.
pub const REF_EID_MASK: u32 = (1 << 25) - 1;

/// Fixed numeric widths supported by column storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumWidth {
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
    F32,
    F64,
}

impl NumWidth {
    /// Slot size of this width in bytes.
    pub fn size(self) -> usize {
        match self {
            NumWidth::I8 | NumWidth::U8 => 1,
            NumWidth::I16 | NumWidth::U16 => 2,
            NumWidth::I32 | NumWidth::U32 | NumWidth::F32 => 4,
            NumWidth::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NumWidth::I8 => "i8",
            NumWidth::I16 => "i16",
            NumWidth::I32 => "i32",
            NumWidth::U8 => "u8",
            NumWidth::U16 => "u16",
            NumWidth::U32 => "u32",
            NumWidth::F32 => "f32",
            NumWidth::F64 => "f64",
        }
    }
}

/// Field descriptor: the closed sum of storable kinds.
///
/// Variable-width kinds carry a byte budget `max`; payloads beyond it are
/// truncated on write, never rejected. Array and tuple elements must be
/// numeric, bool, string, or binary; nesting fails with
/// [`EcsError::InvalidElementType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    Num(NumWidth),
    Bool,
    Str { max: u32 },
    Bytes { max: u32 },
    Enum { tags: Vec<String> },
    Array { elem: Box<FieldKind>, max: u32 },
    Tuple { elem: Box<FieldKind>, count: u32 },
    Ref,
}

impl FieldKind {
    /// Per-entity slot size in bytes.
    ///
    /// String/binary slots are a 4-byte length prefix plus `max` payload
    /// bytes. Array slots are a 4-byte element count plus `max` element
    /// slots. Tuple slots are `count` contiguous element slots with no
    /// prefix. Refs pack into a single u32.
    pub fn slot_size(&self) -> usize {
        match self {
            FieldKind::Num(w) => w.size(),
            FieldKind::Bool => 1,
            FieldKind::Str { max } | FieldKind::Bytes { max } => 4 + *max as usize,
            FieldKind::Enum { tags } => {
                if tags.len() <= 256 {
                    1
                } else {
                    2
                }
            }
            FieldKind::Array { elem, max } => 4 + *max as usize * elem.slot_size(),
            FieldKind::Tuple { elem, count } => *count as usize * elem.slot_size(),
            FieldKind::Ref => 4,
        }
    }

    /// Human-readable kind name, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Num(w) => w.name(),
            FieldKind::Bool => "bool",
            FieldKind::Str { .. } => "string",
            FieldKind::Bytes { .. } => "binary",
            FieldKind::Enum { .. } => "enum",
            FieldKind::Array { .. } => "array",
            FieldKind::Tuple { .. } => "tuple",
            FieldKind::Ref => "ref",
        }
    }

    /// The zero value of this kind: 0 / false / "" / empty / index-0 tag /
    /// null ref. Used when neither caller data nor a declared default exists.
    pub fn zero_value(&self) -> Value {
        match self {
            FieldKind::Num(w) => match w {
                NumWidth::I8 => Value::I8(0),
                NumWidth::I16 => Value::I16(0),
                NumWidth::I32 => Value::I32(0),
                NumWidth::U8 => Value::U8(0),
                NumWidth::U16 => Value::U16(0),
                NumWidth::U32 => Value::U32(0),
                NumWidth::F32 => Value::F32(0.0),
                NumWidth::F64 => Value::F64(0.0),
            },
            FieldKind::Bool => Value::Bool(false),
            FieldKind::Str { .. } => Value::Str(String::new()),
            FieldKind::Bytes { .. } => Value::Bytes(Vec::new()),
            FieldKind::Enum { tags } => Value::Enum(tags[0].clone()),
            FieldKind::Array { .. } => Value::Array(Vec::new()),
            FieldKind::Tuple { elem, count } => {
                Value::Tuple((0..*count).map(|_| elem.zero_value()).collect())
            }
            FieldKind::Ref => Value::Ref(None),
        }
    }

    /// True when a value of this variant can be stored in this kind.
    /// Numeric widths must match exactly; there is no implicit coercion.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::Num(NumWidth::I8), Value::I8(_)) => true,
            (FieldKind::Num(NumWidth::I16), Value::I16(_)) => true,
            (FieldKind::Num(NumWidth::I32), Value::I32(_)) => true,
            (FieldKind::Num(NumWidth::U8), Value::U8(_)) => true,
            (FieldKind::Num(NumWidth::U16), Value::U16(_)) => true,
            (FieldKind::Num(NumWidth::U32), Value::U32(_)) => true,
            (FieldKind::Num(NumWidth::F32), Value::F32(_)) => true,
            (FieldKind::Num(NumWidth::F64), Value::F64(_)) => true,
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::Str { .. }, Value::Str(_)) => true,
            (FieldKind::Bytes { .. }, Value::Bytes(_)) => true,
            (FieldKind::Enum { tags }, Value::Enum(tag)) => tags.iter().any(|t| t == tag),
            (FieldKind::Array { elem, .. }, Value::Array(items)) => {
                items.iter().all(|v| elem.accepts(v))
            }
            (FieldKind::Tuple { elem, count }, Value::Tuple(items)) => {
                items.len() == *count as usize && items.iter().all(|v| elem.accepts(v))
            }
            (FieldKind::Ref, Value::Ref(_)) => true,
            _ => false,
        }
    }

    fn validate_element(elem: &FieldKind) -> Result<()> {
        match elem {
            FieldKind::Num(_) | FieldKind::Bool | FieldKind::Str { .. } | FieldKind::Bytes { .. } => {
                Ok(())
            }
            other => Err(EcsError::InvalidElementType(format!(
                "{} cannot be an array or tuple element",
                other.name()
            ))),
        }
    }
}

/// A field descriptor plus its optional declared default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    kind: FieldKind,
    default: Option<Value>,
}

impl FieldSpec {
    pub fn i8() -> Self {
        Self::scalar(FieldKind::Num(NumWidth::I8))
    }
    pub fn i16() -> Self {
        Self::scalar(FieldKind::Num(NumWidth::I16))
    }
    pub fn i32() -> Self {
        Self::scalar(FieldKind::Num(NumWidth::I32))
    }
    pub fn u8() -> Self {
        Self::scalar(FieldKind::Num(NumWidth::U8))
    }
    pub fn u16() -> Self {
        Self::scalar(FieldKind::Num(NumWidth::U16))
    }
    pub fn u32() -> Self {
        Self::scalar(FieldKind::Num(NumWidth::U32))
    }
    pub fn f32() -> Self {
        Self::scalar(FieldKind::Num(NumWidth::F32))
    }
    pub fn f64() -> Self {
        Self::scalar(FieldKind::Num(NumWidth::F64))
    }
    pub fn boolean() -> Self {
        Self::scalar(FieldKind::Bool)
    }

    pub fn string(max: u32) -> Self {
        Self::scalar(FieldKind::Str { max })
    }

    pub fn binary(max: u32) -> Self {
        Self::scalar(FieldKind::Bytes { max })
    }

    /// Weak entity handle; reads validate lazily against the alive bit.
    pub fn entity_ref() -> Self {
        Self::scalar(FieldKind::Ref)
    }

    fn scalar(kind: FieldKind) -> Self {
        Self {
            kind,
            default: None,
        }
    }

    /// Finite tag set stored as an index into the sorted table.
    /// The first tag after sorting is the default.
    pub fn enumeration<S: Into<String>>(tags: impl IntoIterator<Item = S>) -> Result<Self> {
        let mut tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        if tags.is_empty() {
            return Err(EcsError::InvalidFieldSpec("enum requires at least one tag".into()));
        }
        if tags.len() > u16::MAX as usize + 1 {
            return Err(EcsError::InvalidFieldSpec(format!(
                "enum tag table too large: {}",
                tags.len()
            )));
        }
        tags.sort();
        tags.dedup();
        Ok(Self::scalar(FieldKind::Enum { tags }))
    }

    /// Variable-length list of up to `max` elements, 4-byte length prefix.
    pub fn array(elem: FieldKind, max: u32) -> Result<Self> {
        FieldKind::validate_element(&elem)?;
        Ok(Self::scalar(FieldKind::Array {
            elem: Box::new(elem),
            max,
        }))
    }

    /// Fixed-count run of `count` contiguous element slots, no prefix.
    pub fn tuple(elem: FieldKind, count: u32) -> Result<Self> {
        FieldKind::validate_element(&elem)?;
        if count == 0 {
            return Err(EcsError::InvalidFieldSpec("tuple count must be nonzero".into()));
        }
        Ok(Self::scalar(FieldKind::Tuple {
            elem: Box::new(elem),
            count,
        }))
    }

    /// Attach a declared default, validated against the descriptor kind.
    pub fn with_default(mut self, value: Value) -> Result<Self> {
        if !self.kind.accepts(&value) {
            return Err(EcsError::InvalidFieldSpec(format!(
                "default value does not match {} field",
                self.kind.name()
            )));
        }
        self.default = Some(value);
        Ok(self)
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// The value stored when the caller supplies none: the declared default
    /// if present, otherwise the kind's zero.
    pub fn fill_value(&self) -> Value {
        self.default
            .clone()
            .unwrap_or_else(|| self.kind.zero_value())
    }
}

/// Closed sum of storable field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    I8(i8),
    I16(i16),
    I32(i32),
    U8(u8),
    U16(u16),
    U32(u32),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    Enum(String),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    Ref(Option<Eid>),
}

impl Value {
    pub fn as_i8(&self) -> Option<i8> {
        match self {
            Value::I8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<i16> {
        match self {
            Value::I16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        match self {
            Value::U8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Value::U16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&str> {
        match self {
            Value::Enum(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ref_eid(&self) -> Option<Option<Eid>> {
        match self {
            Value::Ref(v) => Some(*v),
            _ => None,
        }
    }
}
