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

//! Error types

use std::fmt;

use crate::entity::Eid;

/// ECS error type
#[derive(Debug, Clone, PartialEq)]
pub enum EcsError {
    /// Field descriptor rejected at construction (bad builder arguments)
    InvalidFieldSpec(String),

    /// Array/tuple element descriptor is itself an array, tuple, enum, or ref
    InvalidElementType(String),

    /// Query lists a component that is not registered with this world
    InvalidQuery(String),

    /// Operation against an entity id whose alive bit is clear
    UnknownEntity(Eid),

    /// Field name not present in the component schema
    UnknownField(String),

    /// Supplied value kind does not match the field descriptor
    ValueTypeMismatch {
        field: String,
        expected: &'static str,
    },

    /// Component def was never registered with this world
    UnregisteredComponent(String),

    /// Every entity id is live; nothing left to allocate
    PoolExhausted,

    /// Query sparse-set cache overflow
    QueryCacheFull,

    /// A query cursor fell more than one full ring capacity behind
    EventBufferOverflow,

    /// Worker received an execute request before its init message
    WorkerUninitialized,

    /// Worker system returned an error; carried back over the reply channel
    WorkerExecuteFailure(String),

    /// Serialization error
    SerializationError(String),

    /// Deserialization error
    DeserializationError(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::InvalidFieldSpec(msg) => write!(f, "Invalid field spec: {msg}"),
            EcsError::InvalidElementType(msg) => write!(f, "Invalid element type: {msg}"),
            EcsError::InvalidQuery(msg) => write!(f, "Invalid query: {msg}"),
            EcsError::UnknownEntity(eid) => write!(f, "Unknown entity {eid}"),
            EcsError::UnknownField(name) => write!(f, "Unknown field: {name}"),
            EcsError::ValueTypeMismatch { field, expected } => {
                write!(f, "Value type mismatch for field {field}: expected {expected}")
            }
            EcsError::UnregisteredComponent(name) => {
                write!(f, "Component not registered with this world: {name}")
            }
            EcsError::PoolExhausted => write!(f, "Entity pool exhausted"),
            EcsError::QueryCacheFull => write!(f, "Query cache full"),
            EcsError::EventBufferOverflow => write!(f, "Event buffer overflow"),
            EcsError::WorkerUninitialized => write!(f, "buffer not initialized"),
            EcsError::WorkerExecuteFailure(msg) => write!(f, "Worker execute failure: {msg}"),
            EcsError::SerializationError(msg) => write!(f, "Serialization error: {msg}"),
            EcsError::DeserializationError(msg) => write!(f, "Deserialization error: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
