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

//! weft ECS - data-oriented Entity Component System runtime
//!
//! Columnar component storage over flat shared byte buffers, membership
//! bitmask queries with reactive per-tick deltas, and deterministic
//! `eid % thread_count` worker partitioning.

pub mod column;
pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod field;
pub mod pool;
pub mod query;
pub mod schema;
pub mod serialization;
pub mod singleton;
pub mod sparse;
pub mod worker;
pub mod world;

// Re-exports for convenience
pub use component::{ComponentDef, DefId, Reader, Snapshot, Writer};
pub use entity::{Eid, Mask};
pub use error::{EcsError, Result};
pub use event::{Event, EventKind};
pub use field::{FieldKind, FieldSpec, NumWidth, Value, NULL_REF};
pub use query::Query;
pub use schema::{Schema, SchemaBuilder};
pub use singleton::{SingletonDef, SingletonWatch};
pub use worker::{SystemFn, Worker, WorkerInit, WorkerPool, WorkerReply, WorkerRequest};
pub use world::{Context, World, WorldBuilder, WorldHandle};
