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

//! Schema and value serialization.
//!
//! Schemas are data, so they round-trip through JSON for tooling and
//! cross-process exchange. World state itself is not persisted here; column
//! buffers can be captured verbatim by external collaborators.

use serde::{Deserialize, Serialize};

use crate::component::ComponentDef;
use crate::error::{EcsError, Result};
use crate::field::Value;
use crate::schema::Schema;

/// Wire shape of a component definition: its name and schema, without the
/// process-local def id. Deserializing produces a def with a fresh id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub name: String,
    pub schema: Schema,
}

impl From<&ComponentDef> for ComponentDescriptor {
    fn from(def: &ComponentDef) -> Self {
        Self {
            name: def.name().to_string(),
            schema: def.schema().clone(),
        }
    }
}

impl ComponentDescriptor {
    pub fn into_def(self) -> ComponentDef {
        ComponentDef::new(self.name, self.schema)
    }
}

pub fn schema_to_json(schema: &Schema) -> Result<String> {
    serde_json::to_string(schema).map_err(|e| EcsError::SerializationError(e.to_string()))
}

pub fn schema_from_json(json: &str) -> Result<Schema> {
    serde_json::from_str(json).map_err(|e| EcsError::DeserializationError(e.to_string()))
}

pub fn descriptor_to_json(descriptor: &ComponentDescriptor) -> Result<String> {
    serde_json::to_string(descriptor).map_err(|e| EcsError::SerializationError(e.to_string()))
}

pub fn descriptor_from_json(json: &str) -> Result<ComponentDescriptor> {
    serde_json::from_str(json).map_err(|e| EcsError::DeserializationError(e.to_string()))
}

pub fn value_to_json(value: &Value) -> Result<String> {
    serde_json::to_string(value).map_err(|e| EcsError::SerializationError(e.to_string()))
}

pub fn value_from_json(json: &str) -> Result<Value> {
    serde_json::from_str(json).map_err(|e| EcsError::DeserializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldSpec;

    fn sample_schema() -> Schema {
        Schema::builder()
            .field("x", FieldSpec::f32())
            .field("label", FieldSpec::string(16))
            .field(
                "kind",
                FieldSpec::enumeration(["circle", "square"]).unwrap(),
            )
            .field("parent", FieldSpec::entity_ref())
            .build()
            .unwrap()
    }

    #[test]
    fn test_schema_roundtrip() {
        let schema = sample_schema();
        let json = schema_to_json(&schema).unwrap();
        let decoded = schema_from_json(&json).unwrap();
        assert_eq!(decoded, schema);
    }

    #[test]
    fn test_descriptor_roundtrip_gets_fresh_def_id() {
        let def = ComponentDef::new("Shape", sample_schema());
        let json = descriptor_to_json(&ComponentDescriptor::from(&def)).unwrap();
        let restored = descriptor_from_json(&json).unwrap().into_def();

        assert_eq!(restored.name(), def.name());
        assert_eq!(restored.schema(), def.schema());
        assert_ne!(restored.def_id(), def.def_id());
    }

    #[test]
    fn test_value_roundtrip() {
        for value in [
            Value::F32(1.5),
            Value::Str("hello".into()),
            Value::Ref(Some(7)),
            Value::Ref(None),
            Value::Array(vec![Value::I32(1), Value::I32(2)]),
        ] {
            let json = value_to_json(&value).unwrap();
            assert_eq!(value_from_json(&json).unwrap(), value);
        }
    }

    #[test]
    fn test_bad_json_is_a_deserialization_error() {
        assert!(matches!(
            schema_from_json("{nope"),
            Err(EcsError::DeserializationError(_))
        ));
    }
}
