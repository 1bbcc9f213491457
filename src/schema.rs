//! Ordered component schemas.

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, Result};
use crate::field::FieldSpec;

/// Ordered map from field name to field descriptor.
///
/// Field order is declaration order and is fixed at build time; column
/// layout and snapshots follow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<(String, FieldSpec)>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Empty schema (tag components carry no fields).
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn fields(&self) -> &[(String, FieldSpec)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field index and descriptor by name.
    pub fn get(&self, name: &str) -> Option<(usize, &FieldSpec)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, (n, _))| n == name)
            .map(|(i, (_, spec))| (i, spec))
    }
}

/// Builder collecting `(name, spec)` pairs in declaration order.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<(String, FieldSpec)>,
}

impl SchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.push((name.into(), spec));
        self
    }

    /// Validates names (non-empty, unique) and finalizes the schema.
    pub fn build(self) -> Result<Schema> {
        for (i, (name, _)) in self.fields.iter().enumerate() {
            if name.is_empty() {
                return Err(EcsError::InvalidFieldSpec("field name is empty".into()));
            }
            if self.fields[..i].iter().any(|(n, _)| n == name) {
                return Err(EcsError::InvalidFieldSpec(format!(
                    "duplicate field name: {name}"
                )));
            }
        }
        Ok(Schema {
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_order_and_lookup() {
        let schema = Schema::builder()
            .field("x", FieldSpec::f32())
            .field("y", FieldSpec::f32())
            .field("label", FieldSpec::string(16))
            .build()
            .unwrap();

        assert_eq!(schema.len(), 3);
        assert_eq!(schema.get("y").unwrap().0, 1);
        assert!(schema.get("z").is_none());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = Schema::builder()
            .field("x", FieldSpec::f32())
            .field("x", FieldSpec::f64())
            .build();
        assert!(matches!(result, Err(EcsError::InvalidFieldSpec(_))));
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = Schema::builder().field("", FieldSpec::f32()).build();
        assert!(matches!(result, Err(EcsError::InvalidFieldSpec(_))));
    }

    #[test]
    fn test_empty_schema() {
        assert!(Schema::empty().is_empty());
        assert!(Schema::builder().build().unwrap().is_empty());
    }
}
