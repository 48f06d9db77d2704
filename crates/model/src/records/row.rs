use crate::core::value::{FieldValue, Value};
use serde::{Deserialize, Serialize};

/// A single row yielded by a source adapter or accepted by a destination
/// adapter, keyed by column name. Column order within `field_values` matches
/// the column order of the `TableDescriptor` the row was read against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowData {
    pub entity: String,
    pub field_values: Vec<FieldValue>,
}

impl RowData {
    pub fn new(entity: &str, field_values: Vec<FieldValue>) -> Self {
        RowData {
            entity: entity.to_string(),
            field_values,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.field_values
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field))
    }

    pub fn get_value(&self, field: &str) -> Value {
        self.get(field)
            .and_then(|f| f.value.clone())
            .unwrap_or(Value::Null)
    }

    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.field_values.iter().map(|f| f.name.as_str())
    }

    pub fn size_bytes(&self) -> usize {
        let mut size = self.entity.len();
        for field_value in &self.field_values {
            size += field_value.name.len();
            size += match &field_value.value {
                Some(v) => v.size_bytes(),
                None => 0,
            };
        }
        size
    }
}
