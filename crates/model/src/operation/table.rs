use crate::core::data_type::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub source_type: DataType,
    pub nullable: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueConstraintDescriptor {
    pub name: String,
    pub columns: Vec<String>,
}

/// Schema of one table/collection, produced by a source adapter (§3
/// TableDescriptor). Column order here must match the column order of
/// `RowData` yielded for this table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: BTreeSet<String>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    pub unique_constraints: Vec<UniqueConstraintDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        TableDescriptor {
            name: name.into(),
            columns,
            primary_key: BTreeSet::new(),
            foreign_keys: Vec::new(),
            unique_constraints: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Destination-side column definition produced by a Type Mapper (§4.1
/// `mapTypes`). `dest_type` is dialect-specific SQL text for relational
/// destinations, or a logical type name for the columnar destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedColumn {
    pub name: String,
    pub dest_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}
