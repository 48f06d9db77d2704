//! Converts a driver-native row (`tokio_postgres`, `mysql_async`, `tiberius`)
//! into a [`RowData`], given the column's already-resolved [`DataType`] (from
//! `get_schema`). Grounded on the teacher's `sql::base::row::DbRow`.

use bigdecimal::{BigDecimal, FromPrimitive};
use model::core::{
    data_type::DataType,
    value::{FieldValue, Value},
};
use model::records::row::RowData;
use tokio_postgres::{Row as PgRow, types::Json as PgJson};

pub enum DbRow<'a> {
    Postgres(&'a PgRow),
    MySql(&'a mysql_async::Row),
}

impl DbRow<'_> {
    /// Builds a `RowData` for `table` using the caller-supplied column order
    /// and data types (§3 TableDescriptor: "column order ... must match").
    pub fn to_row_data(&self, table: &str, columns: &[(String, DataType)]) -> RowData {
        let field_values = columns
            .iter()
            .map(|(name, data_type)| FieldValue {
                name: name.clone(),
                value: self.get_value(data_type, name),
                data_type: data_type.clone(),
            })
            .collect();
        RowData::new(table, field_values)
    }

    pub fn get_value(&self, data_type: &DataType, name: &str) -> Option<Value> {
        match data_type {
            DataType::Int | DataType::Long | DataType::Short | DataType::LongLong => {
                self.try_get_i64(name).map(Value::Int)
            }
            DataType::Int4 => self.try_get_i32(name).map(|v| Value::Int(v as i64)),
            DataType::IntUnsigned | DataType::ShortUnsigned | DataType::Year => {
                self.try_get_i64(name).map(Value::Int)
            }
            DataType::Float | DataType::Double => self.try_get_f64(name).map(Value::Float),
            DataType::Decimal | DataType::NewDecimal => {
                self.try_get_bigdecimal(name).map(Value::Decimal)
            }
            DataType::String | DataType::VarChar | DataType::Char => {
                self.try_get_string(name).map(Value::String)
            }
            DataType::Boolean => self.try_get_bool(name).map(Value::Boolean),
            DataType::Json => self.try_get_json(name).map(Value::Json),
            DataType::Timestamp => self.try_get_timestamp(name).map(Value::Timestamp),
            DataType::Date => self.try_get_date(name).map(Value::Date),
            DataType::Enum => self
                .try_get_string(name)
                .map(|v| Value::Enum(name.to_string(), v)),
            DataType::Bytea
            | DataType::Geometry
            | DataType::Blob
            | DataType::TinyBlob
            | DataType::MediumBlob
            | DataType::LongBlob
            | DataType::Binary
            | DataType::VarBinary => self.try_get_bytes(name).map(Value::Bytes),
            _ => self.try_get_string(name).map(Value::String),
        }
    }

    pub fn try_get_i32(&self, name: &str) -> Option<i32> {
        match self {
            DbRow::Postgres(row) => row.try_get::<_, i32>(name).ok(),
            DbRow::MySql(row) => row.get_opt::<i32, _>(name).and_then(|r| r.ok()),
        }
    }

    pub fn try_get_i64(&self, name: &str) -> Option<i64> {
        match self {
            DbRow::Postgres(row) => row
                .try_get::<_, i64>(name)
                .ok()
                .or_else(|| row.try_get::<_, i32>(name).ok().map(|v| v as i64)),
            DbRow::MySql(row) => row.get_opt::<i64, _>(name).and_then(|r| r.ok()),
        }
    }

    pub fn try_get_f64(&self, name: &str) -> Option<f64> {
        match self {
            DbRow::Postgres(row) => row.try_get::<_, f64>(name).ok(),
            DbRow::MySql(row) => row.get_opt::<f64, _>(name).and_then(|r| r.ok()),
        }
    }

    pub fn try_get_string(&self, name: &str) -> Option<String> {
        match self {
            DbRow::Postgres(row) => row.try_get::<_, String>(name).ok(),
            DbRow::MySql(row) => row.get_opt::<String, _>(name).and_then(|r| r.ok()),
        }
    }

    pub fn try_get_bool(&self, name: &str) -> Option<bool> {
        match self {
            DbRow::Postgres(row) => row.try_get::<_, bool>(name).ok(),
            DbRow::MySql(row) => row.get_opt::<bool, _>(name).and_then(|r| r.ok()),
        }
    }

    pub fn try_get_json(&self, name: &str) -> Option<serde_json::Value> {
        match self {
            DbRow::Postgres(row) => row
                .try_get::<_, PgJson<serde_json::Value>>(name)
                .ok()
                .map(|j| j.0),
            DbRow::MySql(row) => row
                .get_opt::<serde_json::Value, _>(name)
                .and_then(|r| r.ok()),
        }
    }

    pub fn try_get_bigdecimal(&self, name: &str) -> Option<BigDecimal> {
        match self {
            DbRow::Postgres(row) => row
                .try_get::<_, f64>(name)
                .ok()
                .and_then(BigDecimal::from_f64),
            DbRow::MySql(row) => row.get_opt::<BigDecimal, _>(name).and_then(|r| r.ok()),
        }
    }

    pub fn try_get_timestamp(&self, name: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            DbRow::Postgres(row) => row.try_get::<_, chrono::DateTime<chrono::Utc>>(name).ok(),
            DbRow::MySql(row) => row
                .get_opt::<chrono::NaiveDateTime, _>(name)
                .and_then(|r| r.ok())
                .map(|naive| chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(naive, chrono::Utc)),
        }
    }

    pub fn try_get_date(&self, name: &str) -> Option<chrono::NaiveDate> {
        match self {
            DbRow::Postgres(row) => row.try_get::<_, chrono::NaiveDate>(name).ok(),
            DbRow::MySql(row) => row.get_opt::<chrono::NaiveDate, _>(name).and_then(|r| r.ok()),
        }
    }

    pub fn try_get_bytes(&self, name: &str) -> Option<Vec<u8>> {
        match self {
            DbRow::Postgres(row) => row.try_get::<_, Vec<u8>>(name).ok(),
            DbRow::MySql(row) => row.get_opt::<Vec<u8>, _>(name).and_then(|r| r.ok()),
        }
    }
}
