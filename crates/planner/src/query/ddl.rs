//! `CREATE TABLE` / additive `ALTER TABLE` / post-load constraint DDL,
//! shared by the relational destination adapters (§4.1, §4.4).

use crate::query::dialect::Dialect;
use model::operation::table::{ForeignKeyDescriptor, IndexDescriptor, MappedColumn, UniqueConstraintDescriptor};
use std::collections::BTreeSet;

fn column_clause(dialect: &dyn Dialect, column: &MappedColumn) -> String {
    let name = dialect.quote_identifier(&column.name);
    let mut clause = format!("{name} {}", column.dest_type);
    if !column.nullable {
        clause.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        clause.push_str(&format!(" DEFAULT {default}"));
    }
    clause
}

/// `CREATE TABLE IF NOT EXISTS <table> (...)`. Idempotent per §4.1 —
/// callers only invoke this when the table does not already exist;
/// `IF NOT EXISTS` is a second line of defense against races.
pub fn create_table_sql(
    dialect: &dyn Dialect,
    table: &str,
    columns: &[MappedColumn],
    primary_key: &BTreeSet<String>,
) -> String {
    let mut parts: Vec<String> = columns.iter().map(|c| column_clause(dialect, c)).collect();

    if !primary_key.is_empty() {
        let pk_cols = primary_key
            .iter()
            .map(|c| dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("PRIMARY KEY ({pk_cols})"));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        dialect.quote_identifier(table),
        parts.join(", ")
    )
}

/// Additive `ALTER TABLE ... ADD COLUMN`, used by the Schema Evolver (§4.4).
/// Evolved columns are always nullable — existing rows get no value for them.
pub fn add_column_sql(dialect: &dyn Dialect, table: &str, column: &MappedColumn) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        dialect.quote_identifier(table),
        column_clause(dialect, column)
    )
}

pub fn create_index_sql(dialect: &dyn Dialect, table: &str, index: &IndexDescriptor) -> String {
    let cols = index
        .columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({cols})",
        dialect.quote_identifier(&index.name),
        dialect.quote_identifier(table),
    )
}

pub fn add_unique_constraint_sql(
    dialect: &dyn Dialect,
    table: &str,
    constraint: &UniqueConstraintDescriptor,
) -> String {
    let cols = constraint
        .columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({cols})",
        dialect.quote_identifier(table),
        dialect.quote_identifier(&constraint.name),
    )
}

/// Foreign keys are created in a final pass after every table's data has
/// loaded (§4.2, §9 Open Questions) so the referenced table is guaranteed
/// to exist by the time this runs.
pub fn add_foreign_key_sql(dialect: &dyn Dialect, table: &str, fk: &ForeignKeyDescriptor) -> String {
    let cols = fk
        .columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let ref_cols = fk
        .referenced_columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "ALTER TABLE {} ADD FOREIGN KEY ({cols}) REFERENCES {} ({ref_cols})",
        dialect.quote_identifier(table),
        dialect.quote_identifier(&fk.referenced_table),
    )
}
