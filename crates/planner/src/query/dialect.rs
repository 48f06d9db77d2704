//! Defines the `Dialect` trait for database-specific SQL syntax.

use model::core::data_type::{DataType, SqlDialect};

pub trait Dialect: Send + Sync {
    /// Wraps an identifier (like a table or column name) in the correct
    /// quotation marks for the dialect.
    ///
    /// - PostgreSQL uses double quotes: `"my_column"`
    /// - MySQL uses backticks: `` `my_column` ``
    fn quote_identifier(&self, ident: &str) -> String;

    /// Renders a generic `DataType` into a database-specific SQL type string.
    fn render_data_type(&self, data_type: &DataType, max_length: Option<usize>) -> String;

    /// Returns the name of the dialect (e.g., "PostgreSQL", "MySQL").
    fn name(&self) -> String;

    /// Renders the tail of an `INSERT` statement that turns it into an
    /// upsert keyed on `primary_key`: `ON CONFLICT ... DO UPDATE` for
    /// Postgres, `ON DUPLICATE KEY UPDATE` for MySQL. Returns an empty
    /// string (plain append) when `primary_key` is empty.
    fn upsert_clause(&self, columns: &[String], primary_key: &[String]) -> String;

    /// This dialect's current-timestamp default expression.
    fn now_default_fn(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    /// This dialect's random-UUID-generation default expression.
    fn uuid_default_fn(&self) -> &'static str;

    /// Conservative cross-engine default translation (§4.1): a known
    /// engine function maps 1:1 to this dialect's equivalent, a literal
    /// scalar is re-quoted for this dialect, and anything unrecognised is
    /// dropped (`None`) — the column is created without a default rather
    /// than failing creation.
    fn translate_default(&self, source_default: &str) -> Option<String> {
        translate_default_expr(source_default, self.now_default_fn(), self.uuid_default_fn())
    }
}

/// Shared by every dialect's `translate_default`; the only per-dialect
/// inputs are the rendered names of the "now" and "uuid" functions.
fn translate_default_expr(source_default: &str, now_fn: &str, uuid_fn: &str) -> Option<String> {
    let trimmed = source_default.trim();
    let normalized = trimmed.trim_end_matches("()").to_ascii_uppercase();

    if matches!(
        normalized.as_str(),
        "CURRENT_TIMESTAMP" | "NOW" | "CURRENT_DATE" | "CURRENT_TIME" | "SYSDATE" | "GETDATE" | "GETUTCDATE"
    ) {
        return Some(now_fn.to_string());
    }
    if matches!(
        normalized.as_str(),
        "UUID" | "GEN_RANDOM_UUID" | "UUID_GENERATE_V4" | "NEWID"
    ) {
        return Some(uuid_fn.to_string());
    }
    if trimmed.eq_ignore_ascii_case("null") {
        return Some("NULL".to_string());
    }
    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
        return Some(trimmed.to_ascii_uppercase());
    }
    if trimmed.parse::<f64>().is_ok() {
        return Some(trimmed.to_string());
    }
    if trimmed.len() >= 2 {
        let bytes = trimmed.as_bytes();
        let quote = bytes[0];
        if (quote == b'\'' || quote == b'"') && bytes[bytes.len() - 1] == quote {
            let inner = &trimmed[1..trimmed.len() - 1];
            let escaped = inner.replace('\'', "''");
            return Some(format!("'{escaped}'"));
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{ident}""#)
    }

    fn render_data_type(&self, data_type: &DataType, max_length: Option<usize>) -> String {
        let mut type_name = data_type.postgres_name().into_owned();
        if data_type.supports_length(SqlDialect::Postgres)
            && let Some(max_len) = max_length
        {
            type_name = format!("{type_name}({max_len})");
        }
        type_name
    }

    fn name(&self) -> String {
        "PostgreSQL".into()
    }

    fn uuid_default_fn(&self) -> &'static str {
        "gen_random_uuid()"
    }

    fn upsert_clause(&self, columns: &[String], primary_key: &[String]) -> String {
        if primary_key.is_empty() {
            return String::new();
        }
        let conflict_cols = primary_key
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = columns
            .iter()
            .filter(|c| !primary_key.contains(c))
            .map(|c| {
                let q = self.quote_identifier(c);
                format!("{q} = EXCLUDED.{q}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        if updates.is_empty() {
            format!("ON CONFLICT ({conflict_cols}) DO NOTHING")
        } else {
            format!("ON CONFLICT ({conflict_cols}) DO UPDATE SET {updates}")
        }
    }
}

#[derive(Debug, Clone)]
pub struct MySql;

impl Dialect for MySql {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#"`{ident}`"#)
    }

    fn render_data_type(&self, data_type: &DataType, max_length: Option<usize>) -> String {
        let mut type_name = data_type.mysql_name().into_owned();
        if data_type.supports_length(SqlDialect::MySql)
            && let Some(max_len) = max_length
        {
            type_name = format!("{type_name}({max_len})");
        }
        type_name
    }

    fn name(&self) -> String {
        "MySQL".into()
    }

    fn uuid_default_fn(&self) -> &'static str {
        "UUID()"
    }

    fn upsert_clause(&self, columns: &[String], primary_key: &[String]) -> String {
        if primary_key.is_empty() {
            return String::new();
        }
        let updates = columns
            .iter()
            .filter(|c| !primary_key.contains(c))
            .map(|c| {
                let q = self.quote_identifier(c);
                format!("{q} = VALUES({q})")
            })
            .collect::<Vec<_>>()
            .join(", ");
        if updates.is_empty() {
            // MySQL has no DO NOTHING; re-assign the PK to itself to make the
            // statement a harmless no-op update on conflict.
            let pk = self.quote_identifier(&primary_key[0]);
            format!("ON DUPLICATE KEY UPDATE {pk} = {pk}")
        } else {
            format!("ON DUPLICATE KEY UPDATE {updates}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_upsert_clause_excludes_pk_from_updates() {
        let dialect = Postgres;
        let clause = dialect.upsert_clause(
            &["id".into(), "name".into()],
            &["id".into()],
        );
        assert!(clause.contains("ON CONFLICT (\"id\")"));
        assert!(clause.contains("\"name\" = EXCLUDED.\"name\""));
        assert!(!clause.contains("\"id\" = EXCLUDED.\"id\""));
    }

    #[test]
    fn mysql_upsert_clause_uses_values_function() {
        let dialect = MySql;
        let clause = dialect.upsert_clause(&["id".into(), "name".into()], &["id".into()]);
        assert!(clause.contains("ON DUPLICATE KEY UPDATE"));
        assert!(clause.contains("`name` = VALUES(`name`)"));
    }

    #[test]
    fn append_only_without_primary_key_has_no_upsert_clause() {
        let dialect = Postgres;
        assert_eq!(dialect.upsert_clause(&["id".into()], &[]), "");
    }

    #[test]
    fn known_engine_functions_map_one_to_one_across_dialects() {
        assert_eq!(Postgres.translate_default("now()"), Some("CURRENT_TIMESTAMP".into()));
        assert_eq!(MySql.translate_default("NOW()"), Some("CURRENT_TIMESTAMP".into()));
        assert_eq!(Postgres.translate_default("uuid_generate_v4()"), Some("gen_random_uuid()".into()));
        assert_eq!(MySql.translate_default("gen_random_uuid()"), Some("UUID()".into()));
    }

    #[test]
    fn literal_scalars_are_requoted_for_the_destination() {
        assert_eq!(Postgres.translate_default("'active'"), Some("'active'".into()));
        assert_eq!(Postgres.translate_default("42"), Some("42".into()));
        assert_eq!(Postgres.translate_default("true"), Some("TRUE".into()));
    }

    #[test]
    fn unrecognised_defaults_are_dropped_rather_than_failing_creation() {
        assert_eq!(Postgres.translate_default("nextval('seq')"), None);
    }
}
