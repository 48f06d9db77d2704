pub mod mssql_source;
pub mod mysql_dest;
pub mod mysql_source;
pub mod postgres_dest;
pub mod postgres_source;
pub mod row;
