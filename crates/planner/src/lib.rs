//! Dialect-aware SQL generation shared by the relational destination adapters
//! in `connectors`. Kept deliberately small: one `Dialect` abstraction plus
//! the handful of DDL shapes the Pipeline Engine actually needs
//! (`CREATE TABLE`, additive `ALTER TABLE`, post-load constraints). Writes
//! themselves render a literal multi-row `INSERT` in the destination
//! adapters rather than going through a shared DML builder here, since a
//! batch's values are heterogeneously typed and must cross each adapter's
//! own parameter-binding support (or lack of it); `Dialect::upsert_clause`
//! is the one piece of that `INSERT` this crate still owns, since the
//! upsert-vs-append decision is dialect syntax, not row-value rendering.

pub mod query;
