//! Columnar analytic-store destination adapter (§4.1, end-to-end scenario 1):
//! a ClickHouse-like store with no real transactional constraints, so
//! `create_indexes`/`create_unique_constraints`/`create_foreign_keys` are all
//! best-effort and a primary key becomes an `ORDER BY`/`ReplacingMergeTree`
//! dedup key rather than an enforced uniqueness constraint.

pub mod dest;
