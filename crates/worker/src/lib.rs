//! The migration worker process (§2.1, §6): a stateless HTTP front for the
//! `pipeline` crate's engine. Holds one `AdapterRegistry`, built once at
//! startup and shared read-only across requests; every adapter instance it
//! hands out is still fresh per request (§5).

pub mod config;
pub mod http;
