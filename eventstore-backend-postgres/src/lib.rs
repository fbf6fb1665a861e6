//! Durable Postgres-backed [`eventstore_core::DcbRecorder`], in either of
//! two interchangeable index encodings (TS: tsvector/GIN full-text search;
//! TT: tag side-table). See `IndexStrategy`.

mod config;
mod store_postgres;
mod strategy;
mod tt;
mod ts;

pub use config::{check_identifier_length, PgConfig};
pub use store_postgres::PostgresStore;
pub use strategy::IndexStrategy;
