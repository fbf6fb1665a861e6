//! In-memory [`eventstore_core::DcbRecorder`] implementation. Useful for
//! tests and for local development without a Postgres instance; not
//! durable and not shared across processes.

mod store_memory;

pub use store_memory::InMemoryStore;
