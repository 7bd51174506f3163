//! Storage backends for the cachet encrypted index.
//!
//! The server side of the protocol is pure storage: two tables of opaque
//! rows, exact-match lookups, and a hard error on any attempt to overwrite
//! a live row. [`SqliteStore`] is the durable, normative backend;
//! [`MemoryStore`] is the volatile variant for tests and demos.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
