//! Storage layer for tdm
//!
//! SQLite persistence with migration-managed schema, plus the advisory lock
//! that keeps merge runs single-writer.

pub mod lock;
pub mod migrations;
pub mod sqlite;

pub use lock::ModelLock;
pub use sqlite::ModelStore;
