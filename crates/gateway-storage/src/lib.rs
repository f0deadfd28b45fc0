//! # Gateway Storage
//!
//! Persistence for the LLM Gateway:
//! - Connection pooling over SQLite or PostgreSQL
//! - Checksummed schema migrations
//! - Relational implementations of the provider, override and usage stores
//! - In-memory implementations for tests and database-less runs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod pool;
pub mod schema;
pub mod store;

mod overrides;
mod providers;
mod usage;

pub use error::{Result, StorageError};
pub use memory::MemoryStore;
pub use pool::{DatabaseKind, DatabasePool, PoolStats};
pub use schema::{AppliedMigration, Migration, Migrator, MIGRATIONS};
pub use store::SqlStore;
