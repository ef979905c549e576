//! Storage subsystem
//!
//! This module provides the abstraction and the two database implementations used to persist
//! normalized session records.
//!
//! Components:
//! - `storage_trait`: the Storage trait defining a uniform API.
//! - `types`: shared data types used by storage backends.
//! - `schema`: table layout, shared SQL and row mapping.
//! - `sqlite_storage`: SQLite implementation using sqlx.
//! - `postgres_storage`: PostgreSQL implementation using sqlx.
//! - `backend`: one-time backend selection with PostgreSQL to SQLite fallback.

pub mod backend;
pub mod postgres_storage;
pub mod schema;
pub mod sqlite_storage;
pub mod storage_trait;
pub mod types;

pub use backend::connect_storage;
pub use storage_trait::Storage;
