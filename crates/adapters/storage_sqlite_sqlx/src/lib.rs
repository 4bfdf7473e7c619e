//! # homebus-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the storage port traits defined in `homebus-app::ports::storage`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `homebus-app` (for port traits) and `homebus-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod codec;
pub mod device_store;
pub mod error;
pub mod pool;
pub mod zone_repo;
