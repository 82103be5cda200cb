//! # strata-db: Generic Repository over SQLite
//!
//! One repository implementation for any model/entity pair, with composable
//! filters and optional eager loading of many-to-many associations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Strata Data Flow                                 │
//! │                                                                         │
//! │  Application code                                                      │
//! │       │  users.find_with_limit(Some(20), None, &[&equal("age", 30)])     │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    strata-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌──────────────┐   ┌────────────────┐    │   │
//! │  │   │  Repository   │   │    query     │   │    schema      │    │   │
//! │  │   │  <M, E, I>    │──►│  write       │   │  Table         │    │   │
//! │  │   │               │   │  (driver)    │   │  Inspector     │    │   │
//! │  │   └───────────────┘   └──────┬───────┘   └────────────────┘    │   │
//! │  │                              │                                  │   │
//! │  │                       ┌──────▼───────┐                          │   │
//! │  │                       │   Database   │  (pool.rs)               │   │
//! │  │                       │  SqlitePool  │                          │   │
//! │  │                       └──────────────┘                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`schema`] - Storage schema trait and association introspection
//! - [`query`] - Read side of the driver (filter, limit, preload, count)
//! - [`write`] - Write side of the driver (create, save, delete)
//! - [`repository`] - The generic repository
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata_core::specification::greater_than;
//! use strata_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("app.db")).await?;
//! let users = db.repository::<UserRecord, User>().enable_preload_associations();
//!
//! let mut ada = User::new("ada");
//! users.insert(&mut ada).await?;            // ada.id is now set
//! let adults = users.find(&[&greater_than("age", 17)]).await?;
//! ```

pub mod error;
pub mod pool;
pub mod query;
pub mod repository;
pub mod schema;
pub mod write;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::Repository;
pub use schema::{RelationKind, Relationship, SchemaInspector, Table, TableSchema};

pub use strata_core::{specification, Condition, Model, Specification, Value};
