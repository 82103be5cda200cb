//! # Storage Schema
//!
//! What the driver needs to know about a model's table, and the
//! introspection capability that discovers its many-to-many associations.
//!
//! ## Relationship Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  HasMany ("Posts")                                                     │
//! │     users.id ◄──────── posts.user_id                                   │
//! │                                                                         │
//! │  ManyToMany ("Roles")                                                  │
//! │     users.id ◄── user_roles.user_id                                    │
//! │                  user_roles.role_id ──► roles.id                        │
//! │                                                                         │
//! │  Only ManyToMany relationships are reported by the inspector, so only  │
//! │  those are preloaded automatically.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

use crate::error::{DbError, DbResult};
use strata_core::Value;

// =============================================================================
// Table
// =============================================================================

/// Storage schema of a model.
///
/// Implemented next to `#[derive(sqlx::FromRow, Default)]` on the model.
/// Relationship fields on the model are `#[sqlx(skip)]` and filled by
/// [`attach`](Table::attach) when preloaded.
///
/// ## Example
/// ```rust,ignore
/// impl Table for UserRecord {
///     const TABLE_NAME: &'static str = "users";
///
///     fn primary_key(&self) -> Value { self.id.into() }
///
///     fn columns(&self) -> Vec<(&'static str, Value)> {
///         vec![("name", self.name.clone().into())]
///     }
///
///     fn relationships() -> Vec<Relationship> {
///         vec![Relationship::many_to_many("Roles", "roles", "user_roles", "user_id", "role_id")]
///     }
///
///     fn attach(&mut self, association: &str, rows: &[SqliteRow]) -> Result<(), sqlx::Error> {
///         if association == "Roles" {
///             self.roles = rows.iter().map(RoleRecord::from_row).collect::<Result<_, _>>()?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Table: for<'r> FromRow<'r, SqliteRow> + Default + Send + Sync + Unpin + 'static {
    /// Table the model is stored in.
    const TABLE_NAME: &'static str;

    /// Primary key column.
    const PRIMARY_KEY: &'static str = "id";

    /// Current primary key value. A zero value means "not persisted yet".
    fn primary_key(&self) -> Value;

    /// Writable columns other than the primary key, in insert order.
    fn columns(&self) -> Vec<(&'static str, Value)>;

    /// Declared relationships.
    fn relationships() -> Vec<Relationship> {
        Vec::new()
    }

    /// Receives the preloaded rows of one association.
    ///
    /// Called once per association for every fetched model; models with no
    /// related rows get an empty slice.
    fn attach(&mut self, association: &str, rows: &[SqliteRow]) -> Result<(), sqlx::Error> {
        let _ = (association, rows);
        Ok(())
    }
}

// =============================================================================
// Relationships
// =============================================================================

/// How the related table is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// `target.foreign_key` references the owner's primary key.
    HasMany { foreign_key: &'static str },

    /// Rows of `join_table` pair `owner_column` (owner key) with
    /// `target_column` (target key).
    ManyToMany {
        join_table: &'static str,
        owner_column: &'static str,
        target_column: &'static str,
    },
}

/// A relationship declared on a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    /// Association name used in preload directives.
    pub name: &'static str,
    pub kind: RelationKind,
    pub target_table: &'static str,
    pub target_key: &'static str,
}

impl Relationship {
    /// Declares a many-to-many relationship through `join_table`.
    pub fn many_to_many(
        name: &'static str,
        target_table: &'static str,
        join_table: &'static str,
        owner_column: &'static str,
        target_column: &'static str,
    ) -> Self {
        Relationship {
            name,
            kind: RelationKind::ManyToMany {
                join_table,
                owner_column,
                target_column,
            },
            target_table,
            target_key: "id",
        }
    }

    /// Declares a one-to-many relationship keyed by `foreign_key` on the target.
    pub fn has_many(name: &'static str, target_table: &'static str, foreign_key: &'static str) -> Self {
        Relationship {
            name,
            kind: RelationKind::HasMany { foreign_key },
            target_table,
            target_key: "id",
        }
    }

    /// Overrides the target table's key column (default `id`).
    pub fn target_key(mut self, column: &'static str) -> Self {
        self.target_key = column;
        self
    }

    pub fn is_many_to_many(&self) -> bool {
        matches!(self.kind, RelationKind::ManyToMany { .. })
    }
}

/// Looks up a declared relationship by association name.
pub fn find_relationship<M: Table>(name: &str) -> Option<Relationship> {
    M::relationships().into_iter().find(|r| r.name == name)
}

// =============================================================================
// Introspection
// =============================================================================

/// Schema introspection capability: which many-to-many associations does a
/// model declare?
pub trait SchemaInspector: Send + Sync {
    /// Returns the many-to-many association names of `model`, in declaration
    /// order and without duplicates.
    fn many_to_many<M: Table>(&self, model: &M) -> DbResult<Vec<String>>;
}

/// Default inspector: reads [`Table::relationships`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TableSchema;

impl SchemaInspector for TableSchema {
    fn many_to_many<M: Table>(&self, _model: &M) -> DbResult<Vec<String>> {
        let relationships = M::relationships();

        let mut seen: Vec<&str> = Vec::with_capacity(relationships.len());
        for rel in &relationships {
            if rel.name.is_empty() {
                return Err(DbError::Schema(format!(
                    "{} declares a relationship with an empty name",
                    M::TABLE_NAME
                )));
            }
            if seen.contains(&rel.name) {
                return Err(DbError::Schema(format!(
                    "{} declares relationship '{}' more than once",
                    M::TABLE_NAME,
                    rel.name
                )));
            }
            seen.push(rel.name);
        }

        Ok(relationships
            .iter()
            .filter(|r| r.is_many_to_many())
            .map(|r| r.name.to_string())
            .collect())
    }
}
