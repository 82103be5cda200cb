//! # Write Statements
//!
//! The `Create` / `Save` / `Delete` capabilities the repository drives.
//!
//! ## Save Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  primary key zero?                                                     │
//! │       │                                                                 │
//! │       ├── yes ──► INSERT INTO "users" ("name", "age") VALUES (?, ?)     │
//! │       │           RETURNING *                  ← backend assigns id    │
//! │       │                                                                 │
//! │       └── no ───► INSERT INTO "users" ("id", "name", "age")             │
//! │                   VALUES (?, ?, ?)                                      │
//! │                   ON CONFLICT ("id") DO UPDATE SET                      │
//! │                     "name" = excluded."name", "age" = excluded."age"    │
//! │                   RETURNING *                  ← full-row upsert       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the model's own columns are written; association rows are left alone.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::query::{arguments, decode, quote};
use crate::schema::Table;
use strata_core::Value;

/// Inserts a new row and returns it as stored.
///
/// A non-zero primary key is inserted as given; a zero key is left for the
/// backend to generate.
pub async fn create<M: Table>(pool: &SqlitePool, model: &M) -> DbResult<M> {
    let (names, values) = split(key_and_columns(model, false));
    let sql = insert_sql(M::TABLE_NAME, &names);

    debug!(table = M::TABLE_NAME, "Creating record");

    let row = sqlx::query_with(&sql, arguments(&values)?)
        .fetch_one(pool)
        .await
        .map_err(|e| DbError::persistence("create", e))?;

    decode(&row)
}

/// Writes every column of the row, inserting or overwriting by primary key.
pub async fn save<M: Table>(pool: &SqlitePool, model: &M) -> DbResult<M> {
    if model.primary_key().is_zero() {
        return create(pool, model).await;
    }

    let (names, values) = split(key_and_columns(model, true));
    let sql = upsert_sql(M::TABLE_NAME, M::PRIMARY_KEY, &names);

    debug!(table = M::TABLE_NAME, id = %model.primary_key(), "Saving record");

    let row = sqlx::query_with(&sql, arguments(&values)?)
        .fetch_one(pool)
        .await
        .map_err(|e| DbError::persistence("save", e))?;

    decode(&row)
}

/// Deletes the row with the given primary key.
///
/// ## Returns
/// * `Ok(())` - Row deleted
/// * `Err(DbError::NotFound)` - No row had that key
pub async fn delete_by_key<M: Table>(pool: &SqlitePool, key: &Value) -> DbResult<()> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        quote(M::TABLE_NAME),
        quote(M::PRIMARY_KEY)
    );

    debug!(table = M::TABLE_NAME, id = %key, "Deleting record");

    let result = sqlx::query_with(&sql, arguments(std::slice::from_ref(key))?)
        .execute(pool)
        .await
        .map_err(|e| DbError::persistence("delete", e))?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found(M::TABLE_NAME, key));
    }

    Ok(())
}

fn key_and_columns<M: Table>(model: &M, force_key: bool) -> Vec<(&'static str, Value)> {
    let mut columns = model.columns();
    let key = model.primary_key();
    if force_key || !key.is_zero() {
        columns.insert(0, (M::PRIMARY_KEY, key));
    }
    columns
}

fn split(columns: Vec<(&'static str, Value)>) -> (Vec<&'static str>, Vec<Value>) {
    columns.into_iter().unzip()
}

fn insert_sql(table: &str, names: &[&str]) -> String {
    if names.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quote(table));
    }
    let columns: Vec<String> = names.iter().map(|n| quote(n)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        quote(table),
        columns.join(", "),
        vec!["?"; names.len()].join(", ")
    )
}

fn upsert_sql(table: &str, key: &str, names: &[&str]) -> String {
    let assignments: Vec<String> = names
        .iter()
        .filter(|n| **n != key)
        .map(|n| format!("{0} = excluded.{0}", quote(n)))
        .collect();

    // A key-only table still needs a SET clause for RETURNING to yield the row.
    let assignments = if assignments.is_empty() {
        format!("{0} = excluded.{0}", quote(key))
    } else {
        assignments.join(", ")
    };

    let columns: Vec<String> = names.iter().map(|n| quote(n)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {} RETURNING *",
        quote(table),
        columns.join(", "),
        vec!["?"; names.len()].join(", "),
        quote(key),
        assignments
    )
}
