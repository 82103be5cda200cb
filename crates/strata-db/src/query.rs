//! # Query Builder (read side)
//!
//! The `Where` / `Limit` / `Offset` / `Preload` / `Find` / `First` / `Count`
//! capabilities the repository drives.
//!
//! ## Statement Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  find   SELECT * FROM "users" WHERE (age > ?) LIMIT 20 OFFSET 40       │
//! │  first  SELECT * FROM "users" WHERE ("id" = ?) ORDER BY "id" LIMIT 1   │
//! │  count  SELECT COUNT(*) FROM "users" WHERE (age > ?)                   │
//! │                                                                         │
//! │  preload (one extra statement per association):                        │
//! │    SELECT t.*, j."user_id" AS __owner                                  │
//! │    FROM "roles" t INNER JOIN "user_roles" j ON j."role_id" = t."id"    │
//! │    WHERE j."user_id" IN (?, ?, ...)    -- 10 000 keys per statement    │
//! │                                                                         │
//! │  SQLite needs a LIMIT before OFFSET, so an offset alone is             │
//! │  written as LIMIT -1 OFFSET n.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;

use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Arguments, FromRow, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::schema::{find_relationship, RelationKind, Table};
use strata_core::{Filter, Specification, Value};

/// Alias carrying the owner's key on preloaded rows.
pub(crate) const OWNER_COLUMN: &str = "__owner";

/// Owner keys bound per preload statement, well under SQLite's 32766
/// variable limit.
pub(crate) const PRELOAD_CHUNK: usize = 10_000;

/// A read query against `M`'s table.
///
/// ## Example
/// ```rust,ignore
/// let adults: Vec<UserRecord> = Query::new()
///     .filter(&greater_than("age", 17))?
///     .preload("Roles")
///     .limit(Some(10))
///     .find(db.pool())
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Query<M> {
    filter: Filter,
    limit: Option<u64>,
    offset: Option<u64>,
    preloads: Vec<String>,
    order_by_key: bool,
    _model: PhantomData<fn() -> M>,
}

impl<M: Table> Default for Query<M> {
    fn default() -> Self {
        Query {
            filter: Filter::default(),
            limit: None,
            offset: None,
            preloads: Vec::new(),
            order_by_key: false,
            _model: PhantomData,
        }
    }
}

impl<M: Table> Query<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// ANDs a specification onto the query.
    pub fn filter(mut self, spec: &dyn Specification) -> DbResult<Self> {
        self.filter.push(spec)?;
        Ok(self)
    }

    /// ANDs every specification, left to right.
    pub fn filters(self, specifications: &[&dyn Specification]) -> DbResult<Self> {
        specifications
            .iter()
            .try_fold(self, |query, spec| query.filter(*spec))
    }

    /// Caps the number of rows; `None` means unbounded.
    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Skips rows; `None` means no offset.
    pub fn offset(mut self, offset: Option<u64>) -> Self {
        self.offset = offset;
        self
    }

    /// Eager-loads a declared association with the results.
    pub fn preload(mut self, association: impl Into<String>) -> Self {
        self.preloads.push(association.into());
        self
    }

    pub fn preloads(&self) -> &[String] {
        &self.preloads
    }

    /// The SELECT statement this query runs.
    pub fn select_sql(&self) -> String {
        let mut sql = format!("SELECT * FROM {}", quote(M::TABLE_NAME));
        self.push_where(&mut sql);

        if self.order_by_key {
            sql.push_str(&format!(" ORDER BY {}", quote(M::PRIMARY_KEY)));
        }

        match (self.limit, self.offset) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(_)) => sql.push_str(" LIMIT -1"),
            (None, None) => {}
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }

    /// The COUNT statement for the same filter. Limit, offset and preloads
    /// don't apply to counting.
    pub fn count_sql(&self) -> String {
        let mut sql = format!("SELECT COUNT(*) FROM {}", quote(M::TABLE_NAME));
        self.push_where(&mut sql);
        sql
    }

    fn push_where(&self, sql: &mut String) {
        if let Some(clause) = self.filter.clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
    }

    /// Runs the query, then one statement per preloaded association.
    pub async fn find(&self, pool: &SqlitePool) -> DbResult<Vec<M>> {
        let sql = self.select_sql();
        debug!(table = M::TABLE_NAME, sql = %sql, "Running select");

        let rows = sqlx::query_with(&sql, arguments(self.filter.values())?)
            .fetch_all(pool)
            .await
            .map_err(|e| DbError::persistence("find", e))?;

        let mut models = rows.iter().map(decode::<M>).collect::<DbResult<Vec<_>>>()?;

        for association in &self.preloads {
            preload_association(pool, &mut models, association).await?;
        }

        Ok(models)
    }

    /// The first matching row in primary-key order.
    pub async fn first(mut self, pool: &SqlitePool) -> DbResult<Option<M>> {
        self.order_by_key = true;
        self.limit = Some(1);
        Ok(self.find(pool).await?.into_iter().next())
    }

    /// Number of rows matching the filter.
    pub async fn count(&self, pool: &SqlitePool) -> DbResult<i64> {
        let sql = self.count_sql();
        debug!(table = M::TABLE_NAME, sql = %sql, "Running count");

        sqlx::query_scalar_with::<_, i64, _>(&sql, arguments(self.filter.values())?)
            .fetch_one(pool)
            .await
            .map_err(|e| DbError::persistence("count", e))
    }
}

// =============================================================================
// Preloading
// =============================================================================

/// Loads `association` for every model, [`PRELOAD_CHUNK`] owners per
/// statement, and hands each model its share of the rows.
async fn preload_association<M: Table>(
    pool: &SqlitePool,
    models: &mut [M],
    association: &str,
) -> DbResult<()> {
    let relationship =
        find_relationship::<M>(association).ok_or_else(|| DbError::UnknownAssociation {
            table: M::TABLE_NAME.to_string(),
            name: association.to_string(),
        })?;

    if models.is_empty() {
        return Ok(());
    }

    let keys: Vec<Value> = models.iter().map(M::primary_key).collect();
    let target = quote(relationship.target_table);
    let target_key = quote(relationship.target_key);

    let mut groups: HashMap<String, Vec<SqliteRow>> = HashMap::new();
    let mut fetched = 0;

    for chunk in keys.chunks(PRELOAD_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = match relationship.kind {
            RelationKind::ManyToMany {
                join_table,
                owner_column,
                target_column,
            } => format!(
                "SELECT t.*, j.{owner} AS {alias} FROM {target} t \
                 INNER JOIN {join} j ON j.{target_column} = t.{target_key} \
                 WHERE j.{owner} IN ({placeholders}) ORDER BY t.{target_key}",
                owner = quote(owner_column),
                alias = OWNER_COLUMN,
                target = target,
                join = quote(join_table),
                target_column = quote(target_column),
                target_key = target_key,
                placeholders = placeholders,
            ),
            RelationKind::HasMany { foreign_key } => format!(
                "SELECT t.*, t.{fk} AS {alias} FROM {target} t \
                 WHERE t.{fk} IN ({placeholders}) ORDER BY t.{target_key}",
                fk = quote(foreign_key),
                alias = OWNER_COLUMN,
                target = target,
                target_key = target_key,
                placeholders = placeholders,
            ),
        };

        let rows = sqlx::query_with(&sql, arguments(chunk)?)
            .fetch_all(pool)
            .await
            .map_err(|e| DbError::persistence("preload", e))?;

        fetched += rows.len();
        for row in rows {
            if let Some(owner) = owner_key(&row)? {
                groups.entry(owner).or_default().push(row);
            }
        }
    }

    debug!(
        table = M::TABLE_NAME,
        association = %association,
        owners = keys.len(),
        rows = fetched,
        "Preloaded association"
    );

    for (model, key) in models.iter_mut().zip(&keys) {
        let rows = groups.remove(&match_key(key)).unwrap_or_default();

        model
            .attach(association, &rows)
            .map_err(|source| DbError::Mapping {
                table: relationship.target_table.to_string(),
                source,
            })?;
    }

    Ok(())
}

/// Owners and related rows are matched on the key's text form, so a join
/// column declared with another affinity (`TEXT` holding `"1"` for an
/// `INTEGER` key of 1) still lines up.
fn match_key(key: &Value) -> String {
    match key {
        Value::Bytes(bytes) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
        other => other.to_string(),
    }
}

/// Reads the owner key off a preloaded row as its [`match_key`].
/// `None` for rows whose owner column is NULL.
fn owner_key(row: &SqliteRow) -> DbResult<Option<String>> {
    let storage_class = {
        let raw = row
            .try_get_raw(OWNER_COLUMN)
            .map_err(|e| DbError::persistence("preload", e))?;
        if raw.is_null() {
            return Ok(None);
        }
        raw.type_info().name().to_string()
    };

    let value = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(OWNER_COLUMN).map(Value::Int),
        "REAL" => row.try_get::<f64, _>(OWNER_COLUMN).map(Value::Float),
        "BLOB" => row.try_get::<Vec<u8>, _>(OWNER_COLUMN).map(Value::Bytes),
        _ => row.try_get::<String, _>(OWNER_COLUMN).map(Value::Text),
    };
    value
        .map(|v| Some(match_key(&v)))
        .map_err(|e| DbError::persistence("preload", e))
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Binds values in order.
pub(crate) fn arguments(values: &[Value]) -> DbResult<SqliteArguments<'_>> {
    let mut args = SqliteArguments::default();
    for value in values {
        let bound = match value {
            Value::Null => args.add(None::<i64>),
            Value::Bool(b) => args.add(*b),
            Value::Int(i) => args.add(*i),
            Value::Float(f) => args.add(*f),
            Value::Text(s) => args.add(s.as_str()),
            Value::Bytes(b) => args.add(b.as_slice()),
        };
        bound.map_err(|e| DbError::Bind(e.to_string()))?;
    }
    Ok(args)
}

/// Decodes a row into the model, tagging failures as mapping errors.
pub(crate) fn decode<M: Table>(row: &SqliteRow) -> DbResult<M> {
    M::from_row(row).map_err(|source| DbError::Mapping {
        table: M::TABLE_NAME.to_string(),
        source,
    })
}

/// Double-quotes an identifier.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
