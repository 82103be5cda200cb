//! # Generic Repository
//!
//! One CRUD + query implementation for every model/entity pair.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  READ   find_with_limit(limit, offset, specs)                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │         filtered(specs)  ──────────────────► shared with count()       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │         preload enabled? ── yes ──► associations() (resolved once)     │
//! │           │                          └─► .preload(name) for each       │
//! │           ▼                                                             │
//! │         .limit().offset().find() ──► Vec<M> ──► to_entity ──► Vec<E>   │
//! │                                                                         │
//! │  WRITE  insert(&mut entity)                                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │         M::from_entity ──► create ──► row ──► to_entity ──► *entity    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Association Cache
//! Discovery runs at most once per repository, the first time a read runs
//! with preloading enabled. The cache is a `OnceLock`, so concurrent first
//! reads still introspect exactly once. A failed introspection is logged and
//! cached as "no associations"; reads never fail because of it.

use std::fmt;
use std::marker::PhantomData;
use std::sync::OnceLock;

use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::query::{quote, Query};
use crate::schema::{SchemaInspector, Table, TableSchema};
use crate::write;
use strata_core::{Condition, Model, Specification, Value};

/// Repository over model `M`, exposing entities `E`.
///
/// `I` is the schema introspection capability used to discover which
/// associations to preload.
///
/// ## Example
/// ```rust,ignore
/// let users = Repository::<UserRecord, User>::new(pool).enable_preload_associations();
///
/// let mut ada = User::new("ada", 36);
/// users.insert(&mut ada).await?;
/// assert_ne!(ada.id, 0);
///
/// let found = users.find_by_id(ada.id).await?;
/// ```
pub struct Repository<M, E, I = TableSchema> {
    pool: SqlitePool,
    inspector: I,
    preload_associations: bool,
    associations: OnceLock<Vec<String>>,
    _types: PhantomData<fn() -> (M, E)>,
}

impl<M, E> Repository<M, E, TableSchema>
where
    M: Table + Model<E>,
{
    /// Binds the repository to a pool. No I/O happens here.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_inspector(pool, TableSchema)
    }
}

impl<M, E, I> Repository<M, E, I>
where
    M: Table + Model<E>,
    I: SchemaInspector,
{
    /// Binds the repository to a pool and a custom schema inspector.
    pub fn with_inspector(pool: SqlitePool, inspector: I) -> Self {
        Repository {
            pool,
            inspector,
            preload_associations: false,
            associations: OnceLock::new(),
            _types: PhantomData,
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Turns on eager loading of every many-to-many association.
    pub fn enable_preload_associations(mut self) -> Self {
        self.preload_associations = true;
        self
    }

    /// Turns eager loading off.
    ///
    /// This clears the flag. Already discovered associations stay cached and
    /// are reused if preloading is enabled again.
    pub fn disable_preload_associations(mut self) -> Self {
        self.preload_associations = false;
        self
    }

    /// Enables or disables eager loading.
    pub fn set_preload_associations(self, enabled: bool) -> Self {
        if enabled {
            self.enable_preload_associations()
        } else {
            self.disable_preload_associations()
        }
    }

    pub fn preload_associations(&self) -> bool {
        self.preload_associations
    }

    /// Associations discovered so far; `None` until the first preloading read.
    pub fn resolved_associations(&self) -> Option<&[String]> {
        self.associations.get().map(Vec::as_slice)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Persists a new entity. Generated fields (such as the id) are written
    /// back into `entity`.
    pub async fn insert(&self, entity: &mut E) -> DbResult<()> {
        let model = M::from_entity(entity);
        let stored = write::create(&self.pool, &model).await?;

        debug!(table = M::TABLE_NAME, id = %stored.primary_key(), "Inserted");
        *entity = stored.to_entity();
        Ok(())
    }

    /// Saves every column of `entity`: inserts when its key is zero,
    /// otherwise overwrites the row with that key. The stored row is written
    /// back into `entity`.
    pub async fn update(&self, entity: &mut E) -> DbResult<()> {
        let model = M::from_entity(entity);
        let stored = write::save(&self.pool, &model).await?;

        debug!(table = M::TABLE_NAME, id = %stored.primary_key(), "Updated");
        *entity = stored.to_entity();
        Ok(())
    }

    /// Deletes the row behind `entity`.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - No row had the entity's key
    pub async fn delete(&self, entity: &E) -> DbResult<()> {
        let model = M::from_entity(entity);
        write::delete_by_key::<M>(&self.pool, &model.primary_key()).await
    }

    /// Deletes by primary key without loading the entity.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - No row had that key
    pub async fn delete_by_id(&self, id: impl Into<Value>) -> DbResult<()> {
        write::delete_by_key::<M>(&self.pool, &id.into()).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetches one entity by primary key.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - No row had that key
    pub async fn find_by_id(&self, id: impl Into<Value>) -> DbResult<E> {
        let id = id.into();
        let key = key_condition::<M>(&id);

        let model = Query::<M>::new()
            .filter(&key)?
            .first(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found(M::TABLE_NAME, &id))?;

        Ok(model.to_entity())
    }

    /// Every entity matching all `specifications`.
    pub async fn find(&self, specifications: &[&dyn Specification]) -> DbResult<Vec<E>> {
        self.find_with_limit(None, None, specifications).await
    }

    /// Entities matching all `specifications`, bounded by `limit` and
    /// `offset` (`None` means unbounded). Results keep the backend's order.
    pub async fn find_with_limit(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
        specifications: &[&dyn Specification],
    ) -> DbResult<Vec<E>> {
        let mut query = self.filtered(specifications)?;

        if self.preload_associations {
            for association in self.associations() {
                query = query.preload(association.as_str());
            }
        }

        let models = query.limit(limit).offset(offset).find(&self.pool).await?;

        debug!(
            table = M::TABLE_NAME,
            limit = ?limit,
            offset = ?offset,
            count = models.len(),
            "Found records"
        );

        Ok(models.iter().map(|m| m.to_entity()).collect())
    }

    /// Every entity in the table.
    pub async fn find_all(&self) -> DbResult<Vec<E>> {
        self.find_with_limit(None, None, &[]).await
    }

    /// Number of rows matching all `specifications`. Never preloads.
    pub async fn count(&self, specifications: &[&dyn Specification]) -> DbResult<i64> {
        let count = self.filtered(specifications)?.count(&self.pool).await?;
        debug!(table = M::TABLE_NAME, count, "Counted records");
        Ok(count)
    }

    /// The filtering shared by `find_with_limit` and `count`, so both see
    /// exactly the same rows.
    fn filtered(&self, specifications: &[&dyn Specification]) -> DbResult<Query<M>> {
        Query::<M>::new().filters(specifications)
    }

    /// Cached association names, discovered on first use.
    fn associations(&self) -> &[String] {
        self.associations.get_or_init(|| {
            let model = M::default();
            match self.inspector.many_to_many(&model) {
                Ok(names) => {
                    let mut unique: Vec<String> = Vec::with_capacity(names.len());
                    for name in names {
                        if !unique.contains(&name) {
                            unique.push(name);
                        }
                    }
                    debug!(table = M::TABLE_NAME, associations = ?unique, "Resolved associations");
                    unique
                }
                Err(err) => {
                    warn!(
                        table = M::TABLE_NAME,
                        error = %err,
                        "Association introspection failed, preloading nothing"
                    );
                    Vec::new()
                }
            }
        })
    }
}

/// `"<primary key>" = ?` for a model's table.
fn key_condition<M: Table>(id: &Value) -> Condition {
    Condition::new(format!("{} = ?", quote(M::PRIMARY_KEY)), vec![id.clone()])
}

impl<M, E, I: Clone> Clone for Repository<M, E, I> {
    fn clone(&self) -> Self {
        Repository {
            pool: self.pool.clone(),
            inspector: self.inspector.clone(),
            preload_associations: self.preload_associations,
            associations: self.associations.clone(),
            _types: PhantomData,
        }
    }
}

impl<M: Table, E, I> fmt::Debug for Repository<M, E, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("table", &M::TABLE_NAME)
            .field("preload_associations", &self.preload_associations)
            .field("associations", &self.associations.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, grant, Role, RoleRecord, User, UserRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use strata_core::specification::{equal, greater_than, is_in, less_than};

    #[derive(Debug, Clone, Default)]
    struct CountingInspector {
        calls: Arc<AtomicUsize>,
    }

    impl SchemaInspector for CountingInspector {
        fn many_to_many<M: Table>(&self, model: &M) -> DbResult<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            TableSchema.many_to_many(model)
        }
    }

    #[derive(Debug, Clone, Copy)]
    struct FailingInspector;

    impl SchemaInspector for FailingInspector {
        fn many_to_many<M: Table>(&self, _model: &M) -> DbResult<Vec<String>> {
            Err(DbError::Schema("introspection unavailable".to_string()))
        }
    }

    async fn users_with(names_and_ages: &[(&str, i64)]) -> (crate::Database, Repository<UserRecord, User>) {
        let db = testing::database().await;
        let repo = db.repository::<UserRecord, User>();
        for (name, age) in names_and_ages {
            repo.insert(&mut User::new(name, *age)).await.unwrap();
        }
        (db, repo)
    }

    async fn roles(db: &crate::Database, names: &[&str]) {
        let repo = db.repository::<RoleRecord, Role>();
        for name in names {
            let mut role = Role {
                name: name.to_string(),
                ..Role::default()
            };
            repo.insert(&mut role).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_insert_find_delete_scenario() {
        let (_db, repo) = users_with(&[]).await;

        let mut user = User::new("a", 0);
        repo.insert(&mut user).await.unwrap();
        assert_eq!(user.id, 1);

        let found = repo.find_by_id(1).await.unwrap();
        assert_eq!(found, User::new("a", 0).with_id(1));

        repo.delete_by_id(1).await.unwrap();

        let err = repo.find_by_id(1).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_insert_then_find_by_id_matches() {
        let (_db, repo) = users_with(&[("x", 1), ("y", 2)]).await;

        let mut ada = User::new("ada", 36);
        repo.insert(&mut ada).await.unwrap();

        let found = repo.find_by_id(ada.id).await.unwrap();
        assert_eq!(found, ada);
        assert_eq!(found.id, 3);
    }

    #[tokio::test]
    async fn test_unsigned_ids() {
        let (_db, repo) = users_with(&[("ada", 36), ("bob", 17)]).await;

        let id: u64 = 2;
        assert_eq!(repo.find_by_id(id).await.unwrap().name, "bob");
        assert!(repo.find_by_id(u64::MAX).await.unwrap_err().is_not_found());

        repo.delete_by_id(1_usize).await.unwrap();
        assert_eq!(repo.count(&[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_overwrites_row() {
        let (_db, repo) = users_with(&[("ada", 36)]).await;

        let mut ada = repo.find_by_id(1).await.unwrap();
        ada.name = "ada lovelace".to_string();
        ada.age = 37;
        repo.update(&mut ada).await.unwrap();

        let found = repo.find_by_id(1).await.unwrap();
        assert_eq!(found.name, "ada lovelace");
        assert_eq!(found.age, 37);
        assert_eq!(repo.count(&[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_of_new_entity_inserts() {
        let (_db, repo) = users_with(&[]).await;

        let mut bob = User::new("bob", 17);
        repo.update(&mut bob).await.unwrap();

        assert_eq!(bob.id, 1);
        assert_eq!(repo.find_all().await.unwrap(), vec![bob]);
    }

    #[tokio::test]
    async fn test_delete_entity() {
        let (_db, repo) = users_with(&[("ada", 36), ("bob", 17)]).await;

        let bob = repo.find_by_id(2).await.unwrap();
        repo.delete(&bob).await.unwrap();

        let remaining = repo.find_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "ada");

        let err = repo.delete(&bob).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_id_is_not_found() {
        let (_db, repo) = users_with(&[("ada", 36)]).await;

        let err = repo.delete_by_id(99).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert_eq!(repo.count(&[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_by_missing_id_is_not_found() {
        let (_db, repo) = users_with(&[]).await;

        let err = repo.find_by_id(7).await.unwrap_err();
        assert_eq!(err.to_string(), "users not found: 7");
    }

    #[tokio::test]
    async fn test_find_applies_every_specification() {
        let (_db, repo) = users_with(&[("ada", 36), ("bob", 17), ("cy", 52), ("di", 29)]).await;

        let found = repo
            .find(&[&greater_than("age", 20), &less_than("age", 50)])
            .await
            .unwrap();

        let names: Vec<_> = found.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["ada", "di"]);
    }

    #[tokio::test]
    async fn test_find_with_limit_is_bounded_by_count() {
        let (_db, repo) =
            users_with(&[("ada", 36), ("bob", 17), ("cy", 52), ("di", 29), ("ed", 12)]).await;
        let adults = greater_than("age", 18);
        let total = repo.count(&[&adults]).await.unwrap() as usize;
        assert_eq!(total, 3);

        for limit in 0..=5_u64 {
            let page = repo
                .find_with_limit(Some(limit), Some(0), &[&adults])
                .await
                .unwrap();
            assert_eq!(page.len(), (limit as usize).min(total), "limit {}", limit);
        }
    }

    #[tokio::test]
    async fn test_find_with_offset() {
        let (_db, repo) = users_with(&[("ada", 36), ("bob", 17), ("cy", 52)]).await;

        let page = repo.find_with_limit(Some(1), Some(1), &[]).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "bob");

        let rest = repo.find_with_limit(None, Some(2), &[]).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].name, "cy");
    }

    #[tokio::test]
    async fn test_count_matches_find() {
        let (_db, repo) = users_with(&[("ada", 36), ("bob", 17), ("cy", 52), ("di", 29)]).await;

        let young = less_than("age", 30);
        let named = is_in("name", ["ada", "bob", "zed"]);
        let nobody = equal("name", "nobody");
        let young: &dyn Specification = &young;
        let named: &dyn Specification = &named;
        let nobody: &dyn Specification = &nobody;
        let cases: Vec<Vec<&dyn Specification>> = vec![
            vec![],
            vec![young],
            vec![named],
            vec![young, named],
            vec![nobody],
        ];

        for specs in cases {
            let count = repo.count(&specs).await.unwrap();
            let found = repo.find(&specs).await.unwrap();
            assert_eq!(count as usize, found.len());
        }
    }

    #[tokio::test]
    async fn test_invalid_specification_fails_before_query() {
        let (_db, repo) = users_with(&[("ada", 36)]).await;
        let bad = Condition::new("age > ? AND age < ?", vec![Value::Int(1)]);

        let err = repo.find(&[&bad]).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidSpecification(_)));

        let err = repo.count(&[&bad]).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidSpecification(_)));
    }

    #[tokio::test]
    async fn test_preload_attaches_many_to_many() {
        let (db, repo) = users_with(&[("ada", 36), ("bob", 17)]).await;
        roles(&db, &["admin", "editor"]).await;
        grant(&db, 1, 1).await;
        grant(&db, 1, 2).await;

        let plain = repo.find_by_id(1).await.unwrap();
        assert!(plain.roles.is_empty());

        let repo = repo.enable_preload_associations();
        let users = repo.find_all().await.unwrap();

        let ada_roles: Vec<_> = users[0].roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(ada_roles, vec!["admin", "editor"]);
        assert!(users[1].roles.is_empty());
        // has-many associations are not preloaded automatically
        assert!(users[0].post_titles.is_empty());
    }

    #[tokio::test]
    async fn test_associations_resolved_once() {
        let db = testing::database().await;
        let inspector = CountingInspector::default();
        let calls = inspector.calls.clone();
        let repo = Repository::<UserRecord, User, _>::with_inspector(db.pool().clone(), inspector)
            .enable_preload_associations();

        assert!(repo.resolved_associations().is_none());

        for _ in 0..5 {
            repo.find(&[]).await.unwrap();
        }
        repo.find_all().await.unwrap();
        repo.find_with_limit(Some(1), None, &[]).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(repo.resolved_associations(), Some(&["Roles".to_string()][..]));
    }

    #[tokio::test]
    async fn test_concurrent_first_use_resolves_once() {
        let db = testing::database().await;
        let inspector = CountingInspector::default();
        let calls = inspector.calls.clone();
        let repo = Arc::new(
            Repository::<UserRecord, User, _>::with_inspector(db.pool().clone(), inspector)
                .enable_preload_associations(),
        );

        let (a, b, c) = tokio::join!(repo.find(&[]), repo.find_all(), repo.find(&[]));
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move { repo.find_all().await.map(|users| users.len()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_introspection_without_preload() {
        let (db, _) = users_with(&[("ada", 36)]).await;
        let inspector = CountingInspector::default();
        let calls = inspector.calls.clone();
        let repo = Repository::<UserRecord, User, _>::with_inspector(db.pool().clone(), inspector);

        repo.find_all().await.unwrap();
        repo.count(&[]).await.unwrap();
        repo.find_by_id(1).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(repo.resolved_associations().is_none());
    }

    #[tokio::test]
    async fn test_count_never_resolves_associations() {
        let db = testing::database().await;
        let inspector = CountingInspector::default();
        let calls = inspector.calls.clone();
        let repo = Repository::<UserRecord, User, _>::with_inspector(db.pool().clone(), inspector)
            .enable_preload_associations();

        repo.count(&[]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_introspection_still_queries() {
        let (db, _) = users_with(&[("ada", 36)]).await;
        roles(&db, &["admin"]).await;
        grant(&db, 1, 1).await;

        let repo = Repository::<UserRecord, User, _>::with_inspector(db.pool().clone(), FailingInspector)
            .enable_preload_associations();

        let users = repo.find_all().await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].roles.is_empty());
        assert_eq!(repo.resolved_associations(), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_preload_toggles() {
        let pool = sqlx::SqlitePool::connect_lazy("sqlite::memory:").unwrap();
        let repo = Repository::<UserRecord, User>::new(pool);
        assert!(!repo.preload_associations());

        let repo = repo.enable_preload_associations();
        assert!(repo.preload_associations());

        let repo = repo.disable_preload_associations();
        assert!(!repo.preload_associations());

        let repo = repo.set_preload_associations(true);
        assert!(repo.preload_associations());

        let repo = repo.set_preload_associations(false);
        assert!(!repo.preload_associations());
    }

    #[tokio::test]
    async fn test_disabled_preload_keeps_cache() {
        let (db, _) = users_with(&[("ada", 36)]).await;
        let inspector = CountingInspector::default();
        let calls = inspector.calls.clone();
        let repo = Repository::<UserRecord, User, _>::with_inspector(db.pool().clone(), inspector)
            .enable_preload_associations();

        repo.find_all().await.unwrap();
        let repo = repo.disable_preload_associations();
        repo.find_all().await.unwrap();
        let repo = repo.enable_preload_associations();
        repo.find_all().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_round_trip_through_storage() {
        let (db, repo) = users_with(&[("ada", 36)]).await;
        roles(&db, &["admin"]).await;
        grant(&db, 1, 1).await;

        let repo = repo.enable_preload_associations();
        let stored = Query::<UserRecord>::new()
            .preload("Roles")
            .find(repo.pool())
            .await
            .unwrap()
            .remove(0);

        let entity = repo.find_by_id(1).await.unwrap();
        let rebuilt = UserRecord::from_entity(&stored.to_entity());
        assert_eq!(rebuilt, stored);
        assert_eq!(entity.name, stored.name);
    }
}
