//! Shared fixtures for the in-crate tests: a users/roles/posts schema, its
//! models and entities.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

use crate::pool::{Database, DbConfig};
use crate::schema::{Relationship, Table};
use strata_core::{Model, Value};

pub const SCHEMA: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    age INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE roles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE user_roles (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, role_id)
);

CREATE TABLE posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title TEXT NOT NULL
);

CREATE TABLE notes (
    id TEXT PRIMARY KEY,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Fresh in-memory database with [`SCHEMA`] applied.
pub async fn database() -> Database {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    sqlx::raw_sql(SCHEMA).execute(db.pool()).await.unwrap();
    db
}

pub async fn grant(db: &Database, user_id: i64, role_id: i64) {
    sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(role_id)
        .execute(db.pool())
        .await
        .unwrap();
}

pub async fn add_post(db: &Database, user_id: i64, title: &str) {
    sqlx::query("INSERT INTO posts (user_id, title) VALUES (?, ?)")
        .bind(user_id)
        .bind(title)
        .execute(db.pool())
        .await
        .unwrap();
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub roles: Vec<Role>,
    pub post_titles: Vec<String>,
}

impl User {
    pub fn new(name: &str, age: i64) -> Self {
        User {
            name: name.to_string(),
            age,
            ..User::default()
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Models
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub age: i64,
    #[sqlx(skip)]
    pub roles: Vec<RoleRecord>,
    #[sqlx(skip)]
    pub posts: Vec<PostRecord>,
}

impl Table for UserRecord {
    const TABLE_NAME: &'static str = "users";

    fn primary_key(&self) -> Value {
        self.id.into()
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![("name", self.name.clone().into()), ("age", self.age.into())]
    }

    fn relationships() -> Vec<Relationship> {
        vec![
            Relationship::many_to_many("Roles", "roles", "user_roles", "user_id", "role_id"),
            Relationship::has_many("Posts", "posts", "user_id"),
        ]
    }

    fn attach(&mut self, association: &str, rows: &[SqliteRow]) -> Result<(), sqlx::Error> {
        match association {
            "Roles" => {
                self.roles = rows.iter().map(RoleRecord::from_row).collect::<Result<_, _>>()?;
            }
            "Posts" => {
                self.posts = rows.iter().map(PostRecord::from_row).collect::<Result<_, _>>()?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl Model<User> for UserRecord {
    fn to_entity(&self) -> User {
        User {
            id: self.id,
            name: self.name.clone(),
            age: self.age,
            roles: self.roles.iter().map(|r| r.to_entity()).collect(),
            post_titles: self.posts.iter().map(|p| p.title.clone()).collect(),
        }
    }

    fn from_entity(user: &User) -> Self {
        UserRecord {
            id: user.id,
            name: user.name.clone(),
            age: user.age,
            roles: user.roles.iter().map(RoleRecord::from_entity).collect(),
            posts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct RoleRecord {
    pub id: i64,
    pub name: String,
}

impl Table for RoleRecord {
    const TABLE_NAME: &'static str = "roles";

    fn primary_key(&self) -> Value {
        self.id.into()
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![("name", self.name.clone().into())]
    }
}

impl Model<Role> for RoleRecord {
    fn to_entity(&self) -> Role {
        Role {
            id: self.id,
            name: self.name.clone(),
        }
    }

    fn from_entity(role: &Role) -> Self {
        RoleRecord {
            id: role.id,
            name: role.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct PostRecord {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct NoteRecord {
    pub id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Table for NoteRecord {
    const TABLE_NAME: &'static str = "notes";

    fn primary_key(&self) -> Value {
        self.id.clone().into()
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("body", self.body.clone().into()),
            ("created_at", self.created_at.into()),
        ]
    }
}

impl Model<Note> for NoteRecord {
    fn to_entity(&self) -> Note {
        Note {
            id: self.id.clone(),
            body: self.body.clone(),
            created_at: self.created_at,
        }
    }

    fn from_entity(note: &Note) -> Self {
        NoteRecord {
            id: note.id.clone(),
            body: note.body.clone(),
            created_at: note.created_at,
        }
    }
}
