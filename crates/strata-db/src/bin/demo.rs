//! # Repository Walkthrough
//!
//! Creates a small articles/tags schema and drives it through the generic
//! repository: inserts, filtered finds, counts, preloading and deletes.
//!
//! ## Usage
//! ```bash
//! # In-memory database
//! cargo run -p strata-db --bin demo
//!
//! # File database, with repository debug logs
//! RUST_LOG=strata_db=debug cargo run -p strata-db --bin demo -- --db ./demo.db
//! ```

use std::env;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use strata_db::specification::{equal, greater_than, like};
use strata_db::{Database, DbConfig, DbError, Model, Relationship, Table, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    views INTEGER NOT NULL DEFAULT 0,
    published_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS article_tags (
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (article_id, tag_id)
);
"#;

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Default)]
struct Article {
    id: i64,
    title: String,
    views: i64,
    published_at: DateTime<Utc>,
    tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Tag {
    id: String,
    label: String,
}

// =============================================================================
// Models
// =============================================================================

#[derive(Debug, Default, FromRow)]
struct ArticleRecord {
    id: i64,
    title: String,
    views: i64,
    published_at: DateTime<Utc>,
    #[sqlx(skip)]
    tags: Vec<TagRecord>,
}

impl Table for ArticleRecord {
    const TABLE_NAME: &'static str = "articles";

    fn primary_key(&self) -> Value {
        self.id.into()
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("title", self.title.clone().into()),
            ("views", self.views.into()),
            ("published_at", self.published_at.into()),
        ]
    }

    fn relationships() -> Vec<Relationship> {
        vec![Relationship::many_to_many(
            "Tags",
            "tags",
            "article_tags",
            "article_id",
            "tag_id",
        )]
    }

    fn attach(&mut self, association: &str, rows: &[SqliteRow]) -> Result<(), sqlx::Error> {
        if association == "Tags" {
            self.tags = rows.iter().map(TagRecord::from_row).collect::<Result<_, _>>()?;
        }
        Ok(())
    }
}

impl Model<Article> for ArticleRecord {
    fn to_entity(&self) -> Article {
        Article {
            id: self.id,
            title: self.title.clone(),
            views: self.views,
            published_at: self.published_at,
            tags: self.tags.iter().map(|t| t.label.clone()).collect(),
        }
    }

    fn from_entity(article: &Article) -> Self {
        ArticleRecord {
            id: article.id,
            title: article.title.clone(),
            views: article.views,
            published_at: article.published_at,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Default, FromRow)]
struct TagRecord {
    id: String,
    label: String,
}

impl Table for TagRecord {
    const TABLE_NAME: &'static str = "tags";

    fn primary_key(&self) -> Value {
        self.id.clone().into()
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![("label", self.label.clone().into())]
    }
}

impl Model<Tag> for TagRecord {
    fn to_entity(&self) -> Tag {
        Tag {
            id: self.id.clone(),
            label: self.label.clone(),
        }
    }

    fn from_entity(tag: &Tag) -> Self {
        TagRecord {
            id: tag.id.clone(),
            label: tag.label.clone(),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,strata_db=info,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut config = DbConfig::in_memory();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config = DbConfig::new(&args[i + 1]);
                    i += 1;
                }
            }
            "--env" => config = DbConfig::from_env(),
            "--help" | "-h" => {
                println!("Strata repository walkthrough");
                println!();
                println!("Usage: demo [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: in-memory)");
                println!("      --env          Read STRATA_DATABASE_PATH / STRATA_MAX_CONNECTIONS");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let db = Database::new(config).await?;
    sqlx::raw_sql(SCHEMA).execute(db.pool()).await?;

    let articles = db.repository::<ArticleRecord, Article>();
    let tags = db.repository::<TagRecord, Tag>();

    // Tags carry client-generated UUID keys
    let mut tag_ids = Vec::new();
    for label in ["rust", "databases", "tutorial"] {
        let mut tag = Tag {
            id: Uuid::new_v4().to_string(),
            label: label.to_string(),
        };
        match tags.insert(&mut tag).await {
            Ok(()) => tag_ids.push(tag.id),
            Err(e) if e.is_unique_violation() => {
                info!(label, "Tag already present");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let now = Utc::now();
    let drafts = [
        ("Generic repositories in Rust", 120),
        ("SQLite upserts explained", 45),
        ("Rust async for beginners", 300),
    ];
    for (offset, (title, views)) in drafts.iter().enumerate() {
        let mut article = Article {
            title: title.to_string(),
            views: *views,
            published_at: now - Duration::days(offset as i64),
            ..Article::default()
        };
        articles.insert(&mut article).await?;
        println!("Inserted article #{}: {}", article.id, article.title);

        for tag_id in tag_ids.iter().take(offset + 1) {
            sqlx::query("INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?, ?)")
                .bind(article.id)
                .bind(tag_id)
                .execute(db.pool())
                .await?;
        }
    }

    let popular = greater_than("views", 100);
    let about_rust = like("title", "%Rust%");

    println!();
    println!("Articles: {}", articles.count(&[]).await?);
    println!("Popular: {}", articles.count(&[&popular]).await?);
    println!(
        "Popular and about Rust: {}",
        articles.count(&[&popular, &about_rust]).await?
    );

    let first_page = articles.find_with_limit(Some(2), None, &[&about_rust]).await?;
    println!();
    println!("First page of Rust articles:");
    for article in &first_page {
        println!("  #{} {} ({} views)", article.id, article.title, article.views);
    }

    let articles = articles.enable_preload_associations();
    println!();
    println!("With tags preloaded:");
    for article in articles.find_all().await? {
        println!("  #{} {} {:?}", article.id, article.title, article.tags);
    }

    let mut bumped = articles.find_by_id(1).await?;
    bumped.views += 1;
    articles.update(&mut bumped).await?;
    println!();
    println!("Article #1 now has {} views", bumped.views);

    let by_title = articles
        .find(&[&equal("title", "SQLite upserts explained")])
        .await?;
    if let Some(article) = by_title.first() {
        articles.delete(article).await?;
        println!("Deleted article #{}", article.id);
    }

    match articles.delete_by_id(999).await {
        Err(DbError::NotFound { table, id }) => println!("Nothing to delete in {} for id {}", table, id),
        other => other?,
    }

    println!();
    println!("Remaining articles: {}", articles.count(&[]).await?);

    db.close().await;
    Ok(())
}
