//! SQLite-backed [`LinkStore`].
//!
//! Records live in a single `links` table:
//!
//! ```text
//! id            INTEGER PRIMARY KEY AUTOINCREMENT   -- insertion order
//! slug          TEXT NOT NULL UNIQUE
//! url           TEXT NOT NULL                       -- normalized form, indexed
//! origin_ip     TEXT
//! origin_agent  TEXT
//! status        INTEGER NOT NULL                    -- 1 generated, 2 custom
//! created_at    TEXT NOT NULL                       -- RFC 3339, UTC
//! ```
//!
//! Slug uniqueness is enforced by the `UNIQUE` constraint. An insert-only
//! write that trips it is reported as `SlugConflict`; nothing here reads
//! before writing.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use shortlink_core::{
    LinkRecord, LinkStatus, LinkStore, NewLink, NormalizedUrl, Origin, Result, ShortlinkError,
    Slug, UpsertMode, MAX_LISTING,
};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    origin_ip TEXT,
    origin_agent TEXT,
    status INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
)";

const CREATE_URL_INDEX: &str = "CREATE INDEX IF NOT EXISTS links_url_idx ON links (url)";

const SELECT_COLUMNS: &str = "SELECT slug, url, origin_ip, origin_agent, status, created_at FROM links";

/// Default pool size for file-backed databases.
const DEFAULT_MAX_CONNECTIONS: u32 = 8;

#[derive(Debug, FromRow)]
struct LinkRow {
    slug: String,
    url: String,
    origin_ip: Option<String>,
    origin_agent: Option<String>,
    status: i64,
    created_at: String,
}

impl TryFrom<LinkRow> for LinkRecord {
    type Error = ShortlinkError;

    fn try_from(row: LinkRow) -> Result<Self> {
        let status = LinkStatus::from_code(row.status).ok_or_else(|| {
            ShortlinkError::store(format!(
                "unknown status {} for slug '{}'",
                row.status, row.slug
            ))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| {
                ShortlinkError::store(format!(
                    "bad created_at '{}' for slug '{}': {}",
                    row.created_at, row.slug, e
                ))
            })?
            .with_timezone(&Utc);

        Ok(LinkRecord {
            slug: Slug::from_trusted(row.slug),
            url: row.url,
            created_at,
            origin: Origin::new(row.origin_ip, row.origin_agent),
            status,
        })
    }
}

fn store_err(err: sqlx::Error) -> ShortlinkError {
    ShortlinkError::store(err.to_string())
}

/// A [`LinkStore`] over a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database file at `path` and make sure
    /// the schema exists.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(store_err)?;

        info!("opened sqlite store at {}", path);
        Self::with_pool(pool).await
    }

    /// A private in-memory database, mostly for tests.
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool is
    /// pinned to one connection that is never recycled.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(store_err)?;
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(store_err)?;

        Self::with_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if needed.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(store_err)?;
        sqlx::query(CREATE_URL_INDEX)
            .execute(&pool)
            .await
            .map_err(store_err)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_only(&self, link: NewLink) -> Result<()> {
        let slug = link.slug.as_str().to_string();
        let res = sqlx::query(
            "INSERT INTO links (slug, url, origin_ip, origin_agent, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&slug)
        .bind(link.url.as_str())
        .bind(link.origin.ip)
        .bind(link.origin.user_agent)
        .bind(link.status.code())
        .bind(link.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!(slug = %slug, "insert rejected by unique constraint");
                Err(ShortlinkError::SlugConflict(slug))
            }
            Err(e) => Err(store_err(e)),
        }
    }

    async fn overwrite(&self, link: NewLink) -> Result<()> {
        sqlx::query(
            "INSERT INTO links (slug, url, origin_ip, origin_agent, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(slug) DO UPDATE SET
                url = excluded.url,
                origin_ip = excluded.origin_ip,
                origin_agent = excluded.origin_agent,
                created_at = excluded.created_at",
        )
        .bind(link.slug.as_str())
        .bind(link.url.as_str())
        .bind(link.origin.ip)
        .bind(link.origin.user_agent)
        .bind(link.status.code())
        .bind(link.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl LinkStore for SqliteStore {
    async fn find_by_slug(&self, slug: &Slug) -> Result<Option<LinkRecord>> {
        let row: Option<LinkRow> =
            sqlx::query_as(&format!("{} WHERE slug = ?", SELECT_COLUMNS))
                .bind(slug.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;
        row.map(LinkRecord::try_from).transpose()
    }

    async fn find_by_url(&self, url: &NormalizedUrl) -> Result<Option<LinkRecord>> {
        let row: Option<LinkRow> = sqlx::query_as(&format!(
            "{} WHERE url = ? ORDER BY id ASC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(url.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(LinkRecord::try_from).transpose()
    }

    async fn upsert(&self, link: NewLink, mode: UpsertMode) -> Result<()> {
        match mode {
            UpsertMode::InsertOnly => self.insert_only(link).await,
            UpsertMode::Overwrite => self.overwrite(link).await,
        }
    }

    async fn recent_custom(&self, limit: usize) -> Result<Vec<LinkRecord>> {
        let limit = limit.min(MAX_LISTING) as i64;
        let rows: Vec<LinkRow> = sqlx::query_as(&format!(
            "{} WHERE status = ? ORDER BY id DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(LinkStatus::Custom.code())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.into_iter().map(LinkRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shortlink_core::normalize::normalize;

    fn link(slug: &str, url: &str, status: LinkStatus) -> NewLink {
        NewLink::new(
            Slug::from_trusted(slug),
            normalize(url).unwrap(),
            Origin::default()
                .with_ip("203.0.113.5")
                .with_user_agent("curl/8.0"),
            status,
        )
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let store = SqliteStore::in_memory().await.unwrap();
        let new = link("abcd", "https://Example.com/a", LinkStatus::Generated);
        let created_at = new.created_at;
        store.upsert(new, UpsertMode::InsertOnly).await.unwrap();

        let by_slug = store
            .find_by_slug(&Slug::from_trusted("abcd"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_slug.url, "https://example.com/a");
        assert_eq!(by_slug.status, LinkStatus::Generated);
        assert_eq!(by_slug.origin.ip.as_deref(), Some("203.0.113.5"));
        assert_eq!(by_slug.origin.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(by_slug.created_at, created_at);

        let by_url = store
            .find_by_url(&normalize("https://example.com/a").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_url, by_slug);
    }

    #[tokio::test]
    async fn unique_violation_is_a_slug_conflict() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert(link("abcd", "https://a.example/", LinkStatus::Generated), UpsertMode::InsertOnly)
            .await
            .unwrap();

        let err = store
            .upsert(link("abcd", "https://b.example/", LinkStatus::Custom), UpsertMode::InsertOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, ShortlinkError::SlugConflict(ref s) if s == "abcd"));
    }

    #[tokio::test]
    async fn overwrite_replaces_url_but_keeps_status() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert(link("docs", "https://a.example/", LinkStatus::Custom), UpsertMode::InsertOnly)
            .await
            .unwrap();
        store
            .upsert(link("docs", "https://b.example/", LinkStatus::Generated), UpsertMode::Overwrite)
            .await
            .unwrap();

        let record = store
            .find_by_slug(&Slug::from_trusted("docs"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.url, "https://b.example/");
        assert_eq!(record.status, LinkStatus::Custom);
        assert!(store
            .find_by_url(&normalize("https://a.example/").unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn find_by_url_prefers_first_insert() {
        let store = SqliteStore::in_memory().await.unwrap();
        for slug in ["first", "second"] {
            store
                .upsert(link(slug, "https://a.example/", LinkStatus::Custom), UpsertMode::InsertOnly)
                .await
                .unwrap();
        }
        let record = store
            .find_by_url(&normalize("https://a.example/").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.slug.as_str(), "first");
    }

    #[tokio::test]
    async fn recent_custom_lists_newest_custom_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert(link("c1", "https://example.com/1", LinkStatus::Custom), UpsertMode::InsertOnly)
            .await
            .unwrap();
        store
            .upsert(link("g1", "https://example.com/2", LinkStatus::Generated), UpsertMode::InsertOnly)
            .await
            .unwrap();
        store
            .upsert(link("c2", "https://example.com/3", LinkStatus::Custom), UpsertMode::InsertOnly)
            .await
            .unwrap();

        let recent = store.recent_custom(MAX_LISTING).await.unwrap();
        let slugs: Vec<&str> = recent.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(slugs, vec!["c2", "c1"]);
    }

    #[tokio::test]
    async fn engine_runs_against_sqlite() {
        use shortlink_core::{AllocationEngine, AllocationRequest, Outcome};
        use std::sync::Arc;

        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let engine = AllocationEngine::new(store.clone(), "s.example.com");
        let url = normalize("https://example.com/page").unwrap();

        let first = engine.allocate(AllocationRequest::new(url.clone())).await.unwrap();
        let second = engine.allocate(AllocationRequest::new(url)).await.unwrap();

        assert!(matches!(first, Outcome::Created { .. }));
        assert!(matches!(second, Outcome::Reused { .. }));
        assert_eq!(first.slug(), second.slug());
    }
}
