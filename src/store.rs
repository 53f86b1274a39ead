//! Persistence boundary: cached links per (identifier, platform) and the
//! search audit log.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::types::{CacheKey, SearchEvent};

#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn create_schema_if_absent(&self) -> StoreResult<()>;

    /// `Ok(None)` when nothing was ever stored for the key; `Ok(Some(vec![]))`
    /// for a stored empty result.
    async fn get_cached_links(&self, key: &CacheKey) -> StoreResult<Option<Vec<String>>>;

    /// Replaces whatever is stored for the key.
    async fn put_cached_links(&self, key: &CacheKey, links: &[String]) -> StoreResult<()>;

    async fn remove_cached_links(&self, key: &CacheKey) -> StoreResult<()>;

    async fn append_search_event(&self, event: &SearchEvent) -> StoreResult<()>;
}

/// Columns `users_log` must have; older databases get the missing ones added.
const USERS_LOG_COLUMNS: &[(&str, &str)] = &[
    ("username", "TEXT"),
    ("os", "TEXT"),
    ("country", "TEXT"),
    ("ip", "TEXT"),
    ("search", "TEXT"),
    ("created_at", "TEXT"),
];

const SEARCH_CACHE_COLUMNS: &[(&str, &str)] = &[
    ("position", "INTEGER NOT NULL DEFAULT 0"),
    ("created_at", "TEXT"),
];

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        info!("opened result store at {}", db_path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT,
                os TEXT,
                country TEXT,
                ip TEXT,
                search TEXT,
                created_at TEXT
            );

            CREATE TABLE IF NOT EXISTS search_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query TEXT NOT NULL,
                platform TEXT NOT NULL,
                link TEXT NOT NULL,
                created_at TEXT
            );

            CREATE TABLE IF NOT EXISTS search_cache_entries (
                query TEXT NOT NULL,
                platform TEXT NOT NULL,
                link_count INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (query, platform)
            );
            "#,
        )?;

        Self::add_missing_columns(conn, "users_log", USERS_LOG_COLUMNS)?;
        Self::add_missing_columns(conn, "search_cache", SEARCH_CACHE_COLUMNS)?;

        // Older writers appended duplicate rows; keep the first of each.
        conn.execute_batch(
            r#"
            DELETE FROM search_cache WHERE id NOT IN (
                SELECT MIN(id) FROM search_cache GROUP BY query, platform, link
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_search_cache_link
                ON search_cache(query, platform, link);
            CREATE INDEX IF NOT EXISTS idx_search_cache_key
                ON search_cache(query, platform, position);
            "#,
        )
    }

    fn add_missing_columns(
        conn: &Connection,
        table: &str,
        required: &[(&str, &str)],
    ) -> rusqlite::Result<()> {
        let existing = Self::column_names(conn, table)?;
        for (column, ty) in required {
            if !existing.iter().any(|c| c == column) {
                debug!("adding column {}.{}", table, column);
                conn.execute(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, ty), [])?;
            }
        }
        Ok(())
    }

    fn column_names(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }
}

#[async_trait]
impl LinkStore for SqliteStore {
    async fn create_schema_if_absent(&self) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        Self::init_schema(&conn)?;
        Ok(())
    }

    async fn get_cached_links(&self, key: &CacheKey) -> StoreResult<Option<Vec<String>>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT link FROM search_cache WHERE query = ?1 AND platform = ?2 ORDER BY position, id",
        )?;
        let links = stmt
            .query_map(params![key.identifier, key.platform], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if !links.is_empty() {
            return Ok(Some(links));
        }

        let header: Option<i64> = conn
            .query_row(
                "SELECT link_count FROM search_cache_entries WHERE query = ?1 AND platform = ?2",
                params![key.identifier, key.platform],
                |row| row.get(0),
            )
            .optional()?;
        Ok(header.map(|_| Vec::new()))
    }

    async fn put_cached_links(&self, key: &CacheKey, links: &[String]) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM search_cache WHERE query = ?1 AND platform = ?2",
            params![key.identifier, key.platform],
        )?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO search_cache (query, platform, link, position, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, link) in links.iter().enumerate() {
                insert.execute(params![key.identifier, key.platform, link, position as i64, now])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO search_cache_entries (query, platform, link_count, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.identifier, key.platform, links.len() as i64, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn remove_cached_links(&self, key: &CacheKey) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM search_cache WHERE query = ?1 AND platform = ?2",
            params![key.identifier, key.platform],
        )?;
        tx.execute(
            "DELETE FROM search_cache_entries WHERE query = ?1 AND platform = ?2",
            params![key.identifier, key.platform],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn append_search_event(&self, event: &SearchEvent) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users_log (username, os, country, ip, search, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.username,
                event.os,
                event.country,
                event.ip,
                event.identifier,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

/// In-process store, for tests and for running without a database file.
#[derive(Default, Clone)]
pub struct MemoryStore {
    links: Arc<RwLock<HashMap<CacheKey, Vec<String>>>>,
    events: Arc<RwLock<Vec<SearchEvent>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<SearchEvent> {
        self.events.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.links.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.links.read().await.is_empty()
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn create_schema_if_absent(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get_cached_links(&self, key: &CacheKey) -> StoreResult<Option<Vec<String>>> {
        Ok(self.links.read().await.get(key).cloned())
    }

    async fn put_cached_links(&self, key: &CacheKey, links: &[String]) -> StoreResult<()> {
        let mut deduped: Vec<String> = Vec::with_capacity(links.len());
        for link in links {
            if !deduped.contains(link) {
                deduped.push(link.clone());
            }
        }
        self.links.write().await.insert(key.clone(), deduped);
        Ok(())
    }

    async fn remove_cached_links(&self, key: &CacheKey) -> StoreResult<()> {
        self.links.write().await.remove(key);
        Ok(())
    }

    async fn append_search_event(&self, event: &SearchEvent) -> StoreResult<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

/// Stands in when the configured store could not be opened.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait]
impl LinkStore for NullStore {
    async fn create_schema_if_absent(&self) -> StoreResult<()> {
        Err(StoreError::Unavailable)
    }

    async fn get_cached_links(&self, _key: &CacheKey) -> StoreResult<Option<Vec<String>>> {
        Err(StoreError::Unavailable)
    }

    async fn put_cached_links(&self, _key: &CacheKey, _links: &[String]) -> StoreResult<()> {
        Err(StoreError::Unavailable)
    }

    async fn remove_cached_links(&self, _key: &CacheKey) -> StoreResult<()> {
        Err(StoreError::Unavailable)
    }

    async fn append_search_event(&self, _event: &SearchEvent) -> StoreResult<()> {
        Err(StoreError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(identifier: &str, platform: &str) -> CacheKey {
        CacheKey {
            identifier: identifier.to_string(),
            platform: platform.to_string(),
        }
    }

    fn links(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn sqlite_round_trip_preserves_order() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("cache.db")).unwrap();
        store.create_schema_if_absent().await.unwrap();

        let k = key("jane.doe", "Facebook");
        assert_eq!(store.get_cached_links(&k).await.unwrap(), None);

        let stored = links(&["https://www.facebook.com/z", "https://www.facebook.com/a"]);
        store.put_cached_links(&k, &stored).await.unwrap();
        assert_eq!(store.get_cached_links(&k).await.unwrap(), Some(stored));
        assert_eq!(store.get_cached_links(&key("jane.doe", "Reddit")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sqlite_distinguishes_empty_entry_from_missing() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_schema_if_absent().await.unwrap();
        let k = key("nobody", "TikTok");

        store.put_cached_links(&k, &[]).await.unwrap();
        assert_eq!(store.get_cached_links(&k).await.unwrap(), Some(Vec::new()));

        store.remove_cached_links(&k).await.unwrap();
        assert_eq!(store.get_cached_links(&k).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sqlite_put_replaces_and_never_duplicates() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_schema_if_absent().await.unwrap();
        let k = key("jane", "Reddit");

        store
            .put_cached_links(&k, &links(&["https://reddit.com/u/old"]))
            .await
            .unwrap();
        store
            .put_cached_links(
                &k,
                &links(&["https://reddit.com/u/jane", "https://reddit.com/u/jane"]),
            )
            .await
            .unwrap();
        assert_eq!(
            store.get_cached_links(&k).await.unwrap(),
            Some(links(&["https://reddit.com/u/jane"]))
        );
    }

    #[tokio::test]
    async fn schema_creation_is_idempotent_and_migrates_old_log_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE users_log (id INTEGER PRIMARY KEY AUTOINCREMENT, username TEXT, search TEXT);
                 CREATE TABLE search_cache (id INTEGER PRIMARY KEY AUTOINCREMENT, query TEXT, platform TEXT, link TEXT);
                 INSERT INTO search_cache (query, platform, link) VALUES ('jane', 'Reddit', 'https://reddit.com/u/jane');",
            )
            .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        store.create_schema_if_absent().await.unwrap();
        store.create_schema_if_absent().await.unwrap();

        {
            let conn = store.conn.lock().await;
            let columns = SqliteStore::column_names(&conn, "users_log").unwrap();
            for (name, _) in USERS_LOG_COLUMNS {
                assert!(columns.iter().any(|c| c == name), "missing {}", name);
            }
        }

        // Rows written before the migration are still served.
        assert_eq!(
            store.get_cached_links(&key("jane", "Reddit")).await.unwrap(),
            Some(links(&["https://reddit.com/u/jane"]))
        );

        store
            .append_search_event(&SearchEvent {
                identifier: "jane".into(),
                os: Some("Linux".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let conn = store.conn.lock().await;
        let (search, os): (String, Option<String>) = conn
            .query_row("SELECT search, os FROM users_log", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(search, "jane");
        assert_eq!(os.as_deref(), Some("Linux"));
    }

    #[tokio::test]
    async fn memory_store_behaves_like_sqlite() {
        let store = MemoryStore::new();
        let k = key("jane", "Pinterest");
        assert_eq!(store.get_cached_links(&k).await.unwrap(), None);
        store.put_cached_links(&k, &[]).await.unwrap();
        assert_eq!(store.get_cached_links(&k).await.unwrap(), Some(Vec::new()));
        store
            .append_search_event(&SearchEvent {
                identifier: "jane".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(store.events().await.len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn null_store_is_always_unavailable() {
        let store = NullStore;
        assert!(matches!(
            store.get_cached_links(&key("a", "b")).await,
            Err(StoreError::Unavailable)
        ));
        assert!(store.create_schema_if_absent().await.is_err());
    }
}
