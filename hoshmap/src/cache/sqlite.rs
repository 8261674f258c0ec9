//! SQLite-backed cache tier.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::{CacheError, CacheTier};
use crate::content::Content;

/// Cache tier stored in a single SQLite table.
pub struct SqliteCache {
    conn: Mutex<Connection>,
    name: String,
}

impl SqliteCache {
    /// Opens (creating if needed) the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let name = format!("sqlite:{}", path.as_ref().display());
        let conn = Connection::open(path)?;
        Self::with_connection(conn, name)
    }

    /// Creates a database living only as long as this handle.
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, "sqlite::memory:".to_string())
    }

    fn with_connection(conn: Connection, name: String) -> Result<Self, CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            name,
        })
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<usize, CacheError> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

impl CacheTier for SqliteCache {
    fn contains(&self, id: &str) -> Result<bool, CacheError> {
        let found = self
            .conn
            .lock()
            .query_row("SELECT 1 FROM cache WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn get(&self, id: &str) -> Result<Option<Content>, CacheError> {
        let text: Option<String> = self
            .conn
            .lock()
            .query_row("SELECT content FROM cache WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        match text {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn set(&self, id: &str, content: &Content) -> Result<(), CacheError> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO cache (id, content) VALUES (?1, ?2)",
            params![id, content.to_string()],
        )?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_sqlite_cache_roundtrip() {
        let cache = SqliteCache::in_memory().unwrap();
        assert!(cache.is_empty().unwrap());
        assert!(!cache.contains("k").unwrap());

        cache.set("k", &json!({"nested": [true, null]})).unwrap();
        assert!(cache.contains("k").unwrap());
        assert_eq!(cache.get("k").unwrap(), Some(json!({"nested": [true, null]})));
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_sqlite_cache_last_write_wins() {
        let cache = SqliteCache::in_memory().unwrap();
        cache.set("k", &json!(1)).unwrap();
        cache.set("k", &json!(2)).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(json!(2)));
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_sqlite_cache_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.db");
        {
            let cache = SqliteCache::open(&path).unwrap();
            cache.set("k", &json!("stored")).unwrap();
        }
        let cache = SqliteCache::open(&path).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(json!("stored")));
    }
}
