//! SQLite-backed [`Kv`] implementation.
//!
//! One `kv` table (key, JSON value, version counter, optional expiry) and
//! one `kv_set` table. Expired rows are treated as absent on read and
//! cleared lazily before insert-only writes.

use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;

use super::{Kv, Versioned};

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(8).build(manager)?;
        let store = Self { pool };
        store.init()?;
        Ok(store)
    }

    /// Single-connection in-memory store (each sqlite :memory: connection is
    /// its own database, so the pool must not grow past one).
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        let store = Self { pool };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                 k          TEXT PRIMARY KEY,
                 v          TEXT NOT NULL,
                 version    INTEGER NOT NULL DEFAULT 1,
                 expires_at INTEGER
             );
             CREATE TABLE IF NOT EXISTS kv_set (
                 name   TEXT NOT NULL,
                 member TEXT NOT NULL,
                 PRIMARY KEY (name, member)
             );",
        )?;
        Ok(())
    }

    fn expiry(ttl_secs: Option<i64>) -> Option<i64> {
        ttl_secs.map(|ttl| Utc::now().timestamp() + ttl)
    }

    fn live_row(conn: &Connection, key: &str) -> Result<Option<(String, i64)>> {
        let now = Utc::now().timestamp();
        let row = conn
            .query_row(
                "SELECT v, version FROM kv
                 WHERE k = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    fn purge_expired(conn: &Connection, key: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM kv WHERE k = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
            params![key, Utc::now().timestamp()],
        )?;
        Ok(())
    }
}

impl Kv for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        Ok(Self::live_row(&conn, key)?.map(|(v, _)| v))
    }

    fn get_versioned(&self, key: &str) -> Result<Option<Versioned>> {
        let conn = self.pool.get()?;
        Ok(Self::live_row(&conn, key)?.map(|(value, version)| Versioned { value, version }))
    }

    fn put(&self, key: &str, value: &str, ttl_secs: Option<i64>) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO kv (k, v, version, expires_at) VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(k) DO UPDATE SET v = ?2, version = version + 1, expires_at = ?3",
            params![key, value, Self::expiry(ttl_secs)],
        )?;
        Ok(())
    }

    fn put_if_version(
        &self,
        key: &str,
        value: &str,
        expected: Option<i64>,
        ttl_secs: Option<i64>,
    ) -> Result<bool> {
        let conn = self.pool.get()?;
        let expires_at = Self::expiry(ttl_secs);

        let affected = match expected {
            None => {
                Self::purge_expired(&conn, key)?;
                conn.execute(
                    "INSERT OR IGNORE INTO kv (k, v, version, expires_at) VALUES (?1, ?2, 1, ?3)",
                    params![key, value, expires_at],
                )?
            }
            Some(version) => conn.execute(
                "UPDATE kv SET v = ?2, version = version + 1, expires_at = ?3
                 WHERE k = ?1 AND version = ?4
                   AND (expires_at IS NULL OR expires_at > ?5)",
                params![key, value, expires_at, version, Utc::now().timestamp()],
            )?,
        };

        Ok(affected > 0)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let deleted = conn.execute("DELETE FROM kv WHERE k = ?1", params![key])?;
        Ok(deleted > 0)
    }

    fn set_add(&self, set: &str, member: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR IGNORE INTO kv_set (name, member) VALUES (?1, ?2)",
            params![set, member],
        )?;
        Ok(())
    }

    fn set_members(&self, set: &str) -> Result<Vec<String>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT member FROM kv_set WHERE name = ?1")?;
        let members = stmt
            .query_map(params![set], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.pool.get()?;
        // ESCAPE so that "_" and "%" in key prefixes match literally
        let pattern = format!(
            "{}%",
            prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        let mut stmt = conn.prepare(
            "SELECT k FROM kv
             WHERE k LIKE ?1 ESCAPE '\\'
               AND (expires_at IS NULL OR expires_at > ?2)",
        )?;
        let keys = stmt
            .query_map(params![pattern, Utc::now().timestamp()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}
