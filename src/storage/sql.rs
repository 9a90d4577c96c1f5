//! Relational KV backend: a single `kv` table with an indexed `expires_at`
//! column, on top of `rusqlite` — the teacher's own storage engine
//! (WAL mode, `Mutex<Connection>`, `PRAGMA foreign_keys`), generalized from
//! chat-specific tables to a single generic key/value table so the same
//! crate doubles as the "relational KV" backend spec.md §4.1 calls for.

use super::{LockOutcome, ScanEntry, StorageError, StorageResult, Store};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub struct SqlStore {
    conn: Mutex<Connection>,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl SqlStore {
    pub fn new(path: &str) -> StorageResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Fatal(format!("cannot open sqlite db: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| StorageError::Fatal(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                expires_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_kv_expires ON kv(expires_at);
            CREATE TABLE IF NOT EXISTS locks (
                name TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_locks_expires ON locks(expires_at);",
        )
        .map_err(|e| StorageError::Fatal(format!("migration failed: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> StorageResult<Self> {
        Self::new(":memory:")
    }
}

#[async_trait]
impl Store for SqlStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        let now = now_secs();
        conn.query_row(
            "SELECT value FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
            params![key, now],
            |r| r.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(StorageError::Transient(e.to_string())),
        })
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let expires_at = ttl.map(|d| now_secs() + d.as_secs() as i64);
        conn.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )
        .map_err(|e| StorageError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn compare_and_put(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> StorageResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let now = now_secs();
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Transient(e.to_string()))?;
        let current: Option<Vec<u8>> = tx
            .query_row(
                "SELECT value FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now],
                |r| r.get(0),
            )
            .ok();
        if current.as_deref() != expected {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, NULL)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = NULL",
            params![key, new],
        )
        .map_err(|e| StorageError::Transient(e.to_string()))?;
        tx.commit().map_err(|e| StorageError::Transient(e.to_string()))?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| StorageError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> StorageResult<Vec<ScanEntry>> {
        let conn = self.conn.lock().unwrap();
        let now = now_secs();
        let like = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let mut stmt = conn
            .prepare(
                "SELECT key, value FROM kv
                 WHERE key LIKE ?1 ESCAPE '\\' AND (expires_at IS NULL OR expires_at > ?2)
                 ORDER BY key ASC",
            )
            .map_err(|e| StorageError::Transient(e.to_string()))?;
        let rows = stmt
            .query_map(params![like, now], |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(|e| StorageError::Transient(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| StorageError::Transient(e.to_string()))?);
        }
        Ok(out)
    }

    async fn lock(&self, name: &str, owner: &str, ttl: Duration) -> StorageResult<LockOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let now = now_secs();
        let expires_at = now + ttl.as_secs() as i64;
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Transient(e.to_string()))?;
        let existing: Option<(String, i64)> = tx
            .query_row(
                "SELECT owner, expires_at FROM locks WHERE name = ?1",
                params![name],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .ok();
        if let Some((holder, exp)) = existing {
            if exp > now && holder != owner {
                return Ok(LockOutcome::HeldByOther(holder));
            }
        }
        tx.execute(
            "INSERT INTO locks (name, owner, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at",
            params![name, owner, expires_at],
        )
        .map_err(|e| StorageError::Transient(e.to_string()))?;
        tx.commit().map_err(|e| StorageError::Transient(e.to_string()))?;
        Ok(LockOutcome::Acquired)
    }

    async fn unlock(&self, name: &str, owner: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "DELETE FROM locks WHERE name = ?1 AND owner = ?2",
                params![name, owner],
            )
            .map_err(|e| StorageError::Transient(e.to_string()))?;
        Ok(changed > 0)
    }

    async fn tick(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_secs();
        conn.execute(
            "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now],
        )
        .map_err(|e| StorageError::Transient(e.to_string()))?;
        conn.execute(
            "DELETE FROM locks WHERE expires_at <= ?1",
            params![now],
        )
        .map_err(|e| StorageError::Transient(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = SqlStore::in_memory().unwrap();
        store.put("a", b"hello", None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn lock_contention() {
        let store = SqlStore::in_memory().unwrap();
        assert_eq!(
            store.lock("file:a", "x", Duration::from_secs(60)).await.unwrap(),
            LockOutcome::Acquired
        );
        assert_eq!(
            store.lock("file:a", "y", Duration::from_secs(60)).await.unwrap(),
            LockOutcome::HeldByOther("x".to_string())
        );
    }

    #[tokio::test]
    async fn idempotent_reacquire_by_owner() {
        let store = SqlStore::in_memory().unwrap();
        assert_eq!(
            store.lock("file:a", "x", Duration::from_secs(60)).await.unwrap(),
            LockOutcome::Acquired
        );
        assert_eq!(
            store.lock("file:a", "x", Duration::from_secs(60)).await.unwrap(),
            LockOutcome::Acquired
        );
    }
}
