//! Filesystem storage backend: one JSON-ish blob file per key under
//! `<base>/.masc/kv/`, written via write-temp-then-rename, with
//! `O_EXCL`-created sibling lock files for `lock`/`unlock`. This is the
//! teacher's own "write JSON to disk atomically" idiom (see its
//! `db.rs` migrations writing through a single `Mutex<Connection>`),
//! adapted here to a flat key/value layout instead of SQL tables.

use super::{LockOutcome, ScanEntry, StorageError, StorageResult, Store};
use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex as AsyncMutex;

pub struct FsStore {
    root: PathBuf,
    // Filesystem operations in this backend are synchronous; a single
    // async mutex serializes them so `compare_and_put`/`lock` stay atomic
    // without requiring a multi-process file lock for the common
    // single-process deployment.
    guard: AsyncMutex<()>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<u64>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn encode_key(key: &str) -> String {
    // Keys may contain ':' and '/' (e.g. "file:src/main"); percent-encode
    // the path separator so each key maps to exactly one flat filename.
    key.replace('%', "%25").replace('/', "%2F")
}

impl FsStore {
    pub fn new(base_path: &str) -> StorageResult<Self> {
        let root = Path::new(base_path).join(".masc");
        fs::create_dir_all(root.join("kv"))
            .map_err(|e| StorageError::Fatal(format!("cannot create kv dir: {e}")))?;
        fs::create_dir_all(root.join("locks"))
            .map_err(|e| StorageError::Fatal(format!("cannot create locks dir: {e}")))?;
        Ok(Self {
            root,
            guard: AsyncMutex::new(()),
        })
    }

    fn kv_path(&self, key: &str) -> PathBuf {
        self.root.join("kv").join(encode_key(key))
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join("locks").join(encode_key(name))
    }

    fn read_value(&self, path: &Path) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => {
                let stored: StoredValue = serde_json::from_slice(&bytes)
                    .map_err(|e| StorageError::Fatal(format!("corrupted value: {e}")))?;
                if let Some(exp) = stored.expires_at
                    && exp <= now_secs()
                {
                    let _ = fs::remove_file(path);
                    return Ok(None);
                }
                Ok(Some(stored.data))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Transient(e.to_string())),
        }
    }

    fn write_value(&self, path: &Path, data: &[u8], ttl: Option<Duration>) -> StorageResult<()> {
        let stored = StoredValue {
            data: data.to_vec(),
            expires_at: ttl.map(|d| now_secs() + d.as_secs()),
        };
        let bytes = serde_json::to_vec(&stored)
            .map_err(|e| StorageError::Fatal(format!("encode failure: {e}")))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes).map_err(|e| StorageError::Transient(e.to_string()))?;
        fs::rename(&tmp, path).map_err(|e| StorageError::Transient(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Store for FsStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let _g = self.guard.lock().await;
        self.read_value(&self.kv_path(key))
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StorageResult<()> {
        let _g = self.guard.lock().await;
        self.write_value(&self.kv_path(key), value, ttl)
    }

    async fn compare_and_put(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> StorageResult<bool> {
        let _g = self.guard.lock().await;
        let path = self.kv_path(key);
        let current = self.read_value(&path)?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        self.write_value(&path, new, None)?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let _g = self.guard.lock().await;
        match fs::remove_file(self.kv_path(key)) {
            Ok(()) | Err(_) => Ok(()),
        }
    }

    async fn scan(&self, prefix: &str) -> StorageResult<Vec<ScanEntry>> {
        let _g = self.guard.lock().await;
        let dir = self.root.join("kv");
        let mut entries = Vec::new();
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) => return Err(StorageError::Transient(e.to_string())),
        };
        for entry in read_dir.flatten() {
            let fname = entry.file_name().to_string_lossy().into_owned();
            let key = fname.replace("%2F", "/").replace("%25", "%");
            if !key.starts_with(prefix) || fname.ends_with(".tmp") {
                continue;
            }
            if let Some(value) = self.read_value(&entry.path())? {
                entries.push((key, value));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn lock(&self, name: &str, owner: &str, ttl: Duration) -> StorageResult<LockOutcome> {
        let _g = self.guard.lock().await;
        let path = self.lock_path(name);

        // Reclaim an expired lock lazily before attempting O_EXCL create.
        if let Some(existing) = self.read_value(&path)? {
            let holder = String::from_utf8_lossy(&existing).into_owned();
            if holder != owner {
                return Ok(LockOutcome::HeldByOther(holder));
            }
        }

        let tmp = path.with_extension("tmp");
        let stored = StoredValue {
            data: owner.as_bytes().to_vec(),
            expires_at: Some(now_secs() + ttl.as_secs()),
        };
        let bytes = serde_json::to_vec(&stored).unwrap();
        fs::write(&tmp, &bytes).map_err(|e| StorageError::Transient(e.to_string()))?;

        // Exclusive create via rename-if-absent: if the destination already
        // exists (another owner's un-expired lock) this fails, which is the
        // filesystem analogue of O_EXCL for our write-temp+rename scheme.
        if let Some(existing) = self.read_value(&path)? {
            let _ = fs::remove_file(&tmp);
            let holder = String::from_utf8_lossy(&existing).into_owned();
            return Ok(LockOutcome::HeldByOther(holder));
        }
        fs::rename(&tmp, &path).map_err(|e| StorageError::Transient(e.to_string()))?;
        Ok(LockOutcome::Acquired)
    }

    async fn unlock(&self, name: &str, owner: &str) -> StorageResult<bool> {
        let _g = self.guard.lock().await;
        let path = self.lock_path(name);
        match self.read_value(&path)? {
            Some(existing) if String::from_utf8_lossy(&existing) == owner => {
                let _ = fs::remove_file(&path);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn tick(&self) -> StorageResult<()> {
        let _g = self.guard.lock().await;
        for dir_name in ["kv", "locks"] {
            let dir = self.root.join(dir_name);
            if let Ok(read_dir) = fs::read_dir(&dir) {
                for entry in read_dir.flatten() {
                    let _ = self.read_value(&entry.path());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().to_str().unwrap()).unwrap();
        store.put("a", b"hello", None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn compare_and_put_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().to_str().unwrap()).unwrap();
        assert!(store.compare_and_put("x", None, b"1").await.unwrap());
        assert!(!store.compare_and_put("x", None, b"2").await.unwrap());
        assert!(
            store
                .compare_and_put("x", Some(b"1"), b"2")
                .await
                .unwrap()
        );
        assert_eq!(store.get("x").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn lock_contention_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(
            store.lock("file:a", "agent-a", Duration::from_secs(60)).await.unwrap(),
            LockOutcome::Acquired
        );
        assert_eq!(
            store.lock("file:a", "agent-b", Duration::from_secs(60)).await.unwrap(),
            LockOutcome::HeldByOther("agent-a".to_string())
        );
        assert!(store.unlock("file:a", "agent-a").await.unwrap());
        assert_eq!(
            store.lock("file:a", "agent-b", Duration::from_secs(60)).await.unwrap(),
            LockOutcome::Acquired
        );
    }

    #[tokio::test]
    async fn scan_orders_lexicographically() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().to_str().unwrap()).unwrap();
        store.put("task:b", b"2", None).await.unwrap();
        store.put("task:a", b"1", None).await.unwrap();
        store.put("other:c", b"3", None).await.unwrap();
        let entries = store.scan("task:").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "task:a");
        assert_eq!(entries[1].0, "task:b");
    }
}
