//! Redis storage backend, grounded on the pack's own use of `redis = "0.27"`
//! with `tokio-comp` (see `wg-bastion`'s distributed cache layer). Uses
//! native `SET NX PX` for locks and a small `EVAL` script for atomic
//! compare-and-swap, since Redis has no built-in CAS primitive over a
//! single string key.

use super::{LockOutcome, ScanEntry, StorageError, StorageResult, Store};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

pub struct RedisStore {
    manager: redis::aio::ConnectionManager,
}

const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] or (current == false and ARGV[1] == '') then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
else
    return 0
end
"#;

impl RedisStore {
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| StorageError::Fatal(format!("invalid redis url: {e}")))?;
        let manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| StorageError::Transient(format!("redis connect failed: {e}")))?;
        Ok(Self { manager })
    }

    fn map_err(e: redis::RedisError) -> StorageError {
        if e.is_connection_dropped() || e.is_timeout() {
            StorageError::Transient(e.to_string())
        } else {
            StorageError::Fatal(e.to_string())
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(Self::map_err)
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StorageResult<()> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(d) => {
                let _: () = conn
                    .set_ex(key, value, d.as_secs().max(1))
                    .await
                    .map_err(Self::map_err)?;
            }
            None => {
                let _: () = conn.set(key, value).await.map_err(Self::map_err)?;
            }
        }
        Ok(())
    }

    async fn compare_and_put(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> StorageResult<bool> {
        let mut conn = self.manager.clone();
        let expected_arg: Vec<u8> = expected.map(|v| v.to_vec()).unwrap_or_default();
        let result: i64 = redis::Script::new(CAS_SCRIPT)
            .key(key)
            .arg(expected_arg)
            .arg(new)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(result == 1)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.del(key).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> StorageResult<Vec<ScanEntry>> {
        let mut conn = self.manager.clone();
        let pattern = format!("{prefix}*");
        let keys: Vec<String> = conn.keys(&pattern).await.map_err(Self::map_err)?;
        let mut sorted = keys;
        sorted.sort();
        let mut out = Vec::with_capacity(sorted.len());
        for key in sorted {
            if let Some(value) = self.get(&key).await? {
                out.push((key, value));
            }
        }
        Ok(out)
    }

    async fn lock(&self, name: &str, owner: &str, ttl: Duration) -> StorageResult<LockOutcome> {
        let mut conn = self.manager.clone();
        let acquired: bool = redis::cmd("SET")
            .arg(name)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map(|r| r.is_some())
            .map_err(Self::map_err)?;
        if acquired {
            return Ok(LockOutcome::Acquired);
        }
        let holder: Option<String> = conn.get(name).await.map_err(Self::map_err)?;
        match holder {
            Some(h) if h == owner => Ok(LockOutcome::Acquired),
            Some(h) => Ok(LockOutcome::HeldByOther(h)),
            None => Ok(LockOutcome::HeldByOther("unknown".to_string())),
        }
    }

    async fn unlock(&self, name: &str, owner: &str) -> StorageResult<bool> {
        let mut conn = self.manager.clone();
        let holder: Option<String> = conn.get(name).await.map_err(Self::map_err)?;
        if holder.as_deref() == Some(owner) {
            let _: () = conn.del(name).await.map_err(Self::map_err)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn tick(&self) -> StorageResult<()> {
        // Redis expires keys natively; nothing to sweep.
        Ok(())
    }
}
