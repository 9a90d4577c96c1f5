//! File lock operations (spec.md §4.2 "File locks").

use super::model::FileLockInfo;
use super::{normalize_file_path, Room};
use crate::error::{RoomError, RoomResult};
use crate::session::Notification;
use crate::storage::LockOutcome;
use std::time::Duration;

fn lock_name(path: &str) -> String {
    format!("file:{path}")
}

fn lock_meta_key(path: &str) -> String {
    format!("lockmeta:{path}")
}

impl Room {
    pub async fn lock_file(&self, path: &str, agent: &str, ttl_secs: u64) -> RoomResult<FileLockInfo> {
        let path = normalize_file_path(path)?;
        let outcome = self
            .store
            .lock(&lock_name(&path), agent, Duration::from_secs(ttl_secs))
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
        match outcome {
            LockOutcome::HeldByOther(by) => Err(RoomError::FileLocked { by }),
            LockOutcome::Acquired => {
                let info = FileLockInfo {
                    path: path.clone(),
                    owner: agent.to_string(),
                    acquired_at: Room::now(),
                    ttl_secs,
                };
                let raw = serde_json::to_vec(&info)
                    .map_err(|e| RoomError::Internal { reason: e.to_string() })?;
                let _ = self
                    .store
                    .put(&lock_meta_key(&path), &raw, Some(Duration::from_secs(ttl_secs)))
                    .await;
                self.hub.publish(Notification::progress(&path, "file locked")).await;
                Ok(info)
            }
        }
    }

    pub async fn unlock_file(&self, path: &str, agent: &str) -> RoomResult<()> {
        let path = normalize_file_path(path)?;
        let released = self
            .store
            .unlock(&lock_name(&path), agent)
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
        if !released {
            return Err(RoomError::NotOwner);
        }
        let _ = self.store.delete(&lock_meta_key(&path)).await;
        self.hub.publish(Notification::progress(&path, "file unlocked")).await;
        Ok(())
    }

    pub async fn list_locks(&self) -> RoomResult<Vec<FileLockInfo>> {
        let entries = self
            .store
            .scan("lockmeta:")
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
        Ok(entries
            .into_iter()
            .filter_map(|(_, raw)| serde_json::from_slice(&raw).ok())
            .collect())
    }

    /// Releases every lock held by `agent` — used by the zombie GC sweep
    /// so a dead agent's locks don't wedge the rest of the room.
    pub async fn release_locks_for(&self, agent: &str) -> RoomResult<()> {
        for info in self.list_locks().await? {
            if info.owner == agent {
                let _ = self.unlock_file(&info.path, agent).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomConfig;
    use crate::session::SessionHub;
    use crate::storage::sql::SqlStore;
    use std::sync::Arc;

    fn test_room() -> Room {
        let store = Arc::new(SqlStore::in_memory().unwrap());
        let hub = Arc::new(SessionHub::new(256));
        Room::new(store, hub, RoomConfig::default())
    }

    #[tokio::test]
    async fn lock_contention_then_release() {
        let room = test_room();
        room.lock_file("src/main", "a", 60).await.unwrap();
        let err = room.lock_file("src/main", "b", 60).await.unwrap_err();
        assert!(matches!(err, RoomError::FileLocked { by } if by == "a"));
        room.unlock_file("src/main", "a").await.unwrap();
        room.lock_file("src/main", "b", 60).await.unwrap();
    }

    #[tokio::test]
    async fn unlock_requires_matching_owner() {
        let room = test_room();
        room.lock_file("src/main", "a", 60).await.unwrap();
        let err = room.unlock_file("src/main", "b").await.unwrap_err();
        assert!(matches!(err, RoomError::NotOwner));
    }

    #[tokio::test]
    async fn rejects_unsafe_paths() {
        let room = test_room();
        assert!(room.lock_file("../etc", "a", 60).await.is_err());
        assert!(room.lock_file("/tmp/x", "a", 60).await.is_err());
    }

    #[tokio::test]
    async fn release_locks_for_only_drops_the_named_owner() {
        let room = test_room();
        room.lock_file("src/a", "a", 60).await.unwrap();
        room.lock_file("src/b", "a", 60).await.unwrap();
        room.lock_file("src/c", "b", 60).await.unwrap();

        room.release_locks_for("a").await.unwrap();

        let remaining = room.list_locks().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].owner, "b");
        room.lock_file("src/a", "b", 60).await.unwrap();
    }
}
