//! Task backlog operations (spec.md §4.2 "Tasks").

use super::model::{Task, TaskStatus};
use super::{retry_txn, Room};
use crate::error::{RoomError, RoomResult};
use crate::session::Notification;

fn task_key(id: &str) -> String {
    format!("task:{id}")
}

async fn load_task(room: &Room, id: &str) -> RoomResult<(Task, Vec<u8>)> {
    let raw = room
        .store
        .get(&task_key(id))
        .await
        .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?
        .ok_or_else(|| RoomError::TaskNotFound { id: id.to_string() })?;
    let task: Task = serde_json::from_slice(&raw)
        .map_err(|e| RoomError::Internal { reason: e.to_string() })?;
    Ok((task, raw))
}

async fn save_task(room: &Room, key: &str, old_raw: &[u8], task: &Task) -> RoomResult<bool> {
    let new_raw = serde_json::to_vec(task).map_err(|e| RoomError::Internal { reason: e.to_string() })?;
    room.store
        .compare_and_put(key, Some(old_raw), &new_raw)
        .await
        .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })
}

impl Room {
    pub async fn add_task(&self, title: &str, priority: i64, id: Option<String>) -> RoomResult<Task> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let key = task_key(&id);
        let task = Task {
            id: id.clone(),
            title: title.to_string(),
            priority,
            status: TaskStatus::Backlog,
            plan: None,
            notes: Vec::new(),
            deliverable: None,
            created_at: Room::now(),
        };
        let raw = serde_json::to_vec(&task).map_err(|e| RoomError::Internal { reason: e.to_string() })?;
        let created = self
            .store
            .compare_and_put(&key, None, &raw)
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
        if !created {
            return Err(RoomError::Conflict);
        }
        self.hub.publish(Notification::progress(&id, "task added")).await;
        Ok(task)
    }

    pub async fn get_task(&self, id: &str) -> RoomResult<Task> {
        load_task(self, id).await.map(|(t, _)| t)
    }

    pub async fn list_tasks(&self) -> RoomResult<Vec<Task>> {
        let entries = self
            .store
            .scan("task:")
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
        let mut tasks = Vec::with_capacity(entries.len());
        for (_, raw) in entries {
            if let Ok(task) = serde_json::from_slice::<Task>(&raw) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    /// Idempotent: claiming a task already claimed by `agent` succeeds.
    pub async fn claim(&self, task_id: &str, agent: &str) -> RoomResult<Task> {
        let key = task_key(task_id);
        retry_txn(|| async {
            let (mut task, raw) = load_task(self, task_id).await?;
            match &task.status {
                TaskStatus::Backlog => {
                    task.status = TaskStatus::Claimed {
                        assignee: agent.to_string(),
                        claimed_at: Room::now(),
                    };
                }
                TaskStatus::Claimed { assignee, .. } if assignee == agent => {
                    return Ok(Some(task));
                }
                TaskStatus::Claimed { assignee, .. } => {
                    return Err(RoomError::TaskAlreadyClaimed { by: assignee.clone() });
                }
                other => {
                    return Err(RoomError::InvalidTransition {
                        from: other.label().to_string(),
                        to: "claimed".to_string(),
                    });
                }
            }
            if save_task(self, &key, &raw, &task).await? {
                self.hub.publish(Notification::progress(task_id, "task claimed")).await;
                Ok(Some(task))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Scans backlog in ascending priority, then creation time, then id;
    /// attempts to claim the first. Returns `None` if backlog is empty.
    pub async fn claim_next(&self, agent: &str) -> RoomResult<Option<Task>> {
        let mut backlog: Vec<Task> = self
            .list_tasks()
            .await?
            .into_iter()
            .filter(|t| matches!(t.status, TaskStatus::Backlog))
            .collect();
        backlog.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        match backlog.first() {
            Some(task) => self.claim(&task.id, agent).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn start(&self, task_id: &str, agent: &str) -> RoomResult<Task> {
        let key = task_key(task_id);
        retry_txn(|| async {
            let (mut task, raw) = load_task(self, task_id).await?;
            match &task.status {
                TaskStatus::Claimed { assignee, .. } if assignee == agent => {
                    task.status = TaskStatus::InProgress {
                        assignee: agent.to_string(),
                        started_at: Room::now(),
                    };
                }
                other => {
                    return Err(RoomError::InvalidTransition {
                        from: other.label().to_string(),
                        to: "in_progress".to_string(),
                    });
                }
            }
            if save_task(self, &key, &raw, &task).await? {
                self.hub.publish(Notification::progress(task_id, "task started")).await;
                Ok(Some(task))
            } else {
                Ok(None)
            }
        })
        .await
    }

    pub async fn done(&self, task_id: &str, agent: &str, notes: Option<String>) -> RoomResult<Task> {
        let key = task_key(task_id);
        retry_txn(|| async {
            let (mut task, raw) = load_task(self, task_id).await?;
            let assignee = match &task.status {
                TaskStatus::Claimed { assignee, .. } | TaskStatus::InProgress { assignee, .. } => {
                    assignee.clone()
                }
                other => {
                    return Err(RoomError::InvalidTransition {
                        from: other.label().to_string(),
                        to: "done".to_string(),
                    });
                }
            };
            if assignee != agent {
                return Err(RoomError::PermissionDenied);
            }
            task.status = TaskStatus::Done {
                assignee,
                finished_at: Room::now(),
                notes: notes.clone(),
            };
            if let Some(n) = notes.clone() {
                task.notes.push(n);
            }
            if save_task(self, &key, &raw, &task).await? {
                self.hub.publish(Notification::progress(task_id, "task done")).await;
                Ok(Some(task))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Admin-only, terminal.
    pub async fn cancel(&self, task_id: &str, reason: &str) -> RoomResult<Task> {
        let key = task_key(task_id);
        retry_txn(|| async {
            let (mut task, raw) = load_task(self, task_id).await?;
            if task.status.is_terminal() {
                return Err(RoomError::InvalidTransition {
                    from: task.status.label().to_string(),
                    to: "cancelled".to_string(),
                });
            }
            task.status = TaskStatus::Cancelled { reason: reason.to_string() };
            if save_task(self, &key, &raw, &task).await? {
                self.hub.publish(Notification::progress(task_id, "task cancelled")).await;
                Ok(Some(task))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Mutable only while `backlog`, per spec.md §3 task invariants.
    pub async fn set_priority(&self, task_id: &str, priority: i64) -> RoomResult<Task> {
        let key = task_key(task_id);
        retry_txn(|| async {
            let (mut task, raw) = load_task(self, task_id).await?;
            if !matches!(task.status, TaskStatus::Backlog) {
                return Err(RoomError::InvalidTransition {
                    from: task.status.label().to_string(),
                    to: "backlog".to_string(),
                });
            }
            task.priority = priority;
            if save_task(self, &key, &raw, &task).await? {
                Ok(Some(task))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Ids of non-terminal tasks currently assigned to `agent`, used by
    /// the zombie GC sweep to find what needs reclaiming to backlog.
    pub async fn tasks_claimed_by(&self, agent: &str) -> RoomResult<Vec<String>> {
        Ok(self
            .list_tasks()
            .await?
            .into_iter()
            .filter(|t| !t.status.is_terminal() && t.status.assignee() == Some(agent))
            .map(|t| t.id)
            .collect())
    }

    /// Releases a claimed/in-progress task back to `backlog` without
    /// requiring the holder's cooperation — used by the zombie GC sweep
    /// (spec.md §4.2 "Agents").
    pub async fn reclaim_to_backlog(&self, task_id: &str) -> RoomResult<()> {
        let key = task_key(task_id);
        retry_txn(|| async {
            let (mut task, raw) = load_task(self, task_id).await?;
            if task.status.is_terminal() {
                return Ok(Some(()));
            }
            task.status = TaskStatus::Backlog;
            if save_task(self, &key, &raw, &task).await? {
                Ok(Some(()))
            } else {
                Ok(None)
            }
        })
        .await
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
    async fn task_handoff_scenario() {
        let room = test_room();
        let task = room.add_task("review PR", 1, Some("t1".into())).await.unwrap();
        assert_eq!(task.id, "t1");

        room.claim("t1", "claude").await.unwrap();
        let err = room.claim("t1", "gemini").await.unwrap_err();
        assert!(matches!(err, RoomError::TaskAlreadyClaimed { by } if by == "claude"));

        let done = room.done("t1", "claude", Some("ok".into())).await.unwrap();
        match done.status {
            TaskStatus::Done { assignee, .. } => assert_eq!(assignee, "claude"),
            _ => panic!("expected done"),
        }
    }

    #[tokio::test]
    async fn claim_is_idempotent() {
        let room = test_room();
        room.add_task("x", 1, Some("t1".into())).await.unwrap();
        room.claim("t1", "a").await.unwrap();
        room.claim("t1", "a").await.unwrap();
    }

    #[tokio::test]
    async fn claim_next_empty_backlog_is_none() {
        let room = test_room();
        assert!(room.claim_next("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_next_picks_lowest_priority() {
        let room = test_room();
        room.add_task("low", 5, Some("t-low".into())).await.unwrap();
        room.add_task("high", 1, Some("t-high".into())).await.unwrap();
        let claimed = room.claim_next("a").await.unwrap().unwrap();
        assert_eq!(claimed.id, "t-high");
    }

    #[tokio::test]
    async fn cancel_is_terminal() {
        let room = test_room();
        room.add_task("x", 1, Some("t1".into())).await.unwrap();
        room.cancel("t1", "no longer needed").await.unwrap();
        let err = room.claim("t1", "a").await.unwrap_err();
        assert!(matches!(err, RoomError::InvalidTransition { .. }));
    }
}
