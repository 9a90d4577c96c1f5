//! Checkpoint engine (C7, spec.md §4.7): human-in-the-loop interrupt,
//! approve/reject, branch, and non-destructive revert over an ordinary
//! room entity — no separate durable store, per spec.md's own note that
//! the data model just needs to be shaped to permit mirroring into a
//! graph store later.

use super::model::{Checkpoint, CheckpointStatusKind};
use super::{retry_txn, Room};
use crate::error::{RoomError, RoomResult};
use crate::session::Notification;
use chrono::{DateTime, Utc};
use serde_json::Value;

fn checkpoint_key(task_id: &str, step: u64) -> String {
    format!("checkpoint:{task_id}:{step:010}")
}

fn checkpoint_id(task_id: &str, step: u64) -> String {
    format!("{task_id}#{step}")
}

async fn load(room: &Room, task_id: &str, step: u64) -> RoomResult<(Checkpoint, Vec<u8>)> {
    let raw = room
        .store
        .get(&checkpoint_key(task_id, step))
        .await
        .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?
        .ok_or_else(|| RoomError::InvalidParams { field: "checkpoint".to_string() })?;
    let checkpoint: Checkpoint =
        serde_json::from_slice(&raw).map_err(|e| RoomError::Internal { reason: e.to_string() })?;
    Ok((checkpoint, raw))
}

async fn save_raw(room: &Room, key: &str, old_raw: Option<&[u8]>, checkpoint: &Checkpoint) -> RoomResult<bool> {
    let new_raw = serde_json::to_vec(checkpoint).map_err(|e| RoomError::Internal { reason: e.to_string() })?;
    room.store
        .compare_and_put(key, old_raw, &new_raw)
        .await
        .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })
}

fn minutes_since(timestamp: &str) -> i64 {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(t) => (Utc::now() - t.with_timezone(&Utc)).num_minutes(),
        Err(_) => 0,
    }
}

impl Room {
    async fn checkpoints_for_task(&self, task_id: &str) -> RoomResult<Vec<Checkpoint>> {
        let entries = self
            .store
            .scan(&format!("checkpoint:{task_id}:"))
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
        let mut checkpoints: Vec<Checkpoint> = entries
            .into_iter()
            .filter_map(|(_, raw)| serde_json::from_slice(&raw).ok())
            .collect();
        checkpoints.sort_by_key(|c| c.step);
        Ok(checkpoints)
    }

    fn latest_interrupted(checkpoints: &[Checkpoint]) -> Option<&Checkpoint> {
        checkpoints.iter().rev().find(|c| c.status == CheckpointStatusKind::Interrupted)
    }

    /// Creates the next checkpoint in `task_id`'s linear history, linking
    /// it to the prior step when one exists.
    pub async fn save_checkpoint(
        &self,
        task_id: &str,
        action: &str,
        agent: &str,
        state: Option<Value>,
        status: Option<CheckpointStatusKind>,
    ) -> RoomResult<Checkpoint> {
        let existing = self.checkpoints_for_task(task_id).await?;
        let step = existing.last().map(|c| c.step + 1).unwrap_or(1);
        let parent_id = existing.last().map(|c| c.id.clone());
        let checkpoint = Checkpoint {
            id: checkpoint_id(task_id, step),
            task_id: task_id.to_string(),
            step,
            action: action.to_string(),
            state: state.unwrap_or(Value::Null),
            author: agent.to_string(),
            status: status.unwrap_or(CheckpointStatusKind::Pending),
            message: None,
            reject_reason: None,
            branch_name: None,
            parent_id,
            state_edited: false,
            created_at: Room::now(),
            reverted_at: None,
        };
        let created = save_raw(self, &checkpoint_key(task_id, step), None, &checkpoint).await?;
        if !created {
            return Err(RoomError::Conflict);
        }
        self.hub
            .publish(Notification::progress(&checkpoint.id, "checkpoint saved"))
            .await;
        Ok(checkpoint)
    }

    pub async fn interrupt_checkpoint(
        &self,
        task_id: &str,
        action: &str,
        agent: &str,
        message: &str,
    ) -> RoomResult<Checkpoint> {
        let mut checkpoint = self
            .save_checkpoint(task_id, action, agent, None, Some(CheckpointStatusKind::Interrupted))
            .await?;
        checkpoint.message = Some(message.to_string());
        let raw = serde_json::to_vec(&checkpoint).map_err(|e| RoomError::Internal { reason: e.to_string() })?;
        self.store
            .put(&checkpoint_key(task_id, checkpoint.step), &raw, None)
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
        Ok(checkpoint)
    }

    /// Transitions the latest `interrupted` checkpoint of `task_id` to
    /// `completed`. When `edited_state` is given, it replaces the stored
    /// state and sets `state_edited`.
    pub async fn approve_checkpoint(&self, task_id: &str, edited_state: Option<Value>) -> RoomResult<Checkpoint> {
        retry_txn(|| async {
            let checkpoints = self.checkpoints_for_task(task_id).await?;
            let target = Self::latest_interrupted(&checkpoints)
                .ok_or_else(|| RoomError::InvalidTransition { from: "none".to_string(), to: "completed".to_string() })?
                .clone();
            let (_, raw) = load(self, task_id, target.step).await?;
            let mut updated = target.clone();
            updated.status = CheckpointStatusKind::Completed;
            if let Some(state) = edited_state.clone() {
                updated.state = state;
                updated.state_edited = true;
            }
            if save_raw(self, &checkpoint_key(task_id, target.step), Some(&raw), &updated).await? {
                Ok(Some(updated))
            } else {
                Ok(None)
            }
        })
        .await
    }

    pub async fn reject_checkpoint(&self, task_id: &str, reason: &str) -> RoomResult<Checkpoint> {
        retry_txn(|| async {
            let checkpoints = self.checkpoints_for_task(task_id).await?;
            let target = Self::latest_interrupted(&checkpoints)
                .ok_or_else(|| RoomError::InvalidTransition { from: "none".to_string(), to: "rejected".to_string() })?
                .clone();
            let (_, raw) = load(self, task_id, target.step).await?;
            let mut updated = target.clone();
            updated.status = CheckpointStatusKind::Rejected;
            updated.reject_reason = Some(reason.to_string());
            if save_raw(self, &checkpoint_key(task_id, target.step), Some(&raw), &updated).await? {
                Ok(Some(updated))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Forks a new lineage from `source_step`: clones its state into a new
    /// checkpoint at the next step, marks the source `branched`.
    pub async fn branch_checkpoint(
        &self,
        task_id: &str,
        source_step: u64,
        branch_name: &str,
        agent: &str,
    ) -> RoomResult<Checkpoint> {
        let (source, source_raw) = load(self, task_id, source_step).await?;
        let existing = self.checkpoints_for_task(task_id).await?;
        let step = existing.last().map(|c| c.step + 1).unwrap_or(source_step + 1);
        let mut branched_source = source.clone();
        branched_source.status = CheckpointStatusKind::Branched;
        if !save_raw(self, &checkpoint_key(task_id, source_step), Some(&source_raw), &branched_source).await? {
            return Err(RoomError::Conflict);
        }
        let successor = Checkpoint {
            id: checkpoint_id(task_id, step),
            task_id: task_id.to_string(),
            step,
            action: source.action.clone(),
            state: source.state.clone(),
            author: agent.to_string(),
            status: CheckpointStatusKind::Pending,
            message: None,
            reject_reason: None,
            branch_name: Some(branch_name.to_string()),
            parent_id: Some(source.id.clone()),
            state_edited: false,
            created_at: Room::now(),
            reverted_at: None,
        };
        if !save_raw(self, &checkpoint_key(task_id, step), None, &successor).await? {
            return Err(RoomError::Conflict);
        }
        self.hub
            .publish(Notification::progress(&successor.id, "checkpoint branched"))
            .await;
        Ok(successor)
    }

    /// Marks every checkpoint past `target_step` `reverted` (non-destructively —
    /// state and history are retained) and returns the target's state for replay.
    pub async fn revert_checkpoint(&self, task_id: &str, target_step: u64) -> RoomResult<Value> {
        let (target, _) = load(self, task_id, target_step).await?;
        let checkpoints = self.checkpoints_for_task(task_id).await?;
        for checkpoint in checkpoints.into_iter().filter(|c| c.step > target_step) {
            let key = checkpoint_key(task_id, checkpoint.step);
            let (_, raw) = load(self, task_id, checkpoint.step).await?;
            let mut updated = checkpoint;
            updated.status = CheckpointStatusKind::Reverted;
            updated.reverted_at = Some(Room::now());
            let _ = save_raw(self, &key, Some(&raw), &updated).await?;
        }
        self.hub
            .publish(Notification::progress(&target.id, "checkpoint reverted"))
            .await;
        Ok(target.state)
    }

    /// Enumerates interrupted checkpoints across every task; any older than
    /// `timeout_min` are first auto-rejected with `reason: "timeout"`.
    pub async fn pending_checkpoints(&self, timeout_min: i64) -> RoomResult<Vec<Checkpoint>> {
        let entries = self
            .store
            .scan("checkpoint:")
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
        let mut still_pending = Vec::new();
        for (_, raw) in entries {
            let checkpoint: Checkpoint = match serde_json::from_slice(&raw) {
                Ok(c) => c,
                Err(_) => continue,
            };
            if checkpoint.status != CheckpointStatusKind::Interrupted {
                continue;
            }
            if minutes_since(&checkpoint.created_at) >= timeout_min {
                let _ = self.reject_checkpoint(&checkpoint.task_id, "timeout").await;
            } else {
                still_pending.push(checkpoint);
            }
        }
        Ok(still_pending)
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
    async fn save_then_interrupt_then_approve() {
        let room = test_room();
        room.save_checkpoint("t1", "wrote file", "claude", None, None).await.unwrap();
        let interrupted = room
            .interrupt_checkpoint("t1", "needs review", "claude", "please check this diff")
            .await
            .unwrap();
        assert_eq!(interrupted.step, 2);
        let approved = room.approve_checkpoint("t1", None).await.unwrap();
        assert_eq!(approved.status, CheckpointStatusKind::Completed);
    }

    #[tokio::test]
    async fn reject_records_reason() {
        let room = test_room();
        room.interrupt_checkpoint("t1", "risky change", "claude", "confirm?").await.unwrap();
        let rejected = room.reject_checkpoint("t1", "too risky").await.unwrap();
        assert_eq!(rejected.reject_reason, Some("too risky".to_string()));
    }

    #[tokio::test]
    async fn approve_with_no_interrupted_checkpoint_fails() {
        let room = test_room();
        room.save_checkpoint("t1", "step", "claude", None, None).await.unwrap();
        assert!(room.approve_checkpoint("t1", None).await.is_err());
    }

    #[tokio::test]
    async fn branch_forks_new_lineage_and_marks_source() {
        let room = test_room();
        room.save_checkpoint("t1", "first", "claude", Some(serde_json::json!({"x": 1})), None)
            .await
            .unwrap();
        let branched = room.branch_checkpoint("t1", 1, "explore-alt", "gemini").await.unwrap();
        assert_eq!(branched.step, 2);
        assert_eq!(branched.branch_name, Some("explore-alt".to_string()));
        let (source, _) = load(&room, "t1", 1).await.unwrap();
        assert_eq!(source.status, CheckpointStatusKind::Branched);
    }

    #[tokio::test]
    async fn revert_marks_later_steps_reverted_and_returns_target_state() {
        let room = test_room();
        room.save_checkpoint("t1", "a", "claude", Some(serde_json::json!({"v": 1})), None)
            .await
            .unwrap();
        room.save_checkpoint("t1", "b", "claude", Some(serde_json::json!({"v": 2})), None)
            .await
            .unwrap();
        room.save_checkpoint("t1", "c", "claude", Some(serde_json::json!({"v": 3})), None)
            .await
            .unwrap();
        let state = room.revert_checkpoint("t1", 1).await.unwrap();
        assert_eq!(state, serde_json::json!({"v": 1}));
        let (step2, _) = load(&room, "t1", 2).await.unwrap();
        let (step3, _) = load(&room, "t1", 3).await.unwrap();
        assert_eq!(step2.status, CheckpointStatusKind::Reverted);
        assert_eq!(step3.status, CheckpointStatusKind::Reverted);
        assert!(step2.reverted_at.is_some());
    }

    #[tokio::test]
    async fn branch_from_reverted_step_is_permitted() {
        let room = test_room();
        room.save_checkpoint("t1", "a", "claude", None, None).await.unwrap();
        room.save_checkpoint("t1", "b", "claude", None, None).await.unwrap();
        room.revert_checkpoint("t1", 1).await.unwrap();
        let branched = room.branch_checkpoint("t1", 1, "new-direction", "claude").await.unwrap();
        assert_eq!(branched.step, 3);
    }
}
