//! Agent presence (spec.md §4.2 "Agents"): idempotent join, heartbeat,
//! leave, and a lazy zombie/left transition applied on read so no
//! background sweep is required to keep a single read consistent.

use super::model::{Agent, AgentStatus, Role};
use super::{retry_txn, Room};
use crate::error::{RoomError, RoomResult};
use crate::session::Notification;
use chrono::{DateTime, Utc};

fn agent_key(name: &str) -> String {
    format!("agent:{name}")
}

fn seconds_since(timestamp: &str) -> i64 {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(t) => (Utc::now() - t.with_timezone(&Utc)).num_seconds(),
        Err(_) => 0,
    }
}

async fn load_agent(room: &Room, name: &str) -> RoomResult<(Agent, Vec<u8>)> {
    let raw = room
        .store
        .get(&agent_key(name))
        .await
        .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?
        .ok_or_else(|| RoomError::InvalidParams { field: "agent".to_string() })?;
    let agent: Agent = serde_json::from_slice(&raw).map_err(|e| RoomError::Internal { reason: e.to_string() })?;
    Ok((agent, raw))
}

async fn save_agent(room: &Room, key: &str, old_raw: &[u8], agent: &Agent) -> RoomResult<bool> {
    let new_raw = serde_json::to_vec(agent).map_err(|e| RoomError::Internal { reason: e.to_string() })?;
    room.store
        .compare_and_put(key, Some(old_raw), &new_raw)
        .await
        .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })
}

/// Applies the lazy zombie/left transition implied by `last_seen` without
/// writing it back; callers that want the transition persisted call
/// `reap` explicitly.
fn with_derived_status(mut agent: Agent, config: &crate::config::RoomConfig) -> Agent {
    let idle_secs = seconds_since(&agent.last_seen);
    if matches!(agent.status, AgentStatus::Left) {
        return agent;
    }
    if idle_secs > config.zombie_threshold_secs + config.left_threshold_secs {
        agent.status = AgentStatus::Left;
    } else if idle_secs > config.zombie_threshold_secs {
        agent.status = AgentStatus::Zombie;
    }
    agent
}

impl Room {
    /// Idempotent: re-joining an existing agent refreshes capabilities and
    /// `last_seen` rather than erroring.
    pub async fn join(&self, name: &str, capabilities: Vec<String>, role: Option<Role>) -> RoomResult<Agent> {
        super::validate_agent_name(name)?;
        let key = agent_key(name);
        let agent = retry_txn(|| async {
            match self.store.get(&key).await.map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })? {
                Some(raw) => {
                    let mut agent: Agent = serde_json::from_slice(&raw).map_err(|e| RoomError::Internal { reason: e.to_string() })?;
                    agent.capabilities = capabilities.clone();
                    agent.status = AgentStatus::Joined;
                    agent.last_seen = Room::now();
                    if let Some(r) = role {
                        agent.role = r;
                    }
                    if save_agent(self, &key, &raw, &agent).await? {
                        Ok(Some(agent))
                    } else {
                        Ok(None)
                    }
                }
                None => {
                    let agent = Agent {
                        name: name.to_string(),
                        capabilities: capabilities.clone(),
                        status: AgentStatus::Joined,
                        last_seen: Room::now(),
                        role: role.unwrap_or(Role::Worker),
                    };
                    let raw = serde_json::to_vec(&agent).map_err(|e| RoomError::Internal { reason: e.to_string() })?;
                    let created = self
                        .store
                        .compare_and_put(&key, None, &raw)
                        .await
                        .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
                    if created {
                        Ok(Some(agent))
                    } else {
                        Ok(None)
                    }
                }
            }
        })
        .await?;
        self.hub.publish(Notification::progress(&agent.name, "agent joined")).await;
        Ok(agent)
    }

    pub async fn heartbeat(&self, name: &str) -> RoomResult<Agent> {
        let key = agent_key(name);
        retry_txn(|| async {
            let (mut agent, raw) = load_agent(self, name).await?;
            agent.last_seen = Room::now();
            if matches!(agent.status, AgentStatus::Zombie | AgentStatus::Left) {
                agent.status = AgentStatus::Idle;
            }
            if save_agent(self, &key, &raw, &agent).await? {
                Ok(Some(agent))
            } else {
                Ok(None)
            }
        })
        .await
    }

    pub async fn leave(&self, name: &str) -> RoomResult<()> {
        let key = agent_key(name);
        retry_txn(|| async {
            let (mut agent, raw) = load_agent(self, name).await?;
            agent.status = AgentStatus::Left;
            if save_agent(self, &key, &raw, &agent).await? {
                Ok(Some(()))
            } else {
                Ok(None)
            }
        })
        .await?;
        self.hub.publish(Notification::progress(name, "agent left")).await;
        Ok(())
    }

    pub async fn get_agent(&self, name: &str) -> RoomResult<Agent> {
        let (agent, _) = load_agent(self, name).await?;
        Ok(with_derived_status(agent, &self.config))
    }

    pub async fn list_agents(&self) -> RoomResult<Vec<Agent>> {
        let entries = self
            .store
            .scan("agent:")
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
        Ok(entries
            .into_iter()
            .filter_map(|(_, raw)| serde_json::from_slice::<Agent>(&raw).ok())
            .map(|agent| with_derived_status(agent, &self.config))
            .collect())
    }

    /// Persists the lazy zombie/left transition for every agent past
    /// threshold, releasing locks and reclaiming claimed tasks held by
    /// agents that crossed into `left` (spec.md §4.2 GC sweep).
    pub async fn reap_stale_agents(&self) -> RoomResult<usize> {
        let mut reaped = 0usize;
        for agent in self.list_agents().await? {
            let key = agent_key(&agent.name);
            let became_left = matches!(agent.status, AgentStatus::Left);
            let (stored, raw) = load_agent(self, &agent.name).await?;
            if stored.status == agent.status {
                continue;
            }
            let mut updated = stored;
            updated.status = agent.status;
            if became_left {
                self.release_locks_for(&agent.name).await?;
                for task_id in self.tasks_claimed_by(&agent.name).await? {
                    let _ = self.reclaim_to_backlog(&task_id).await;
                }
            }
            if save_agent(self, &key, &raw, &updated).await.unwrap_or(false) {
                reaped += 1;
                self.hub
                    .publish(Notification::progress(&agent.name, if became_left { "agent left" } else { "agent zombie" }))
                    .await;
            }
        }
        Ok(reaped)
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
    async fn join_is_idempotent() {
        let room = test_room();
        room.join("claude", vec!["rust".to_string()], None).await.unwrap();
        let again = room.join("claude", vec!["python".to_string()], None).await.unwrap();
        assert_eq!(again.capabilities, vec!["python".to_string()]);
        assert_eq!(room.list_agents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn heartbeat_refreshes_last_seen() {
        let room = test_room();
        room.join("claude", vec![], None).await.unwrap();
        let a = room.get_agent("claude").await.unwrap();
        room.heartbeat("claude").await.unwrap();
        let b = room.get_agent("claude").await.unwrap();
        assert!(b.last_seen >= a.last_seen);
    }

    #[tokio::test]
    async fn leave_sets_left_status() {
        let room = test_room();
        room.join("claude", vec![], None).await.unwrap();
        room.leave("claude").await.unwrap();
        let agent = room.get_agent("claude").await.unwrap();
        assert!(matches!(agent.status, AgentStatus::Left));
    }

    #[tokio::test]
    async fn join_defaults_to_worker_role() {
        let room = test_room();
        let agent = room.join("claude", vec![], None).await.unwrap();
        assert!(matches!(agent.role, Role::Worker));
    }

    #[tokio::test]
    async fn reap_releases_locks_and_reclaims_tasks_for_left_agent() {
        let room = test_room();
        room.join("claude", vec![], None).await.unwrap();
        room.add_task("fix bug", 1, Some("t1".into())).await.unwrap();
        room.claim("t1", "claude").await.unwrap();
        room.lock_file("src/main.rs", "claude", 60).await.unwrap();

        // Backdate last_seen past both thresholds so the lazy status
        // transition computes `Left` on the next sweep.
        let key = agent_key("claude");
        let (mut agent, raw) = load_agent(&room, "claude").await.unwrap();
        agent.last_seen = (chrono::Utc::now() - chrono::Duration::seconds(10_000)).to_rfc3339();
        save_agent(&room, &key, &raw, &agent).await.unwrap();

        let reaped = room.reap_stale_agents().await.unwrap();
        assert_eq!(reaped, 1);
        assert!(matches!(room.get_agent("claude").await.unwrap().status, AgentStatus::Left));
        assert!(room.list_locks().await.unwrap().is_empty());
        let task = room.get_task("t1").await.unwrap();
        assert!(matches!(task.status, crate::room::model::TaskStatus::Backlog));
    }
}
