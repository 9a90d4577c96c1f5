//! Domain entities of spec.md §3, as plain serde structs — the teacher's
//! own `models.rs` pattern of one struct per storage shape. Tool request
//! bodies are plain JSON-RPC `params` objects read field-by-field in
//! `tools/core.rs` rather than named `Deserialize` structs, since tool
//! dispatch already validates required fields against `ToolSpec` before
//! a handler runs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Joined,
    Working,
    Idle,
    Zombie,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Worker,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub capabilities: Vec<String>,
    pub status: AgentStatus,
    pub last_seen: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Claimed { assignee: String, claimed_at: String },
    InProgress { assignee: String, started_at: String },
    Done { assignee: String, finished_at: String, notes: Option<String> },
    Cancelled { reason: String },
}

impl TaskStatus {
    pub fn assignee(&self) -> Option<&str> {
        match self {
            TaskStatus::Claimed { assignee, .. }
            | TaskStatus::InProgress { assignee, .. }
            | TaskStatus::Done { assignee, .. } => Some(assignee),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Claimed { .. } => "claimed",
            TaskStatus::InProgress { .. } => "in_progress",
            TaskStatus::Done { .. } => "done",
            TaskStatus::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done { .. } | TaskStatus::Cancelled { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub priority: i64,
    pub status: TaskStatus,
    pub plan: Option<String>,
    pub notes: Vec<String>,
    pub deliverable: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLockInfo {
    pub path: String,
    pub owner: String,
    pub acquired_at: String,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub seq: u64,
    pub sender: String,
    pub content: String,
    pub mentions: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatusKind {
    Pending,
    InProgress,
    Completed,
    Interrupted,
    Rejected,
    Branched,
    Reverted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub task_id: String,
    pub step: u64,
    pub action: String,
    pub state: serde_json::Value,
    pub author: String,
    pub status: CheckpointStatusKind,
    pub message: Option<String>,
    pub reject_reason: Option<String>,
    pub branch_name: Option<String>,
    pub parent_id: Option<String>,
    pub state_edited: bool,
    pub created_at: String,
    pub reverted_at: Option<String>,
}
