//! `core` category: agent presence, task backlog, and file locks — the
//! tools a solo agent needs to make progress at all.

use super::{opt_i64, opt_str, opt_str_vec, opt_u64, require_str, Capability, DispatchContext, Resolution, ToolCategory, ToolResolver, ToolSpec};
use crate::error::RoomResult;
use crate::room::Room;
use async_trait::async_trait;
use serde_json::{json, Value};

static SPECS: &[ToolSpec] = &[
    ToolSpec { name: "join", description: "Join the room as an agent", category: ToolCategory::Core, permission: Capability::CanReadState, required_fields: &["name"] },
    ToolSpec { name: "leave", description: "Leave the room", category: ToolCategory::Core, permission: Capability::CanReadState, required_fields: &["name"] },
    ToolSpec { name: "heartbeat", description: "Refresh an agent's presence", category: ToolCategory::Core, permission: Capability::CanReadState, required_fields: &["name"] },
    ToolSpec { name: "list_agents", description: "List all agents", category: ToolCategory::Core, permission: Capability::CanReadState, required_fields: &[] },
    ToolSpec { name: "add_task", description: "Add a task to the backlog", category: ToolCategory::Core, permission: Capability::CanClaim, required_fields: &["title"] },
    ToolSpec { name: "list_tasks", description: "List all tasks", category: ToolCategory::Core, permission: Capability::CanReadState, required_fields: &[] },
    ToolSpec { name: "claim", description: "Claim a specific task", category: ToolCategory::Core, permission: Capability::CanClaim, required_fields: &["task_id", "agent"] },
    ToolSpec { name: "claim_next", description: "Claim the highest-priority backlog task", category: ToolCategory::Core, permission: Capability::CanClaim, required_fields: &["agent"] },
    ToolSpec { name: "start", description: "Move a claimed task to in_progress", category: ToolCategory::Core, permission: Capability::CanClaim, required_fields: &["task_id", "agent"] },
    ToolSpec { name: "done", description: "Mark a task done", category: ToolCategory::Core, permission: Capability::CanClaim, required_fields: &["task_id", "agent"] },
    ToolSpec { name: "cancel", description: "Cancel a task", category: ToolCategory::Core, permission: Capability::CanManageAgents, required_fields: &["task_id", "reason"] },
    ToolSpec { name: "set_priority", description: "Change a backlog task's priority", category: ToolCategory::Core, permission: Capability::CanClaim, required_fields: &["task_id", "priority"] },
    ToolSpec { name: "lock_file", description: "Acquire a file lock", category: ToolCategory::Core, permission: Capability::CanClaim, required_fields: &["path", "agent"] },
    ToolSpec { name: "unlock_file", description: "Release a file lock", category: ToolCategory::Core, permission: Capability::CanClaim, required_fields: &["path", "agent"] },
    ToolSpec { name: "list_locks", description: "List held file locks", category: ToolCategory::Core, permission: Capability::CanReadState, required_fields: &[] },
];

pub struct CoreResolver;

#[async_trait]
impl ToolResolver for CoreResolver {
    fn specs(&self) -> &'static [ToolSpec] {
        SPECS
    }

    async fn try_dispatch(&self, room: &Room, _ctx: &DispatchContext, name: &str, args: &Value) -> RoomResult<Resolution> {
        let value = match name {
            "join" => {
                let name = require_str(args, "name")?;
                let caps = opt_str_vec(args, "capabilities");
                let role = args.get("role").and_then(|v| serde_json::from_value(v.clone()).ok());
                json!(room.join(name, caps, role).await?)
            }
            "leave" => {
                room.leave(require_str(args, "name")?).await?;
                json!({"ok": true})
            }
            "heartbeat" => json!(room.heartbeat(require_str(args, "name")?).await?),
            "list_agents" => json!(room.list_agents().await?),
            "add_task" => {
                let title = require_str(args, "title")?;
                let priority = opt_i64(args, "priority", 5);
                let id = opt_str(args, "id").map(str::to_string);
                json!(room.add_task(title, priority, id).await?)
            }
            "list_tasks" => json!(room.list_tasks().await?),
            "claim" => json!(room.claim(require_str(args, "task_id")?, require_str(args, "agent")?).await?),
            "claim_next" => json!(room.claim_next(require_str(args, "agent")?).await?),
            "start" => json!(room.start(require_str(args, "task_id")?, require_str(args, "agent")?).await?),
            "done" => {
                let notes = opt_str(args, "notes").map(str::to_string);
                json!(room.done(require_str(args, "task_id")?, require_str(args, "agent")?, notes).await?)
            }
            "cancel" => json!(room.cancel(require_str(args, "task_id")?, require_str(args, "reason")?).await?),
            "set_priority" => {
                let priority = super::require_i64(args, "priority")?;
                json!(room.set_priority(require_str(args, "task_id")?, priority).await?)
            }
            "lock_file" => {
                let ttl = opt_u64(args, "ttl_secs", 600);
                json!(room.lock_file(require_str(args, "path")?, require_str(args, "agent")?, ttl).await?)
            }
            "unlock_file" => {
                room.unlock_file(require_str(args, "path")?, require_str(args, "agent")?).await?;
                json!({"ok": true})
            }
            "list_locks" => json!(room.list_locks().await?),
            _ => return Ok(Resolution::NotMine),
        };
        Ok(Resolution::Handled(value))
    }
}
